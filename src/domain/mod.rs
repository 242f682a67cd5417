pub mod payment;
pub mod plan;
pub mod subscription;
pub mod user;

pub use payment::*;
pub use plan::*;
pub use subscription::*;
pub use user::*;
