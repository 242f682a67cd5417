pub mod admin;
pub mod payments;
pub mod plans;
pub mod root;
pub mod subscriptions;
