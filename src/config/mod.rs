use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// `development` exposes underlying error details in API responses.
    pub environment: String,
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    pub currency: String,
    pub gateway_timeout_secs: u64,
    pub expiry_warning_days: i64,
    /// Whether a failed payment webhook notifies the user. Off by default.
    #[serde(default)]
    pub notify_payment_failures: bool,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            gateway_timeout_secs: 15,
            expiry_warning_days: 3,
            notify_payment_failures: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://cardly.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("app.environment", "production")?
            .set_default("stripe.enabled", false)?
            .set_default("billing.currency", "usd")?
            .set_default("billing.gateway_timeout_secs", 15)?
            .set_default("billing.expiry_warning_days", 3)?
            .set_default("scheduler.enabled", true)?
            .set_default("scheduler.interval_secs", 24 * 60 * 60)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with CARDLY__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("CARDLY").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://cardly.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            app: AppConfig::default(),
            stripe: StripeConfig::default(),
            billing: BillingConfig::default(),
            scheduler: SchedulerConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}
