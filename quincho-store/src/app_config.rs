use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub mailer: MailerConfig,
    pub sweep: SweepConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
    /// Fail-open budget for the admin profile lookup.
    #[serde(default = "default_profile_lookup_timeout_ms")]
    pub profile_lookup_timeout_ms: u64,
}

fn default_profile_lookup_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailerConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    /// Base url printed into confirmation links.
    pub public_base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    /// How often the expiry sweep deletes unconfirmed, expired reservations.
    pub interval_seconds: u64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `QUINCHO__SERVER__PORT=8080` overrides server.port
            .add_source(config::Environment::with_prefix("QUINCHO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
