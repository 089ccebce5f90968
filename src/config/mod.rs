use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    /// Minutes after which an unpaid payment hold may be released by the
    /// operator sweep. There is no background expiry task.
    pub hold_timeout_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u32,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: String,
    /// When unset, inbound webhooks are accepted without signature
    /// verification. Development mode only.
    pub webhook_secret: Option<String>,
    pub currency: String,
}

impl AppConfig {
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.server,
            self.database.port,
            self.database.database
        )
    }

    pub fn from_env() -> Self {
        let get_str = |key: &str, default: &str| -> String {
            env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let get_opt = |key: &str| -> Option<String> { env::var(key).ok().filter(|v| !v.is_empty()) };

        let config = Self {
            server: ServerConfig {
                host: get_str("SERVER_HOST", "0.0.0.0"),
                port: get_str("SERVER_PORT", "8080").parse().unwrap_or(8080),
            },
            database: DatabaseConfig {
                username: get_str("DB_USER", "agrirent"),
                password: get_str("DB_PASSWORD", "agrirent"),
                server: get_str("DB_HOST", "localhost"),
                port: get_str("DB_PORT", "5432").parse().unwrap_or(5432),
                database: get_str("DB_NAME", "agrirent"),
            },
            gateway: GatewayConfig {
                key_id: get_str("GATEWAY_KEY_ID", ""),
                key_secret: get_str("GATEWAY_KEY_SECRET", ""),
                webhook_secret: get_opt("GATEWAY_WEBHOOK_SECRET"),
                currency: get_str("GATEWAY_CURRENCY", "INR"),
            },
            hold_timeout_minutes: get_str("HOLD_TIMEOUT_MINUTES", "30").parse().unwrap_or(30),
        };

        if config.gateway.webhook_secret.is_none() {
            tracing::warn!(
                "GATEWAY_WEBHOOK_SECRET is not set; webhook signatures will NOT be verified"
            );
        }

        config
    }
}
