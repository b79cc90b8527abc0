use std::env;
use std::fmt;

#[derive(Clone)]
pub struct Config {
    pub mongo_url: String,
    pub mongo_db: String,
    pub app_user: String,
    pub app_password: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            mongo_url: env::var("MONGO_URL")
                .unwrap_or_else(|_| "mongodb://127.0.0.1:27017".to_string()),
            mongo_db: env::var("MONGO_DB").unwrap_or_else(|_| "marslanding".to_string()),
            app_user: env::var("APP_DB_USER").unwrap_or_else(|_| "app_user".to_string()),
            app_password: env::var("APP_DB_PASSWORD")
                .unwrap_or_else(|_| "app_password".to_string()),
            max_connections: env::var("MONGO_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            min_connections: env::var("MONGO_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            connect_retries: env::var("CONNECT_RETRIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
        }
    }
}

// The connection string may embed credentials too, so neither it nor the
// application secret is printed.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mongo_url", &redact_url(&self.mongo_url))
            .field("mongo_db", &self.mongo_db)
            .field("app_user", &self.app_user)
            .field("app_password", &"***")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_retries", &self.connect_retries)
            .finish()
    }
}

/// Replaces the `user:password@` part of a connection string, if any.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://***@{}", &rest[at + 1..]),
        None => url.to_string(),
    }
}
