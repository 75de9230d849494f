use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub places_api_key: Option<String>,
    pub places_base_url: String,
    pub search_radius_km: f64,
    pub advisor_api_key: Option<String>,
    pub advisor_base_url: String,
    pub advisor_model: String,
    pub recommendation_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    /// Peers whose `x-forwarded-for` header is believed.
    pub trusted_proxies: Vec<IpAddr>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field(
                "places_api_key",
                &self.places_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("places_base_url", &self.places_base_url)
            .field("search_radius_km", &self.search_radius_km)
            .field(
                "advisor_api_key",
                &self.advisor_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("advisor_base_url", &self.advisor_base_url)
            .field("advisor_model", &self.advisor_model)
            .field(
                "recommendation_timeout_secs",
                &self.recommendation_timeout_secs,
            )
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
