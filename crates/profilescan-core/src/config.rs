use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

const DEFAULT_PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/";
const DEFAULT_ADVISOR_BASE_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_ADVISOR_MODEL: &str = "gpt-4o-mini";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("PROFILESCAN_ENV", "development"));

    let bind_addr: SocketAddr = parse_as(
        "PROFILESCAN_BIND_ADDR",
        &or_default("PROFILESCAN_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("PROFILESCAN_LOG_LEVEL", "info");

    let places_api_key = optional("GOOGLE_PLACES_API_KEY");
    let places_base_url = or_default("PROFILESCAN_PLACES_BASE_URL", DEFAULT_PLACES_BASE_URL);
    let search_radius_km: f64 = parse_as(
        "PROFILESCAN_SEARCH_RADIUS_KM",
        &or_default("PROFILESCAN_SEARCH_RADIUS_KM", "50"),
    )?;
    if !(search_radius_km.is_finite() && search_radius_km > 0.0) {
        return Err(ConfigError::InvalidEnvVar {
            var: "PROFILESCAN_SEARCH_RADIUS_KM".to_string(),
            reason: format!("must be a positive number of kilometres, got {search_radius_km}"),
        });
    }

    let advisor_api_key = optional("PROFILESCAN_ADVISOR_API_KEY");
    let advisor_base_url = or_default("PROFILESCAN_ADVISOR_BASE_URL", DEFAULT_ADVISOR_BASE_URL);
    let advisor_model = or_default("PROFILESCAN_ADVISOR_MODEL", DEFAULT_ADVISOR_MODEL);
    let recommendation_timeout_secs: u64 = parse_as(
        "PROFILESCAN_RECOMMENDATION_TIMEOUT_SECS",
        &or_default("PROFILESCAN_RECOMMENDATION_TIMEOUT_SECS", "15"),
    )?;
    let http_timeout_secs: u64 = parse_as(
        "PROFILESCAN_HTTP_TIMEOUT_SECS",
        &or_default("PROFILESCAN_HTTP_TIMEOUT_SECS", "30"),
    )?;

    let rate_limit_max_requests: u32 = parse_as(
        "PROFILESCAN_RATE_LIMIT_MAX_REQUESTS",
        &or_default("PROFILESCAN_RATE_LIMIT_MAX_REQUESTS", "10"),
    )?;
    let rate_limit_window_secs: u64 = parse_as(
        "PROFILESCAN_RATE_LIMIT_WINDOW_SECS",
        &or_default("PROFILESCAN_RATE_LIMIT_WINDOW_SECS", "60"),
    )?;

    let trusted_proxies = parse_ip_list(
        "PROFILESCAN_TRUSTED_PROXIES",
        &or_default("PROFILESCAN_TRUSTED_PROXIES", ""),
    )?;

    let db_max_connections: u32 = parse_as(
        "PROFILESCAN_DB_MAX_CONNECTIONS",
        &or_default("PROFILESCAN_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parse_as(
        "PROFILESCAN_DB_MIN_CONNECTIONS",
        &or_default("PROFILESCAN_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs: u64 = parse_as(
        "PROFILESCAN_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("PROFILESCAN_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        places_api_key,
        places_base_url,
        search_radius_km,
        advisor_api_key,
        advisor_base_url,
        advisor_model,
        recommendation_timeout_secs,
        http_timeout_secs,
        rate_limit_max_requests,
        rate_limit_window_secs,
        trusted_proxies,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

/// Comma-separated IP addresses; blank entries are skipped.
fn parse_ip_list(var: &str, raw: &str) -> Result<Vec<std::net::IpAddr>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_as(var, s))
        .collect()
}

fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
