use std::collections::BTreeMap;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use crate::providers::{CredentialsConfig, ProviderConfig};

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "TODOTRON_CONFIG";
/// Prefix for environment overrides, nested with `__`
/// (e.g. `TODOTRON_SESSION__SECRET`).
pub const ENV_PREFIX: &str = "TODOTRON_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub bind_address: String,
    /// Externally visible origin of this application, e.g. `https://todo.example.com`.
    pub origin: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Delegated-auth providers keyed by provider id (`google`, `github`, ...).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub gate: GateConfig,
}

impl ConfigV1 {
    /// Session cookies only get the `Secure` flag when we are served over https.
    pub fn secure_cookies(&self) -> bool {
        self.origin.starts_with("https://")
    }
}

/// Builds the figment used at startup: the YAML file merged with `TODOTRON_*` env vars.
pub fn figment() -> Figment {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "./config.yaml".to_string());
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Extracts a `ConfigV1` from any figment (tests feed YAML strings through here).
pub fn extract_config(figment: &Figment) -> Result<ConfigV1, figment::Error> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Load config from "config.yaml" (or `$TODOTRON_CONFIG`) plus environment overrides.
pub fn load_config() -> ConfigV1 {
    match extract_config(&figment()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() {
    let schema = schema_for!(Config);
    match serde_json::to_string_pretty(&schema) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to render schema: {}", e),
    }
}

/// Signing and lifetime settings for session credentials.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct SessionConfig {
    /// HS256 signing secret. Rotating it invalidates every outstanding credential.
    pub secret: String,
    #[serde(default = "default_max_age")]
    pub max_age_in_secs: i64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

fn default_max_age() -> i64 {
    30 * 24 * 60 * 60
}

fn default_cookie_name() -> String {
    "todotron.session-token".to_string()
}

fn default_issuer() -> String {
    "todotron".to_string()
}

/// The remote to-do collection.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_in_ms: u64,
    #[serde(default = "default_backoff")]
    pub rate_limit_backoff_in_ms: u64,
}

fn default_base_url() -> String {
    "https://jsonplaceholder.typicode.com".to_string()
}

fn default_timeout() -> u64 {
    30_000
}

fn default_backoff() -> u64 {
    1_000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            base_url: default_base_url(),
            timeout_in_ms: default_timeout(),
            rate_limit_backoff_in_ms: default_backoff(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct CacheConfig {
    #[serde(default = "default_fresh")]
    pub fresh_in_secs: u64,
    #[serde(default = "default_retention")]
    pub retention_in_secs: u64,
    #[serde(default = "default_sweep")]
    pub sweep_interval_in_secs: u64,
}

fn default_fresh() -> u64 {
    5 * 60
}

fn default_retention() -> u64 {
    10 * 60
}

fn default_sweep() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            fresh_in_secs: default_fresh(),
            retention_in_secs: default_retention(),
            sweep_interval_in_secs: default_sweep(),
        }
    }
}

/// Access gate settings. The built-in allow-list is always present;
/// `public_prefixes` only adds to it.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct GateConfig {
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default)]
    pub public_prefixes: Vec<String>,
}

fn default_login_path() -> String {
    "/login".to_string()
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            login_path: default_login_path(),
            public_prefixes: Vec::new(),
        }
    }
}
