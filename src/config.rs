use crate::core::entitlements::{EntitlementPolicy, TierPlan};
use crate::core::fallback::DEFAULT_AGE_SPAN;
use crate::core::period::PeriodPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub profiles: ProfileSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub entitlements: EntitlementSettings,
    #[serde(default)]
    pub usage: UsageSettings,
    #[serde(default)]
    pub compatibility: CompatibilitySettings,
    #[serde(default)]
    pub notifier: NotifierSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

/// PostgreSQL ledger. Without a URL the service keeps its ledger in memory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

/// Appwrite profile source
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileSettings {
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub database_id: String,
    #[serde(default = "default_profile_collection")]
    pub collection: String,
    #[serde(default = "default_profile_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: String::new(),
            project_id: String::new(),
            database_id: String::new(),
            collection: default_profile_collection(),
            timeout_secs: default_profile_timeout(),
        }
    }
}

fn default_profile_collection() -> String { "pet_profiles".to_string() }
fn default_profile_timeout() -> u64 { 5 }

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub redis_url: Option<String>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_ttl_secs(),
            l1_cache_size: default_l1_cache_size(),
        }
    }
}

fn default_ttl_secs() -> u64 { 300 }
fn default_l1_cache_size() -> u64 { 1000 }

/// Per-tier plans
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementSettings {
    #[serde(default = "default_premium_plan")]
    pub premium: TierPlan,
    #[serde(default = "default_gold_plan")]
    pub gold: TierPlan,
}

impl Default for EntitlementSettings {
    fn default() -> Self {
        Self {
            premium: default_premium_plan(),
            gold: default_gold_plan(),
        }
    }
}

impl EntitlementSettings {
    pub fn policy(&self) -> EntitlementPolicy {
        EntitlementPolicy {
            premium: self.premium,
            gold: self.gold,
        }
    }
}

fn default_premium_plan() -> TierPlan { EntitlementPolicy::default().premium }
fn default_gold_plan() -> TierPlan { EntitlementPolicy::default().gold }

#[derive(Debug, Clone, Deserialize)]
pub struct UsageSettings {
    #[serde(default = "default_period_days")]
    pub period_days: u32,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            period_days: default_period_days(),
        }
    }
}

impl UsageSettings {
    pub fn policy(&self) -> PeriodPolicy {
        PeriodPolicy::days(self.period_days)
    }
}

fn default_period_days() -> u32 { 7 }

#[derive(Debug, Clone, Deserialize)]
pub struct CompatibilitySettings {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_scorer_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_age_span")]
    pub age_span_years: f64,
}

impl Default for CompatibilitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            timeout_ms: default_scorer_timeout_ms(),
            age_span_years: default_age_span(),
        }
    }
}

fn default_scorer_timeout_ms() -> u64 { 2000 }
fn default_age_span() -> f64 { DEFAULT_AGE_SPAN }

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierSettings {
    pub webhook_url: Option<String>,
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notifier_timeout(),
        }
    }
}

fn default_notifier_timeout() -> u64 { 3 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Serde defaults on every section
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with PAWMATCH__)
    /// 5. DATABASE_URL
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., PAWMATCH__SERVER__PORT -> server.port
            .add_source(environment())
            .build()?;

        apply_database_url(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        apply_database_url(settings)?.try_deserialize()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("PAWMATCH")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// The conventional DATABASE_URL wins over any configured URL
fn apply_database_url(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => Config::builder()
            .add_source(settings)
            .set_override("database.url", url)?
            .build(),
        _ => Ok(settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.usage.period_days, 7);
        assert_eq!(settings.compatibility.timeout_ms, 2000);
        assert!(settings.database.url.is_none());
        assert_eq!(settings.entitlements.policy(), EntitlementPolicy::default());
    }

    #[test]
    fn test_default_logging() {
        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "json");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = std::env::temp_dir()
            .join(format!("pawmatch-config-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            "[entitlements.premium]
super_likes_per_period = 3
rewinds_per_period = 1

[usage]
period_days = 1
"
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.entitlements.premium.super_likes_per_period, 3);
        assert!(!settings.entitlements.premium.unlimited_rewinds);
        assert!(settings.entitlements.gold.unlimited_rewinds);
        assert_eq!(settings.usage.period_days, 1);
        assert_eq!(settings.server.host, "0.0.0.0");
    }
}
