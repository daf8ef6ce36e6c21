use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{parse_timezone, PropertyClock};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub property: PropertyConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Settings of the hotel the engine prices for.
#[derive(Clone, Debug)]
pub struct PropertyConfig {
    /// IANA zone name; discount windows and blackout dates are local to it.
    pub timezone: String,
    pub currency: String,
    pub tax_rate: Decimal,
    pub service_charge_rate: Decimal,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub property_timezone: Option<String>,
    pub property_currency: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://folio.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            property: PropertyConfig {
                timezone: "UTC".to_string(),
                currency: "USD".to_string(),
                tax_rate: Decimal::ZERO,
                service_charge_rate: Decimal::ZERO,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("folio.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Clock for the configured property timezone. Only valid after
    /// [`AppConfig::validate`] has accepted the zone name.
    pub fn property_clock(&self) -> Result<PropertyClock, ConfigError> {
        parse_timezone(&self.property.timezone).map(PropertyClock::new).ok_or_else(|| {
            ConfigError::Validation(format!(
                "property.timezone `{}` is not a known IANA timezone",
                self.property.timezone
            ))
        })
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(property) = patch.property {
            if let Some(timezone) = property.timezone {
                self.property.timezone = timezone;
            }
            if let Some(currency) = property.currency {
                self.property.currency = currency;
            }
            if let Some(tax_rate) = property.tax_rate {
                self.property.tax_rate = tax_rate;
            }
            if let Some(service_charge_rate) = property.service_charge_rate {
                self.property.service_charge_rate = service_charge_rate;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FOLIO_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FOLIO_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("FOLIO_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FOLIO_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FOLIO_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FOLIO_PROPERTY_TIMEZONE") {
            self.property.timezone = value;
        }
        if let Some(value) = read_env("FOLIO_PROPERTY_CURRENCY") {
            self.property.currency = value;
        }
        if let Some(value) = read_env("FOLIO_PROPERTY_TAX_RATE") {
            self.property.tax_rate = parse_decimal("FOLIO_PROPERTY_TAX_RATE", &value)?;
        }
        if let Some(value) = read_env("FOLIO_PROPERTY_SERVICE_CHARGE_RATE") {
            self.property.service_charge_rate =
                parse_decimal("FOLIO_PROPERTY_SERVICE_CHARGE_RATE", &value)?;
        }

        let log_level = read_env("FOLIO_LOGGING_LEVEL").or_else(|| read_env("FOLIO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("FOLIO_LOGGING_FORMAT").or_else(|| read_env("FOLIO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(timezone) = overrides.property_timezone {
            self.property.timezone = timezone;
        }
        if let Some(currency) = overrides.property_currency {
            self.property.currency = currency;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_property(&self.property)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("folio.toml"), PathBuf::from("config/folio.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_property(property: &PropertyConfig) -> Result<(), ConfigError> {
    if parse_timezone(&property.timezone).is_none() {
        return Err(ConfigError::Validation(format!(
            "property.timezone `{}` is not a known IANA timezone (e.g. `Asia/Jakarta`, `UTC`)",
            property.timezone
        )));
    }

    let currency = property.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "property.currency must be a 3-letter ISO 4217 code".to_string(),
        ));
    }

    let percent_range = Decimal::ZERO..=Decimal::ONE_HUNDRED;
    if !percent_range.contains(&property.tax_rate) {
        return Err(ConfigError::Validation(
            "property.tax_rate must be in range 0..=100".to_string(),
        ));
    }
    if !percent_range.contains(&property.service_charge_rate) {
        return Err(ConfigError::Validation(
            "property.service_charge_rate must be in range 0..=100".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    property: Option<PropertyPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PropertyPatch {
    timezone: Option<String>,
    currency: Option<String>,
    tax_rate: Option<Decimal>,
    service_charge_rate: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.property.timezone == "UTC", "default timezone should be UTC")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;
        ensure(config.property_clock().is_ok(), "default timezone should yield a clock")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_FOLIO_TZ", "Asia/Jakarta");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("folio.toml");
            fs::write(
                &path,
                r#"
[property]
timezone = "${TEST_FOLIO_TZ}"
currency = "IDR"
tax_rate = "11"
service_charge_rate = 10
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.property.timezone == "Asia/Jakarta", "timezone should be interpolated")?;
            ensure(config.property.currency == "IDR", "currency should come from file")?;
            ensure(config.property.tax_rate == Decimal::new(11, 0), "tax rate should parse")?;
            ensure(
                config.property.service_charge_rate == Decimal::new(10, 0),
                "service charge should parse from a toml number",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_FOLIO_TZ"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FOLIO_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("FOLIO_PROPERTY_TIMEZONE", "Europe/Lisbon");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("folio.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[property]
timezone = "Asia/Bangkok"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.property.timezone == "Europe/Lisbon",
                "env timezone should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["FOLIO_DATABASE_URL", "FOLIO_PROPERTY_TIMEZONE"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FOLIO_LOG_LEVEL", "warn");
        env::set_var("FOLIO_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["FOLIO_LOG_LEVEL", "FOLIO_LOG_FORMAT"]);
        result
    }

    #[test]
    fn unknown_timezone_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                property_timezone: Some("Atlantis/Lost".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("property.timezone")),
            "validation failure should mention property.timezone",
        )
    }

    #[test]
    fn invalid_rate_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FOLIO_PROPERTY_TAX_RATE", "eleven");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected env override failure".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "FOLIO_PROPERTY_TAX_RATE", "error should name the env key")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["FOLIO_PROPERTY_TAX_RATE"]);
        result
    }

    #[test]
    fn out_of_range_service_charge_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("FOLIO_PROPERTY_SERVICE_CHARGE_RATE", "150");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected validation failure".to_string()),
            Err(ConfigError::Validation(message)) => ensure(
                message.contains("property.service_charge_rate"),
                "validation failure should mention the field",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["FOLIO_PROPERTY_SERVICE_CHARGE_RATE"]);
        result
    }
}
