pub mod config;
pub mod coupon;
pub mod discount;
pub mod finalize;
pub mod ledger;
pub mod migrate;
pub mod price;
pub mod seed;
pub mod validate;

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use folio_core::config::{AppConfig, LoadOptions};
use folio_core::errors::{ApplicationError, InterfaceError};
use folio_db::{connect_from_config, migrations, DbPool};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use uuid::Uuid;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_INPUT: u8 = 6;
pub const EXIT_ENGINE: u8 = 7;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn from_error(command: &str, error: CommandError) -> Self {
        let (error_class, message, exit_code) = error;
        Self::failure(command, error_class, message, exit_code)
    }
}

/// `(error_class, message, exit_code)` carried out of a command's async body.
pub(crate) type CommandError = (&'static str, String, u8);

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// Connects and applies pending migrations so every command sees the
/// current schema.
pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, CommandError> {
    let pool = connect_from_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}

/// Engine failures surface with the interface-level message and a fresh
/// correlation id; the detail goes to the log.
pub(crate) fn engine_error(error: ApplicationError) -> CommandError {
    let correlation_id = Uuid::new_v4().to_string();
    tracing::error!(
        event_name = "cli.engine.failed",
        correlation_id = %correlation_id,
        error = %error,
        "billing engine call failed"
    );
    let interface = error.into_interface(correlation_id.clone());
    let message =
        format!("{} ({interface}; correlation_id={correlation_id})", interface.user_message());
    match interface {
        InterfaceError::BadRequest { .. } => ("input", message, EXIT_INPUT),
        InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
            ("engine", message, EXIT_ENGINE)
        }
    }
}

pub(crate) fn store_error(error: impl std::fmt::Display) -> CommandError {
    ("store", error.to_string(), EXIT_ENGINE)
}

pub(crate) fn input_error(error: impl std::fmt::Display) -> CommandError {
    ("input", error.to_string(), EXIT_INPUT)
}

pub(crate) fn read_json_value(path: &Path) -> anyhow::Result<Value> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("could not read `{}`", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("`{}` is not valid JSON", path.display()))
}

pub(crate) fn decode_json<T: DeserializeOwned>(path: &Path, value: Value) -> anyhow::Result<T> {
    serde_json::from_value(value)
        .with_context(|| format!("`{}` does not match the expected shape", path.display()))
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|error| ("serialization", error.to_string(), EXIT_ENGINE))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, CommandError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|error| input_error(format!("invalid date `{raw}` (expected YYYY-MM-DD): {error}")))
}

/// `--today` when given, otherwise the property's calendar day.
pub(crate) fn resolve_today(config: &AppConfig, raw: Option<&str>) -> Result<NaiveDate, CommandError> {
    match raw {
        Some(raw) => parse_date(raw),
        None => config
            .property_clock()
            .map(|clock| clock.today())
            .map_err(|error| ("config_validation", error.to_string(), EXIT_CONFIG)),
    }
}

/// Reads and decodes a JSON request file, reporting problems as input errors.
pub(crate) fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T, CommandError> {
    read_json_value(path)
        .and_then(|value| decode_json(path, value))
        .map_err(|error| input_error(format!("{error:#}")))
}

/// Runs `body` on a fresh current-thread runtime after loading config.
pub(crate) fn run_with_config<F, Fut>(command: &str, body: F) -> CommandResult
where
    F: FnOnce(AppConfig) -> Fut,
    Fut: std::future::Future<Output = Result<CommandResult, CommandError>>,
{
    let config = match load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(command) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    match runtime.block_on(body(config)) {
        Ok(result) => result,
        Err(error) => CommandResult::from_error(command, error),
    }
}
