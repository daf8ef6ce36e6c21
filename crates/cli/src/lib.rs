pub mod commands;

use clap::{Parser, Subcommand};
use folio_core::config::{AppConfig, LoadOptions, LogFormat};
use std::process::ExitCode;

use commands::coupon::CouponCommand;
use commands::discount::DiscountCommand;
use commands::finalize::FinalizeArgs;
use commands::ledger::LedgerArgs;
use commands::price::PriceArgs;
use commands::validate::ValidateArgs;

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    about = "Folio discount and invoice operator CLI",
    long_about = "Manage discounts and coupon codes, validate them against a stay, price invoices, and record finalized invoice discounts.",
    after_help = "Examples:\n  folio migrate\n  folio seed\n  folio coupon lookup summer10\n  folio validate --request request.json --today 2026-07-01\n  folio finalize --invoice inv-1001 --request request.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo discount catalog and verify it")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(subcommand, about = "Create, inspect, and retire discounts")]
    Discount(DiscountCommand),
    #[command(subcommand, about = "Look up and manage coupon codes")]
    Coupon(CouponCommand),
    #[command(about = "Check whether a discount applies to a prospective charge")]
    Validate(ValidateArgs),
    #[command(about = "Compute invoice totals from line items and rates")]
    Price(PriceArgs),
    #[command(about = "Record (or clear) the discount on a finalized invoice")]
    Finalize(FinalizeArgs),
    #[command(about = "List invoices recorded against a discount")]
    Ledger(LedgerArgs),
}

/// Logs go to stderr so stdout stays a single JSON document.
fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    // A subscriber may already be installed when commands run in-process.
    if let Err(error) = installed {
        tracing::debug!(
            event_name = "cli.logging.init_skipped",
            error = %error,
            "tracing subscriber already installed"
        );
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Config errors are reported by the command itself.
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Discount(command) => commands::discount::run(command),
        Command::Coupon(command) => commands::coupon::run(command),
        Command::Validate(args) => commands::validate::run(args),
        Command::Price(args) => commands::price::run(args),
        Command::Finalize(args) => commands::finalize::run(args),
        Command::Ledger(args) => commands::ledger::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
