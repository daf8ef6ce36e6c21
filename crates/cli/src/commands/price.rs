use std::path::PathBuf;

use clap::Args;
use folio_core::billing::pricing::{DeterministicPricingEngine, PricingEngine, PricingInput};
use folio_core::config::PropertyConfig;
use serde_json::Value;

use crate::commands::{
    decode_json, input_error, read_json_value, run_with_config, to_data, CommandError,
    CommandResult,
};

#[derive(Debug, Args)]
pub struct PriceArgs {
    #[arg(long, help = "Path to a JSON pricing input")]
    pub input: PathBuf,
}

/// Computes invoice totals. Rates the input leaves out come from the
/// `[property]` config section. Does not touch the database.
pub fn run(args: PriceArgs) -> CommandResult {
    run_with_config("price", |config| async move {
        let input = load_input(&args.input, &config.property)?;
        let totals = DeterministicPricingEngine.price(&input).rounded();
        let message = format!("total {}", totals.total);
        Ok(CommandResult::success_with_data("price", message, Some(to_data(&totals)?)))
    })
}

fn load_input(path: &std::path::Path, property: &PropertyConfig) -> Result<PricingInput, CommandError> {
    let mut value = read_json_value(path).map_err(|error| input_error(format!("{error:#}")))?;
    apply_property_defaults(&mut value, property)
        .ok_or_else(|| input_error(format!("`{}` must contain a JSON object", path.display())))?;
    let input: PricingInput =
        decode_json(path, value).map_err(|error| input_error(format!("{error:#}")))?;

    if input.items.is_empty() {
        return Err(input_error("pricing input needs at least one item"));
    }
    if input.tax_rate.is_sign_negative() || input.service_charge_rate.is_sign_negative() {
        return Err(input_error("rates must not be negative"));
    }
    Ok(input)
}

fn apply_property_defaults(value: &mut Value, property: &PropertyConfig) -> Option<()> {
    let object = value.as_object_mut()?;
    object
        .entry("tax_rate")
        .or_insert_with(|| Value::String(property.tax_rate.to_string()));
    object
        .entry("service_charge_rate")
        .or_insert_with(|| Value::String(property.service_charge_rate.to_string()));
    Some(())
}
