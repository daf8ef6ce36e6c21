use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use folio_core::domain::discount::{Discount, DiscountId, DiscountStatus};
use folio_db::repositories::{DiscountRepository, RepositoryError};
use folio_db::SqlDiscountRepository;

use crate::commands::{
    decode_json, input_error, open_pool, read_json_value, run_with_config, store_error, to_data,
    CommandError, CommandResult, EXIT_INPUT,
};

#[derive(Debug, Subcommand)]
pub enum DiscountCommand {
    #[command(about = "List discounts that have not been deleted")]
    List,
    #[command(about = "Show one discount, including soft-deleted ones")]
    Show { id: String },
    #[command(about = "Create or update a discount from a JSON definition")]
    Upsert {
        #[arg(long, help = "Path to a JSON discount definition")]
        file: PathBuf,
    },
    #[command(about = "Mark a discount active")]
    Activate { id: String },
    #[command(about = "Mark a discount inactive")]
    Deactivate { id: String },
    #[command(about = "Soft-delete a discount")]
    Delete { id: String },
}

pub fn run(command: DiscountCommand) -> CommandResult {
    run_with_config("discount", |config| async move {
        let pool = open_pool(&config).await?;
        let repo = SqlDiscountRepository::new(pool.clone());

        let result = match command {
            DiscountCommand::List => {
                let discounts = repo.list().await.map_err(store_error)?;
                CommandResult::success_with_data(
                    "discount",
                    format!("{} discount(s)", discounts.len()),
                    Some(to_data(&discounts)?),
                )
            }
            DiscountCommand::Show { id } => match repo.find_by_id(&DiscountId(id.clone())).await {
                Ok(Some(discount)) => CommandResult::success_with_data(
                    "discount",
                    format!("discount {id}"),
                    Some(to_data(&discount)?),
                ),
                Ok(None) => return Err(("not_found", format!("discount `{id}` was not found"), EXIT_INPUT)),
                Err(error) => return Err(store_error(error)),
            },
            DiscountCommand::Upsert { file } => {
                let discount = load_definition(&file)?;
                let id = discount.id.clone();
                repo.save(discount).await.map_err(store_error)?;
                let saved = repo.find_by_id(&id).await.map_err(store_error)?;
                CommandResult::success_with_data(
                    "discount",
                    format!("saved discount {}", id.0),
                    Some(to_data(&saved)?),
                )
            }
            DiscountCommand::Activate { id } => {
                set_status(&repo, &id, DiscountStatus::Active).await?;
                CommandResult::success("discount", format!("discount {id} is active"))
            }
            DiscountCommand::Deactivate { id } => {
                set_status(&repo, &id, DiscountStatus::Inactive).await?;
                CommandResult::success("discount", format!("discount {id} is inactive"))
            }
            DiscountCommand::Delete { id } => {
                repo.soft_delete(&DiscountId(id.clone()), Utc::now()).await.map_err(not_found_as_input)?;
                CommandResult::success("discount", format!("discount {id} deleted"))
            }
        };

        pool.close().await;
        Ok(result)
    })
}

async fn set_status(
    repo: &SqlDiscountRepository,
    id: &str,
    status: DiscountStatus,
) -> Result<(), CommandError> {
    repo.set_status(&DiscountId(id.to_string()), status, Utc::now())
        .await
        .map_err(not_found_as_input)
}

fn not_found_as_input(error: RepositoryError) -> CommandError {
    match error {
        RepositoryError::NotFound { .. } => ("not_found", error.to_string(), EXIT_INPUT),
        other => store_error(other),
    }
}

/// Reads a discount definition. Missing `id` gets a generated one and missing
/// lifecycle timestamps default to now.
fn load_definition(path: &std::path::Path) -> Result<Discount, CommandError> {
    let mut value = read_json_value(path).map_err(|error| input_error(format!("{error:#}")))?;
    let now = Utc::now().to_rfc3339();

    let object = value
        .as_object_mut()
        .ok_or_else(|| input_error(format!("`{}` must contain a JSON object", path.display())))?;
    object.entry("id").or_insert_with(|| DiscountId::generate().0.into());
    object.entry("usage_count").or_insert_with(|| 0.into());
    object.entry("blackout_dates").or_insert_with(|| serde_json::json!([]));
    object.entry("applicable_room_types").or_insert_with(|| serde_json::json!([]));
    object.entry("applicable_rate_type_ids").or_insert_with(|| serde_json::json!([]));
    object.entry("created_at").or_insert_with(|| now.clone().into());
    object.entry("updated_at").or_insert_with(|| now.into());

    let discount: Discount =
        decode_json(path, value).map_err(|error| input_error(format!("{error:#}")))?;
    if discount.amount.is_sign_negative() {
        return Err(input_error("discount amount must not be negative"));
    }
    if let (Some(from), Some(until)) = (discount.valid_from, discount.valid_until) {
        if until < from {
            return Err(input_error("valid_until must not be earlier than valid_from"));
        }
    }
    Ok(discount)
}
