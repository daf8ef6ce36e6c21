use chrono::Utc;
use clap::Subcommand;
use folio_core::billing::BillingEngine;
use folio_core::domain::coupon::{CouponCode, CouponCodeId};
use folio_core::domain::discount::DiscountId;
use folio_core::CouponLookup;
use folio_db::repositories::{CouponRepository, RepositoryError};
use folio_db::{SqlCouponRepository, SqlDiscountRepository, SqlUsageLedgerRepository};

use crate::commands::{
    engine_error, open_pool, run_with_config, store_error, to_data, CommandResult, EXIT_INPUT,
};

#[derive(Debug, Subcommand)]
pub enum CouponCommand {
    #[command(about = "Resolve a coupon code (case-insensitive) to its discount")]
    Lookup { code: String },
    #[command(about = "Attach a new coupon code to a discount")]
    Create {
        #[arg(long)]
        discount: String,
        code: String,
    },
    #[command(about = "Delete a coupon code by id")]
    Delete { id: String },
    #[command(about = "List coupon codes attached to a discount")]
    List {
        #[arg(long)]
        discount: String,
    },
}

pub fn run(command: CouponCommand) -> CommandResult {
    run_with_config("coupon", |config| async move {
        let pool = open_pool(&config).await?;

        let result = match command {
            CouponCommand::Lookup { code } => {
                let engine = BillingEngine::new(
                    SqlDiscountRepository::new(pool.clone()),
                    SqlCouponRepository::new(pool.clone()),
                    SqlUsageLedgerRepository::new(pool.clone()),
                );
                let lookup = engine.lookup_coupon(&code).await.map_err(engine_error)?;
                let message = match &lookup {
                    CouponLookup::Found { code, discount_id, .. } => {
                        format!("coupon {code} applies discount {}", discount_id.0)
                    }
                    CouponLookup::NotFound => "Invalid coupon code".to_string(),
                };
                CommandResult::success_with_data("coupon", message, Some(to_data(&lookup)?))
            }
            CouponCommand::Create { discount, code } => {
                if code.trim().is_empty() {
                    return Err(("input", "coupon code must not be blank".to_string(), EXIT_INPUT));
                }
                let coupon = CouponCode::new(
                    CouponCodeId::generate(),
                    DiscountId(discount),
                    &code,
                    Utc::now(),
                );
                let repo = SqlCouponRepository::new(pool.clone());
                match repo.create(coupon.clone()).await {
                    Ok(()) => CommandResult::success_with_data(
                        "coupon",
                        format!("created coupon {}", coupon.code),
                        Some(to_data(&coupon)?),
                    ),
                    Err(error @ RepositoryError::CouponCodeTaken(_)) => {
                        return Err(("coupon_code_taken", error.to_string(), EXIT_INPUT));
                    }
                    Err(error @ RepositoryError::NotFound { .. }) => {
                        return Err(("not_found", error.to_string(), EXIT_INPUT));
                    }
                    Err(error) => return Err(store_error(error)),
                }
            }
            CouponCommand::Delete { id } => {
                let repo = SqlCouponRepository::new(pool.clone());
                match repo.delete(&CouponCodeId(id.clone())).await {
                    Ok(()) => CommandResult::success("coupon", format!("deleted coupon {id}")),
                    Err(error @ RepositoryError::NotFound { .. }) => {
                        return Err(("not_found", error.to_string(), EXIT_INPUT));
                    }
                    Err(error) => return Err(store_error(error)),
                }
            }
            CouponCommand::List { discount } => {
                let repo = SqlCouponRepository::new(pool.clone());
                let coupons = repo
                    .list_for_discount(&DiscountId(discount.clone()))
                    .await
                    .map_err(store_error)?;
                CommandResult::success_with_data(
                    "coupon",
                    format!("{} coupon(s) for discount {discount}", coupons.len()),
                    Some(to_data(&coupons)?),
                )
            }
        };

        pool.close().await;
        Ok(result)
    })
}
