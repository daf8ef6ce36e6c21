use clap::Args;
use folio_core::domain::discount::DiscountId;
use folio_db::repositories::UsageLedgerRepository;
use folio_db::SqlUsageLedgerRepository;

use crate::commands::{open_pool, run_with_config, store_error, to_data, CommandResult};

#[derive(Debug, Args)]
pub struct LedgerArgs {
    #[arg(long, help = "Discount whose invoice ledger rows to list")]
    pub discount: String,
}

pub fn run(args: LedgerArgs) -> CommandResult {
    run_with_config("ledger", |config| async move {
        let pool = open_pool(&config).await?;
        let entries = SqlUsageLedgerRepository::new(pool.clone())
            .list_for_discount(&DiscountId(args.discount.clone()))
            .await;
        pool.close().await;
        let entries = entries.map_err(store_error)?;

        Ok(CommandResult::success_with_data(
            "ledger",
            format!("{} invoice(s) recorded against discount {}", entries.len(), args.discount),
            Some(to_data(&entries)?),
        ))
    })
}
