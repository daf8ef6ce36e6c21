pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, SeedDiscountInfo, SeedResult, SeedVerification};
pub use repositories::{
    InMemoryBillingStore, RepositoryError, SqlCouponRepository, SqlDiscountRepository,
    SqlUsageLedgerRepository,
};
