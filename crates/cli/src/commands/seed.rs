use folio_db::{DemoSeedDataset, SeedDiscountInfo};

use crate::commands::{open_pool, run_with_config, CommandResult, EXIT_ENGINE};

pub fn run() -> CommandResult {
    run_with_config("seed", |config| async move {
        let pool = open_pool(&config).await?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_ENGINE))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_ENGINE))?;
        pool.close().await;

        if !verification.all_present {
            let message = verification_message(&verification.failed_checks());
            return Err(("seed_verification", message, EXIT_ENGINE));
        }

        Ok(CommandResult::success("seed", summary(&seed_result.discounts_seeded)))
    })
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

fn summary(discounts: &[SeedDiscountInfo]) -> String {
    let lines: Vec<String> = discounts
        .iter()
        .map(|seed| format!("  - {}: {} ({})", seed.coupon_code, seed.discount_id, seed.description))
        .collect();
    format!("demo discount catalog loaded:\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        assert_eq!(
            verification_message(&["SUMMER10", "disc-legacy20"]),
            "Seed verification failed for checks: SUMMER10, disc-legacy20"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }
}
