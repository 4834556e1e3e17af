use concierge_db::DemoSeedDataset;

use crate::commands::{async_runtime, load_config, migrated_pool, CommandResult, StepError};

pub fn run(clean: bool) -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;

        if clean {
            DemoSeedDataset::clean(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
            pool.close().await;
            return Ok::<_, StepError>("demo listings and articles removed".to_string());
        }

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.all_present {
            return Err(("seed_verification", failed_checks_message(&verification.checks), 6u8));
        }

        Ok(format!(
            "demo dataset loaded: {} listings, {} knowledge articles",
            seeded.listings_seeded, seeded.articles_seeded
        ))
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err(step) => CommandResult::from_step("seed", step),
    }
}

fn failed_checks_message(checks: &[(&'static str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::failed_checks_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [
            ("listings", true),
            ("whatsapp-contact-listing", false),
            ("knowledge-articles", false),
        ];

        assert_eq!(
            failed_checks_message(&checks),
            "seed verification failed for checks: whatsapp-contact-listing, knowledge-articles"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let checks = [("listings", true), ("active-listings", true)];

        assert_eq!(failed_checks_message(&checks), "some seed data failed to load");
    }
}
