use crate::commands::CommandResult;
use siteline_core::config::{AppConfig, LoadOptions};
use siteline_db::{connect_with_settings, migrations, LifecycleSeedDataset};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = LifecycleSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = LifecycleSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedOutput, (&'static str, String, u8)> = if !verification.passed {
            let message = if verification.failures.is_empty() {
                "Some seed data failed to load".to_string()
            } else {
                format!(
                    "Seed verification failed for checks: {}",
                    verification.failures.join(", ")
                )
            };
            Err(("seed_verification", message, 6u8))
        } else {
            Ok(SeedOutput { documents: seed_result.documents_seeded })
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let document_descriptions: Vec<String> = output
                .documents
                .iter()
                .map(|doc| {
                    format!(
                        "  - {}: {} at `{}` ({})",
                        doc.entity_type, doc.entity_id, doc.status, doc.description
                    )
                })
                .collect();
            let message = format!(
                "lifecycle seed dataset loaded, one document per entity type:\n{}",
                document_descriptions.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

struct SeedOutput {
    documents: Vec<siteline_db::DocumentSeedInfo>,
}

#[cfg(test)]
mod tests {
    #[test]
    fn verification_error_message_targets_failed_checks() {
        let failures = vec!["PC-SEED-001".to_string(), "audit-events".to_string()];

        let message = if failures.is_empty() {
            "Some seed data failed to load".to_string()
        } else {
            format!("Seed verification failed for checks: {}", failures.join(", "))
        };

        assert_eq!(message, "Seed verification failed for checks: PC-SEED-001, audit-events");
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let failures: Vec<String> = Vec::new();

        let message = if failures.is_empty() {
            "Some seed data failed to load".to_string()
        } else {
            format!("Seed verification failed for checks: {}", failures.join(", "))
        };

        assert_eq!(message, "Some seed data failed to load");
    }
}
