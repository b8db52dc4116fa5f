use crate::connection::DbPool;
use siteline_core::errors::StoreError;
use sqlx::Executor;

/// Canonical seed documents and their verification contract, one per entity
/// type, each parked partway through its lifecycle.
const SEED_DOCUMENTS: &[SeedDocumentContract] = &[
    SeedDocumentContract {
        entity_type: "work_order",
        entity_id: "WO-SEED-001",
        status: "Draft",
        version: 1,
        expected_snapshot_count: 0,
        description: "Blockwork order, not yet issued",
    },
    SeedDocumentContract {
        entity_type: "payment_certificate",
        entity_id: "PC-SEED-001",
        status: "Certified",
        version: 2,
        expected_snapshot_count: 1,
        description: "Certified interim certificate awaiting payment",
    },
    SeedDocumentContract {
        entity_type: "issue",
        entity_id: "ISS-SEED-001",
        status: "In Progress",
        version: 2,
        expected_snapshot_count: 1,
        description: "Waterproofing issue being worked",
    },
    SeedDocumentContract {
        entity_type: "petty_cash_claim",
        entity_id: "PCC-SEED-001",
        status: "Rejected",
        version: 3,
        expected_snapshot_count: 2,
        description: "Rejected claim at its terminal status",
    },
    SeedDocumentContract {
        entity_type: "dpr",
        entity_id: "DPR-SEED-001",
        status: "Draft",
        version: 2,
        expected_snapshot_count: 1,
        description: "Daily progress report with one edit in its history",
    },
];

const SEED_AUDIT_IDS: &[&str] =
    &["aud-seed-001", "aud-seed-002", "aud-seed-003", "aud-seed-004", "aud-seed-005"];

/// Deterministic demo dataset covering every entity type.
pub struct LifecycleSeedDataset;

impl LifecycleSeedDataset {
    /// SQL fixture content for the seed dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/lifecycle_seed_data.sql");

    /// Load the seed dataset into the database.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, StoreError> {
        let mut tx = pool.begin().await.map_err(backend)?;
        tx.execute(sqlx::query(Self::SQL)).await.map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        let documents_seeded = SEED_DOCUMENTS
            .iter()
            .map(|contract| DocumentSeedInfo {
                entity_type: contract.entity_type,
                entity_id: contract.entity_id,
                status: contract.status,
                description: contract.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { documents_seeded })
    }

    /// Verify that the seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, StoreError> {
        let mut checks = Vec::new();

        for contract in SEED_DOCUMENTS {
            let document_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM document
                    WHERE entity_type = ?1 AND entity_id = ?2 AND status = ?3 AND version = ?4
                 )",
            )
            .bind(contract.entity_type)
            .bind(contract.entity_id)
            .bind(contract.status)
            .bind(contract.version)
            .fetch_one(pool)
            .await
            .map_err(backend)?;
            checks.push((contract.entity_id, document_ok == 1));

            let snapshot_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM document_snapshot WHERE entity_type = ?1 AND entity_id = ?2",
            )
            .bind(contract.entity_type)
            .bind(contract.entity_id)
            .fetch_one(pool)
            .await
            .map_err(backend)?;
            checks.push((
                contract.entity_id,
                snapshot_count == contract.expected_snapshot_count,
            ));
        }

        let quoted_audits = sql_array_from_ids(SEED_AUDIT_IDS);
        let audit_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM transition_audit WHERE id IN {quoted_audits}"
        ))
        .fetch_one(pool)
        .await
        .map_err(backend)?;
        checks.push(("audit-events", audit_count == SEED_AUDIT_IDS.len() as i64));

        let passed = checks.iter().all(|(_, ok)| *ok);
        let failures = checks
            .iter()
            .filter(|(_, ok)| !*ok)
            .map(|(label, _)| label.to_string())
            .collect::<Vec<_>>();

        Ok(VerificationResult { passed, failures })
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}

struct SeedDocumentContract {
    entity_type: &'static str,
    entity_id: &'static str,
    status: &'static str,
    version: i64,
    expected_snapshot_count: i64,
    description: &'static str,
}

#[derive(Clone, Debug)]
pub struct DocumentSeedInfo {
    pub entity_type: &'static str,
    pub entity_id: &'static str,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Debug)]
pub struct SeedResult {
    pub documents_seeded: Vec<DocumentSeedInfo>,
}

#[derive(Clone, Debug)]
pub struct VerificationResult {
    pub passed: bool,
    pub failures: Vec<String>,
}

#[cfg(test)]
mod tests {
    use siteline_core::domain::document::{DocumentId, EntityType};
    use siteline_core::store::{DocumentStore, SnapshotStore};

    use super::LifecycleSeedDataset;
    use crate::store::SqlLifecycleStore;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_loads_and_verifies_against_its_contract() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let result = LifecycleSeedDataset::load(&pool).await.expect("load seed");
        assert_eq!(result.documents_seeded.len(), 5);

        let verification = LifecycleSeedDataset::verify(&pool).await.expect("verify seed");
        assert!(verification.passed, "failures: {:?}", verification.failures);

        pool.close().await;
    }

    #[tokio::test]
    async fn seeded_documents_read_back_through_the_store() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        LifecycleSeedDataset::load(&pool).await.expect("load seed");

        let store = SqlLifecycleStore::new(pool.clone());
        let certificate = store
            .load(EntityType::PaymentCertificate, &DocumentId::new("PC-SEED-001"))
            .await
            .expect("load")
            .expect("seeded certificate");
        assert_eq!(certificate.status, "Certified");
        assert_eq!(certificate.version, 2);

        let snapshot = store
            .get(EntityType::PaymentCertificate, &DocumentId::new("PC-SEED-001"), 1)
            .await
            .expect("query")
            .expect("seeded snapshot");
        assert_eq!(snapshot.status, "Draft");

        pool.close().await;
    }

    #[tokio::test]
    async fn verify_fails_before_seeding() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let verification = LifecycleSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.passed);

        pool.close().await;
    }
}
