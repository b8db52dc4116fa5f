//! Outbound consumers of lifecycle events.
//!
//! Both sinks are fire-and-forget: the transition has already committed by
//! the time an event reaches them, so delivery failures are logged and the
//! engine never hears about them.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use siteline_core::audit::{LifecycleEvent, LifecycleSink};
use siteline_core::config::NotifierConfig;
use siteline_db::DbPool;
use tracing::{error, warn};

/// Posts each lifecycle event as JSON to the configured webhook endpoint.
pub struct WebhookSink {
    client: reqwest::Client,
    webhook_url: String,
    auth_token: Option<SecretString>,
}

impl WebhookSink {
    /// Build a sink from config. Returns `None` when the notifier is
    /// disabled or has no webhook URL.
    pub fn from_config(config: &NotifierConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let webhook_url = config.webhook_url.as_deref()?.trim().to_string();
        if webhook_url.is_empty() {
            return None;
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|build_error| {
                warn!(
                    event_name = "notify.webhook.client_init_failed",
                    error = %build_error,
                    "webhook client could not be built, notifier disabled"
                );
            })
            .ok()?;

        Some(Self { client, webhook_url, auth_token: config.auth_token.clone() })
    }
}

impl LifecycleSink for WebhookSink {
    fn emit(&self, event: LifecycleEvent) {
        let mut request = self.client.post(&self.webhook_url).json(&event);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(
                        event_name = "notify.webhook.rejected",
                        entity_type = %event.entity_type,
                        entity_id = %event.entity_id,
                        correlation_id = %event.correlation_id,
                        http_status = %response.status(),
                        "webhook endpoint rejected lifecycle event"
                    );
                }
                Err(send_error) => {
                    warn!(
                        event_name = "notify.webhook.send_failed",
                        entity_type = %event.entity_type,
                        entity_id = %event.entity_id,
                        correlation_id = %event.correlation_id,
                        error = %send_error,
                        "failed to deliver lifecycle event to webhook"
                    );
                }
            }
        });
    }
}

/// Appends each lifecycle event to the `transition_audit` table.
pub struct SqlAuditWriter {
    pool: DbPool,
}

impl SqlAuditWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl LifecycleSink for SqlAuditWriter {
    fn emit(&self, event: LifecycleEvent) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(write_error) = siteline_db::audit::append_event(&pool, &event).await {
                error!(
                    event_name = "notify.audit.write_failed",
                    entity_type = %event.entity_type,
                    entity_id = %event.entity_id,
                    correlation_id = %event.correlation_id,
                    error = %write_error,
                    "failed to append lifecycle audit row"
                );
            }
        });
    }
}

/// Fans one event out to every registered sink.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn LifecycleSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn LifecycleSink>>) -> Self {
        Self { sinks }
    }
}

impl LifecycleSink for FanoutSink {
    fn emit(&self, event: LifecycleEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use siteline_core::audit::{
        InMemoryLifecycleSink, LifecycleEvent, LifecycleEventKind, LifecycleSink,
    };
    use siteline_core::config::NotifierConfig;
    use siteline_core::domain::document::{Actor, DocumentId, EntityType};
    use siteline_db::{connect_with_settings, migrations};

    use super::{FanoutSink, SqlAuditWriter, WebhookSink};

    fn transition_event() -> LifecycleEvent {
        LifecycleEvent::new(
            EntityType::WorkOrder,
            DocumentId::new("WO-N1"),
            LifecycleEventKind::Transitioned,
            &Actor::supervisor("U-1"),
            "req-1",
        )
        .with_action("issue")
        .with_statuses(Some("Draft"), "Issued")
        .with_versions(Some(1), 2)
    }

    #[test]
    fn webhook_sink_is_absent_when_notifier_is_disabled() {
        let config = NotifierConfig {
            enabled: false,
            webhook_url: Some("https://hooks.example.test/siteline".to_string()),
            auth_token: None,
            timeout_secs: 5,
        };
        assert!(WebhookSink::from_config(&config).is_none());
    }

    #[test]
    fn webhook_sink_requires_a_url_when_enabled() {
        let config =
            NotifierConfig { enabled: true, webhook_url: None, auth_token: None, timeout_secs: 5 };
        assert!(WebhookSink::from_config(&config).is_none());

        let configured = NotifierConfig {
            enabled: true,
            webhook_url: Some("https://hooks.example.test/siteline".to_string()),
            auth_token: None,
            timeout_secs: 5,
        };
        assert!(WebhookSink::from_config(&configured).is_some());
    }

    #[tokio::test]
    async fn sql_audit_writer_appends_rows_for_emitted_events() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let writer = SqlAuditWriter::new(pool.clone());
        writer.emit(transition_event());

        // emit spawns the write; give the task a moment to land.
        for _ in 0..50 {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transition_audit")
                .fetch_one(&pool)
                .await
                .expect("count");
            if count == 1 {
                pool.close().await;
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("audit row was not written");
    }

    #[tokio::test]
    async fn fanout_delivers_to_every_sink() {
        let first = InMemoryLifecycleSink::default();
        let second = InMemoryLifecycleSink::default();
        let fanout = FanoutSink::new(vec![
            Arc::new(first.clone()) as Arc<dyn LifecycleSink>,
            Arc::new(second.clone()) as Arc<dyn LifecycleSink>,
        ]);

        fanout.emit(transition_event());

        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events().len(), 1);
        assert_eq!(first.events()[0].action.as_deref(), Some("issue"));
    }
}
