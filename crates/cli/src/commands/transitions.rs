use serde::Serialize;
use siteline_core::domain::document::EntityType;
use siteline_core::registry;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct EdgeRow {
    from_status: &'static str,
    action: &'static str,
    to_status: &'static str,
    requires_confirmation: bool,
    locks_document: bool,
}

#[derive(Debug, Serialize)]
struct EntityTable {
    entity_type: &'static str,
    resource: &'static str,
    initial_status: &'static str,
    edges: Vec<EdgeRow>,
}

#[derive(Debug, Serialize)]
struct TransitionsReport {
    entity_types: Vec<EntityTable>,
}

pub fn run(resource: Option<&str>, json_output: bool) -> CommandResult {
    let selected: Vec<EntityType> = match resource {
        Some(slug) => match EntityType::from_resource_slug(slug) {
            Some(entity_type) => vec![entity_type],
            None => {
                return CommandResult::failure(
                    "transitions",
                    "unknown_resource",
                    format!("unknown resource `{slug}`"),
                    2,
                );
            }
        },
        None => EntityType::ALL.to_vec(),
    };

    let report = TransitionsReport {
        entity_types: selected.into_iter().map(entity_table).collect(),
    };

    if json_output {
        let output = serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"));
        return CommandResult { exit_code: 0, output };
    }

    CommandResult { exit_code: 0, output: render_human(&report) }
}

fn entity_table(entity_type: EntityType) -> EntityTable {
    EntityTable {
        entity_type: entity_type.as_str(),
        resource: entity_type.resource_slug(),
        initial_status: registry::initial_status(entity_type),
        edges: registry::edges(entity_type)
            .iter()
            .map(|edge| EdgeRow {
                from_status: edge.from_status,
                action: edge.action,
                to_status: edge.to_status,
                requires_confirmation: edge.requires_confirmation,
                locks_document: edge.locks_document,
            })
            .collect(),
    }
}

fn render_human(report: &TransitionsReport) -> String {
    let mut lines = Vec::new();

    for table in &report.entity_types {
        lines.push(format!(
            "{} ({}), starts at `{}`",
            table.entity_type, table.resource, table.initial_status
        ));
        for edge in &table.edges {
            let mut flags = Vec::new();
            if edge.requires_confirmation {
                flags.push("confirm");
            }
            if edge.locks_document {
                flags.push("locks");
            }
            let suffix =
                if flags.is_empty() { String::new() } else { format!("  [{}]", flags.join(", ")) };
            lines.push(format!(
                "  {} -({})-> {}{}",
                edge.from_status, edge.action, edge.to_status, suffix
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn unknown_resource_fails_with_a_dedicated_error_class() {
        let result = run(Some("invoices"), false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("unknown_resource"));
    }

    #[test]
    fn single_resource_output_contains_only_that_table() {
        let result = run(Some("petty-cash-claims"), false);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("petty_cash_claim"));
        assert!(result.output.contains("Submitted -(approve)-> Approved"));
        assert!(!result.output.contains("work_order"));
    }

    #[test]
    fn json_output_carries_the_locking_flag() {
        let result = run(Some("payment-certificates"), true);
        assert_eq!(result.exit_code, 0);

        let payload: serde_json::Value =
            serde_json::from_str(&result.output).expect("valid JSON");
        let edges = payload["entity_types"][0]["edges"].as_array().expect("edges");
        let mark_paid = edges
            .iter()
            .find(|edge| edge["action"] == "mark-paid" && edge["from_status"] == "Certified")
            .expect("mark-paid edge");
        assert_eq!(mark_paid["locks_document"], true);
        assert_eq!(mark_paid["to_status"], "Fully Paid");
    }

    #[test]
    fn full_listing_covers_every_entity_type() {
        let result = run(None, true);
        assert_eq!(result.exit_code, 0);

        let payload: serde_json::Value =
            serde_json::from_str(&result.output).expect("valid JSON");
        assert_eq!(payload["entity_types"].as_array().expect("array").len(), 5);
    }
}
