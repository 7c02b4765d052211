use std::path::Path;
use std::sync::Arc;

use crate::output::{print_json, print_table};
use stagehand_core::orchestrator::Orchestrator;
use stagehand_core::runner::SystemRunner;
use stagehand_core::status::{collect, StatusReport};

pub fn run(config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let cfg = super::load_config(config)?;
    let rt = super::runtime()?;
    let report = rt.block_on(async {
        let orchestrator = Orchestrator::from_config(&cfg, Arc::new(SystemRunner))?;
        let report = collect(&orchestrator).await;
        orchestrator.shutdown().await;
        Ok::<_, stagehand_core::StagehandError>(report)
    })?;

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &StatusReport) {
    let db = &report.database;
    let marker = &report.marker;
    let migrations = &report.migrations;

    let db_state = if db.ready { "ready" } else { "not ready" };
    let db_detail = db.detail.clone().unwrap_or_default();

    let resuming = marker.record.as_ref().is_some_and(|m| m.pending);
    let marker_state = match marker.bootstrapped {
        Some(true) => "bootstrapped",
        Some(false) if resuming => "interrupted",
        Some(false) => "pending",
        None => "unknown",
    };
    let marker_detail = match (&marker.record, &marker.error) {
        (_, Some(err)) => err.clone(),
        (Some(m), None) => format!(
            "revision {} at {}",
            m.revision.as_deref().unwrap_or("-"),
            m.recorded_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        (None, None) => String::new(),
    };

    let migrations_detail = match &migrations.error {
        Some(err) => err.clone(),
        None => format!("{} revision(s) in {}", migrations.revisions.len(), migrations.dir),
    };
    let migrations_state = if migrations.revisions.is_empty() {
        "empty"
    } else {
        "present"
    };

    print_table(
        &["CHECK", "STATE", "DETAIL"],
        vec![
            vec![
                format!("database ({})", db.target),
                db_state.to_string(),
                db_detail,
            ],
            vec![
                format!("marker ({})", marker.backend),
                marker_state.to_string(),
                marker_detail,
            ],
            vec![
                "migrations".to_string(),
                migrations_state.to_string(),
                migrations_detail,
            ],
        ],
    );
}
