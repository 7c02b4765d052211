use std::path::Path;
use std::sync::Arc;

use crate::output::print_json;
use stagehand_core::orchestrator::Orchestrator;
use stagehand_core::runner::SystemRunner;

pub fn run(config: Option<&Path>, timeout: Option<u64>, json: bool) -> anyhow::Result<()> {
    let mut cfg = super::load_config(config)?;
    if let Some(secs) = timeout {
        cfg.probe.timeout_secs = secs;
    }

    let rt = super::runtime()?;
    let report = rt.block_on(async {
        let orchestrator = Orchestrator::from_config(&cfg, Arc::new(SystemRunner))?;
        let result = orchestrator.wait_for_database().await;
        orchestrator.shutdown().await;
        result
    })?;

    if json {
        print_json(&serde_json::json!({
            "ready": true,
            "attempts": report.attempts,
            "elapsed_ms": report.elapsed.as_millis() as u64,
        }))?;
    } else {
        println!(
            "database ready after {} attempt(s) in {:.1}s",
            report.attempts,
            report.elapsed.as_secs_f64()
        );
    }
    Ok(())
}
