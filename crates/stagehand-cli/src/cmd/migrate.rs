use std::path::Path;
use std::sync::Arc;

use crate::output::print_json;
use stagehand_core::orchestrator::{BootstrapOutcome, Orchestrator};
use stagehand_core::runner::SystemRunner;

pub fn run(config: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let cfg = super::load_config(config)?;
    let rt = super::runtime()?;
    let report = rt.block_on(async {
        let orchestrator = Orchestrator::from_config(&cfg, Arc::new(SystemRunner))?;
        let result = orchestrator.prepare().await;
        orchestrator.shutdown().await;
        result
    })?;

    if json {
        print_json(&serde_json::json!({
            "boot_id": report.boot_id,
            "wait_attempts": report.wait.attempts,
            "wait_ms": report.wait.elapsed.as_millis() as u64,
            "bootstrap": report.bootstrap,
        }))?;
        return Ok(());
    }

    match &report.bootstrap {
        BootstrapOutcome::AlreadyBootstrapped { revision } => println!(
            "already bootstrapped (revision {}); schema upgraded to latest",
            revision.as_deref().unwrap_or("unknown")
        ),
        BootstrapOutcome::Bootstrapped {
            revision,
            generated,
            seeded,
        } => {
            println!("bootstrapped this run");
            if *generated {
                println!(
                    "  generated revision: {}",
                    revision.as_deref().unwrap_or("unknown")
                );
            }
            println!("  seeded: {}", if *seeded { "yes" } else { "no" });
        }
    }
    Ok(())
}
