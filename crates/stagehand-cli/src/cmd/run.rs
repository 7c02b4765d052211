use std::path::Path;
use std::sync::Arc;

use stagehand_core::orchestrator::Orchestrator;
use stagehand_core::runner::SystemRunner;
use stagehand_core::server::ServerCommand;

/// The container entry point. On success this never returns: the process
/// image is replaced by the server.
pub fn run(config: Option<&Path>) -> anyhow::Result<()> {
    let cfg = super::load_config(config)?;
    // Render the server command up front so an empty one fails before the
    // database is touched.
    let server = ServerCommand::from_config(&cfg)?;

    let rt = super::runtime()?;
    rt.block_on(async {
        let orchestrator = Orchestrator::from_config(&cfg, Arc::new(SystemRunner))?;
        let result = orchestrator.prepare().await;
        orchestrator.shutdown().await;
        result
    })?;
    drop(rt);

    Err(server.exec().into())
}
