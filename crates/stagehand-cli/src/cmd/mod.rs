pub mod config;
pub mod init;
pub mod migrate;
pub mod run;
pub mod status;
pub mod wait;

use anyhow::Context;
use stagehand_core::config::Config;
use std::path::Path;

/// File (or defaults) overlaid with the process environment.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let path = crate::root::resolve_config(explicit);
    let mut cfg = Config::load_or_default(path.as_deref())?;
    cfg.apply_env(|key| std::env::var(key).ok())?;
    if let Some(p) = &path {
        tracing::debug!(config = %p.display(), "loaded configuration");
    }
    Ok(cfg)
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
