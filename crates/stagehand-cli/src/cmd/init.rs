use anyhow::Context;
use stagehand_core::config::{Config, CONFIG_FILE};
use stagehand_core::io::{atomic_write, write_if_missing};
use std::path::{Path, PathBuf};

const HEADER: &str = "\
# stagehand startup configuration.
# Environment variables (POSTGRES_*, DATABASE_URL, MIGRATIONS_DIR, SEED_FILE,
# APP_HOST, APP_PORT, STARTUP_TIMEOUT_SECS) override values in this file.
";

pub fn run(config: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    let body = serde_yaml::to_string(&Config::default())?;
    let data = format!("{HEADER}{body}");

    let written = if force {
        atomic_write(&path, data.as_bytes())?;
        true
    } else {
        write_if_missing(&path, data.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?
    };

    if written {
        println!("wrote {}", path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(())
}
