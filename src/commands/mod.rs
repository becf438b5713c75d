pub mod create;
pub mod download;
pub mod edit;
pub mod init;
pub mod status;
pub mod team;
pub mod work;

pub use create::*;
pub use download::*;
pub use edit::*;
pub use init::*;
pub use status::*;
pub use team::*;
pub use work::*;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::core::{FileStore, Orchestrator, ProviderRegistry};
use crate::models::Config;

pub(crate) fn load_config(project_root: &Path) -> anyhow::Result<Config> {
    Config::load_from_dir(project_root).context("failed to load siteforge.toml")
}

pub(crate) fn open_store(project_root: &Path, config: &Config) -> anyhow::Result<Arc<FileStore>> {
    let data_dir = project_root.join(&config.storage.data_dir);
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("failed to open data directory {}", data_dir.display()))?;
    Ok(Arc::new(store))
}

pub(crate) fn build_orchestrator(project_root: &Path, config: Config) -> anyhow::Result<Orchestrator> {
    let store = open_store(project_root, &config)?;
    let registry =
        ProviderRegistry::from_config(&config.provider).context("failed to configure providers")?;
    Ok(Orchestrator::new(store, registry, config))
}
