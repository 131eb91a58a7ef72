pub mod backup;
pub mod deploy;
pub mod status;

use std::path::Path;

use anyhow::Context;
use keel_core::KeelConfig;
use tracing::debug;

pub fn load_config(path: &Path) -> anyhow::Result<KeelConfig> {
    let config = KeelConfig::load(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    debug!(
        image = %config.service.image,
        service = %config.service.service,
        state_dir = ?config.state.dir,
        "configuration loaded"
    );
    Ok(config)
}
