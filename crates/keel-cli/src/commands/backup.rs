use anyhow::{Context, anyhow};
use keel_core::{BackupConfig, KeelConfig};
use keel_state::DeployLock;

fn backup_section(config: &KeelConfig) -> anyhow::Result<&BackupConfig> {
    config
        .backup
        .as_ref()
        .ok_or_else(|| anyhow!("no [backup] section configured (or KEEL_BACKUP_DEST)"))
}

pub fn backup(config: &KeelConfig) -> anyhow::Result<()> {
    let backup = backup_section(config)?;
    let _lock = DeployLock::acquire(&config.state.dir, &config.service.image)?;
    let stats = keel_rollout::take_backup(backup)
        .with_context(|| format!("snapshot of {} failed", backup.source.display()))?;
    println!(
        "✓ Backed up {} files ({:.1} MB) to {}",
        stats.files,
        stats.bytes as f64 / 1_048_576.0,
        backup.dest.display()
    );
    Ok(())
}

pub fn restore(config: &KeelConfig) -> anyhow::Result<()> {
    let backup = backup_section(config)?;
    let _lock = DeployLock::acquire(&config.state.dir, &config.service.image)?;
    let stats = keel_rollout::restore_backup(backup)
        .with_context(|| format!("restore of {} failed", backup.source.display()))?;
    println!(
        "✓ Restored {} from {}: {} copied, {} unchanged, {} removed",
        backup.source.display(),
        backup.dest.display(),
        stats.copied,
        stats.unchanged,
        stats.removed
    );
    Ok(())
}
