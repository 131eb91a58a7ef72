use keel_core::KeelConfig;
use keel_registry::{Docker, ImageRegistry};
use keel_state::{DeployLock, VersionStore};
use tracing::warn;

pub async fn status(config: &KeelConfig, format: &str, history: usize) -> anyhow::Result<()> {
    let image = &config.service.image;
    let store = VersionStore::from_config(&config.state);
    let docker = Docker::from_config(&config.service);

    let current = store.read_marker()?;
    let tags = docker.list_tags(image).await.unwrap_or_else(|e| {
        warn!(error = %e, "could not list image tags");
        Vec::new()
    });
    let active = docker.currently_active_tag(image).await.unwrap_or_else(|e| {
        warn!(error = %e, "could not inspect running containers");
        None
    });
    let lock = DeployLock::holder(&config.state.dir, image);
    let snapshot = snapshot_path(config);
    let entries = store.history()?;
    let recent = &entries[entries.len().saturating_sub(history)..];

    match format {
        "json" => {
            let value = serde_json::json!({
                "image": image,
                "version": current.map(|v| v.to_string()),
                "active": active.map(|v| v.to_string()),
                "tags": tags.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "lock": lock,
                "snapshot": snapshot,
                "history": recent
                    .iter()
                    .map(|e| serde_json::json!({
                        "at": e.at,
                        "action": e.action.as_str(),
                        "version": e.version.to_string(),
                    }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => {
            let or_none = |v: Option<String>| v.unwrap_or_else(|| "none".to_string());
            println!("Image:    {image}");
            println!("Version:  {}", or_none(current.map(|v| v.to_string())));
            println!("Running:  {}", or_none(active.map(|v| v.to_string())));
            let tags: Vec<String> = tags.iter().map(ToString::to_string).collect();
            println!("Tags:     {}", if tags.is_empty() { "none".to_string() } else { tags.join(", ") });
            println!("Lock:     {}", or_none(lock));
            println!("Snapshot: {}", or_none(snapshot));
            if !recent.is_empty() {
                println!("History:");
                for entry in recent {
                    println!("  {} {:<11} {}", entry.at, entry.action.as_str(), entry.version);
                }
            }
        }
    }
    Ok(())
}

/// The backup directory, when one has been taken.
fn snapshot_path(config: &KeelConfig) -> Option<String> {
    config
        .backup
        .as_ref()
        .filter(|backup| keel_rollout::has_snapshot(backup))
        .map(|backup| backup.dest.display().to_string())
}
