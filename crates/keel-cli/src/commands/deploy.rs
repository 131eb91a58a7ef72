use std::fmt::Write as _;

use anyhow::{Context, bail};
use keel_core::KeelConfig;
use keel_health::HealthProbe;
use keel_registry::Docker;
use keel_rollout::{DeployReport, Orchestrator, Outcome, RunKind};

fn orchestrator(config: KeelConfig) -> anyhow::Result<Orchestrator<Docker, Docker, HealthProbe>> {
    let docker = Docker::from_config(&config.service);
    let health = HealthProbe::new(
        &config.health.url,
        config.health.timeout(),
        config.health.interval(),
    )
    .context("invalid health URL")?
    .with_request_timeout(config.health.request_timeout());
    Ok(Orchestrator::new(config, docker.clone(), docker, health)?)
}

pub async fn deploy(config: KeelConfig, version: Option<&str>, format: &str) -> anyhow::Result<()> {
    let mut orchestrator = orchestrator(config)?;
    let report = match orchestrator.deploy(version).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Deploy failed in phase {}: {e}", orchestrator.phase());
            return Err(e.into());
        }
    };
    print_report(&report, format)?;
    if !report.succeeded() {
        bail!("deployment rolled back, requested release is not live");
    }
    Ok(())
}

pub async fn rollback(config: KeelConfig, format: &str) -> anyhow::Result<()> {
    let mut orchestrator = orchestrator(config)?;
    let report = match orchestrator.rollback().await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Rollback failed in phase {}: {e}", orchestrator.phase());
            return Err(e.into());
        }
    };
    print_report(&report, format)
}

fn print_report(report: &DeployReport, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(report)?),
        _ => print!("{}", format_report(report)),
    }
    Ok(())
}

pub fn format_report(report: &DeployReport) -> String {
    let mut out = String::new();
    let image = &report.image;
    match (&report.outcome, report.kind) {
        (Outcome::Deployed { version }, _) => {
            let _ = writeln!(out, "✓ Deployed {image}:{version} (was {})", report.previous);
        }
        (Outcome::RolledBack { failed, restored }, RunKind::Deploy) => {
            let _ = writeln!(
                out,
                "✗ {image}:{failed} failed its health check, rolled back to {restored}"
            );
        }
        (Outcome::RolledBack { failed, restored }, RunKind::Rollback) => {
            let _ = writeln!(out, "✓ Rolled back {image} from {failed} to {restored}");
        }
    }
    if !report.removed.is_empty() {
        let removed: Vec<String> = report.removed.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "  Removed: {}", removed.join(", "));
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "  Warning: {warning}");
    }
    out
}
