//! Deploy orchestrator — drives one deploy or rollback to a terminal phase.
//!
//! Every transition is logged with a `phase` field. The version marker is
//! only written in `Done` or `RolledBack`; any error leaves it untouched.

use keel_core::{BackupConfig, ImageTag, KeelConfig, Version};
use keel_health::HealthGate;
use keel_registry::{ContainerRuntime, ImageRegistry, RegistryError};
use keel_snapshot::{ExcludeSet, RestoreStats, SnapshotError, SnapshotStats, Snapshotter};
use keel_state::{DeployLock, HistoryAction, VersionStore};
use tracing::{error, info, warn};

use crate::error::DeployError;
use crate::phase::DeployPhase;
use crate::plan::{rotation_candidates, select_rollback_target};
use crate::report::{DeployReport, Outcome, RunKind, Warning};

/// Build the snapshotter for a `[backup]` section.
pub fn snapshotter_for(backup: &BackupConfig) -> Result<Snapshotter, SnapshotError> {
    Ok(Snapshotter::new(ExcludeSet::new(&backup.exclude)?))
}

pub struct Orchestrator<R, C, H> {
    config: KeelConfig,
    registry: R,
    runtime: C,
    health: H,
    store: VersionStore,
    snapshotter: Option<Snapshotter>,
    phases: Vec<DeployPhase>,
}

impl<R, C, H> Orchestrator<R, C, H>
where
    R: ImageRegistry,
    C: ContainerRuntime,
    H: HealthGate,
{
    pub fn new(config: KeelConfig, registry: R, runtime: C, health: H) -> Result<Self, DeployError> {
        let snapshotter = config
            .backup
            .as_ref()
            .map(snapshotter_for)
            .transpose()
            .map_err(DeployError::Excludes)?;
        Ok(Self {
            store: VersionStore::from_config(&config.state),
            config,
            registry,
            runtime,
            health,
            snapshotter,
            phases: Vec::new(),
        })
    }

    /// Phases entered by the last run, in order.
    pub fn phases(&self) -> &[DeployPhase] {
        &self.phases
    }

    pub fn phase(&self) -> DeployPhase {
        self.phases.last().copied().unwrap_or(DeployPhase::Idle)
    }

    fn image(&self) -> &str {
        &self.config.service.image
    }

    fn enter(&mut self, phase: DeployPhase) {
        info!(image = %self.config.service.image, phase = %phase, "entering phase");
        self.phases.push(phase);
    }

    fn lock(&self) -> Result<DeployLock, DeployError> {
        Ok(DeployLock::acquire(&self.config.state.dir, self.image())?)
    }

    /// Build, swap, and health-check the next version.
    ///
    /// `explicit` is a `MAJOR.MINOR` override; without it the patch of the
    /// persisted version is bumped. An unhealthy release is rolled back
    /// and reported as [`Outcome::RolledBack`], not as an error.
    pub async fn deploy(&mut self, explicit: Option<&str>) -> Result<DeployReport, DeployError> {
        self.phases.clear();
        self.enter(DeployPhase::Idle);
        let _lock = self.lock()?;

        let previous = self.store.current_version()?;
        let target = self.store.plan_next(previous, explicit)?;
        let tag = ImageTag::new(self.image(), target);
        info!(%previous, %target, "planning deployment");

        let mut report = DeployReport {
            kind: RunKind::Deploy,
            image: self.image().to_string(),
            previous,
            outcome: Outcome::Deployed { version: target },
            removed: Vec::new(),
            warnings: Vec::new(),
            phases: Vec::new(),
        };

        if let (Some(snapshotter), Some(backup)) = (&self.snapshotter, &self.config.backup) {
            let stats = snapshotter
                .snapshot(&backup.source, &backup.dest)
                .map_err(DeployError::Snapshot)?;
            info!(
                dest = ?backup.dest,
                files = stats.files,
                bytes = stats.bytes,
                "pre-deploy snapshot taken"
            );
        }

        self.enter(DeployPhase::Building);
        let service = &self.config.service;
        if let Err(source) = self
            .registry
            .build(&service.dockerfile, &service.context, &tag)
            .await
        {
            error!(phase = "building", %tag, error = %source, "build failed");
            return Err(DeployError::Build {
                tag: tag.reference(),
                source,
            });
        }

        self.enter(DeployPhase::Swapping);
        let healthy = match self.swap(&tag).await {
            Ok(()) => {
                self.enter(DeployPhase::HealthChecking);
                self.health.await_healthy().await
            }
            Err(e) => {
                error!(phase = "swapping", %tag, error = %e, "swap failed");
                false
            }
        };

        if !healthy {
            self.enter(DeployPhase::Unhealthy);
            warn!(%tag, "release unhealthy, rolling back");
            let (_, restored) = self
                .roll_back(Some(target), Some(previous), &mut report)
                .await?;
            report.outcome = Outcome::RolledBack {
                failed: target,
                restored,
            };
            report.phases = self.phases.clone();
            return Ok(report);
        }

        self.enter(DeployPhase::Healthy);
        self.enter(DeployPhase::Rotating);
        self.rotate(target, &mut report).await;

        self.store.commit(target)?;
        self.store.append_history(HistoryAction::Deployed, target)?;
        self.enter(DeployPhase::Done);
        info!(version = %target, removed = report.removed.len(), "deployment complete");

        report.phases = self.phases.clone();
        Ok(report)
    }

    /// Roll the running service back one version.
    ///
    /// The running tag is asked of the registry first, then the version
    /// marker, then the newest tag.
    pub async fn rollback(&mut self) -> Result<DeployReport, DeployError> {
        self.phases.clear();
        self.enter(DeployPhase::Idle);
        let _lock = self.lock()?;

        let marker = self.store.read_marker()?;
        let mut report = DeployReport {
            kind: RunKind::Rollback,
            image: self.image().to_string(),
            previous: marker.unwrap_or(Version::INITIAL),
            outcome: Outcome::RolledBack {
                failed: marker.unwrap_or(Version::INITIAL),
                restored: marker.unwrap_or(Version::INITIAL),
            },
            removed: Vec::new(),
            warnings: Vec::new(),
            phases: Vec::new(),
        };

        let active = match self.registry.currently_active_tag(self.image()).await {
            Ok(Some(version)) => Some(version),
            Ok(None) => marker,
            Err(e) => {
                warn!(error = %e, "could not determine running tag");
                report.warnings.push(Warning::ActiveTagUnknown {
                    reason: e.to_string(),
                });
                marker
            }
        };

        let (failed, restored) = self.roll_back(active, None, &mut report).await?;
        report.outcome = Outcome::RolledBack { failed, restored };
        report.phases = self.phases.clone();
        Ok(report)
    }

    /// Returns `(replaced, restored)`; ends in `RolledBack` or `Unrecoverable`.
    async fn roll_back(
        &mut self,
        active: Option<Version>,
        known_good: Option<Version>,
        report: &mut DeployReport,
    ) -> Result<(Version, Version), DeployError> {
        self.enter(DeployPhase::RollingBack);
        match self.try_roll_back(active, known_good, report).await {
            Ok((failed, restored)) => {
                self.enter(DeployPhase::RolledBack);
                info!(%failed, version = %restored, "rollback complete");
                Ok((failed, restored))
            }
            Err(e) => {
                self.enter(DeployPhase::Unrecoverable);
                error!(phase = "rolling_back", error = %e, "rollback failed");
                Err(e)
            }
        }
    }

    async fn try_roll_back(
        &self,
        active: Option<Version>,
        known_good: Option<Version>,
        report: &mut DeployReport,
    ) -> Result<(Version, Version), DeployError> {
        let image = self.image();
        let tags = self
            .registry
            .list_tags(image)
            .await
            .map_err(|e| DeployError::Unrecoverable {
                reason: format!("cannot list tags of {image}: {e}"),
            })?;

        let Some(active) = active.or_else(|| tags.last().copied()) else {
            return Err(DeployError::Unrecoverable {
                reason: format!("no versioned tags of {image} exist"),
            });
        };
        let target = select_rollback_target(&tags, active, known_good).ok_or_else(|| {
            DeployError::Unrecoverable {
                reason: format!(
                    "no version of {image} older than {active} to roll back to ({} tag(s) available)",
                    tags.len()
                ),
            }
        })?;
        info!(from = %active, to = %target, "rollback target selected");

        if let (Some(snapshotter), Some(backup)) = (&self.snapshotter, &self.config.backup) {
            let stats = snapshotter
                .restore(&backup.dest, &backup.source)
                .map_err(DeployError::RestoreFailed)?;
            info!(
                copied = stats.copied,
                unchanged = stats.unchanged,
                removed = stats.removed,
                "files restored from snapshot"
            );
        }

        let tag = ImageTag::new(image, target);
        self.swap(&tag)
            .await
            .map_err(|e| DeployError::Unrecoverable {
                reason: format!("swap to {tag} failed: {e}"),
            })?;

        if tags.contains(&active) {
            let failed = ImageTag::new(image, active);
            if self.remove_tag(&failed, report).await {
                report.removed.push(active);
            }
        }

        self.store.commit(target)?;
        self.store
            .append_history(HistoryAction::RolledBack, target)?;
        Ok((active, target))
    }

    async fn swap(&self, tag: &ImageTag) -> Result<(), RegistryError> {
        let service = &self.config.service.service;
        self.runtime.stop(service).await?;
        self.runtime.start(service, tag).await
    }

    async fn rotate(&self, active: Version, report: &mut DeployReport) {
        let tags = match self.registry.list_tags(self.image()).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(phase = "rotating", error = %e, "could not list tags");
                report.warnings.push(Warning::RegistryUnavailable {
                    reason: e.to_string(),
                });
                return;
            }
        };
        for version in rotation_candidates(&tags, self.config.registry.retention, active) {
            let tag = ImageTag::new(self.image(), version);
            if self.remove_tag(&tag, report).await {
                report.removed.push(version);
            }
        }
    }

    async fn remove_tag(&self, tag: &ImageTag, report: &mut DeployReport) -> bool {
        match self.registry.remove(tag).await {
            Ok(()) => {
                info!(%tag, "image removed");
                true
            }
            Err(e) => {
                warn!(%tag, in_use = e.is_in_use(), error = %e, "image not removed");
                report.warnings.push(Warning::RemovalFailed {
                    tag: tag.reference(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }
}

/// Mirror the working tree into the backup directory now.
pub fn take_backup(backup: &BackupConfig) -> Result<SnapshotStats, SnapshotError> {
    snapshotter_for(backup)?.snapshot(&backup.source, &backup.dest)
}

/// Restore the working tree from the backup directory now.
pub fn restore_backup(backup: &BackupConfig) -> Result<RestoreStats, SnapshotError> {
    snapshotter_for(backup)?.restore(&backup.dest, &backup.source)
}

/// Whether a snapshot exists to restore from.
pub fn has_snapshot(backup: &BackupConfig) -> bool {
    backup.dest.is_dir()
}
