//! The [`WatcherRegistry`] and its tick loop.

use std::collections::{BTreeMap, BTreeSet};

use ar_core::{Config, ScheduleConfig, Target, TargetName, WatchConfig};
use ar_supervisor::Supervisor;
use ar_watcher::{BackendFactory, DirectoryWatcher, NotifyBackendFactory, PatternSet};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{PollReport, ReconcileReport, SkipReason};

/// Keeps one [`DirectoryWatcher`] per opted-in target and restarts targets
/// whose watched files changed.
///
/// Two ticks drive it: [`reconcile`](Self::reconcile) syncs the monitored
/// set with the supervisor's target list, [`poll`](Self::poll) checks every
/// watcher and signals active targets that changed. [`run`](Self::run)
/// interleaves both on a single task until cancelled.
///
/// # Examples
///
/// ```no_run
/// use ar_core::Config;
/// use ar_registry::WatcherRegistry;
/// use ar_supervisor::CircusctlSupervisor;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let config = Config::default();
/// let supervisor = CircusctlSupervisor::from_config(&config.supervisor);
/// let registry = WatcherRegistry::with_notify(supervisor, &config);
///
/// let shutdown = CancellationToken::new();
/// registry.run(shutdown.clone()).await;
/// # }
/// ```
pub struct WatcherRegistry<S, F = NotifyBackendFactory> {
    supervisor: S,
    factory: F,
    watch: WatchConfig,
    schedule: ScheduleConfig,
    monitored: BTreeMap<TargetName, DirectoryWatcher>,
}

impl<S: Supervisor> WatcherRegistry<S> {
    /// Creates a registry using the platform notification backend.
    pub fn with_notify(supervisor: S, config: &Config) -> Self {
        Self::new(supervisor, NotifyBackendFactory, config)
    }
}

impl<S: Supervisor, F: BackendFactory> WatcherRegistry<S, F> {
    /// Creates a registry with nothing monitored yet.
    pub fn new(supervisor: S, factory: F, config: &Config) -> Self {
        Self {
            supervisor,
            factory,
            watch: config.watch.clone(),
            schedule: config.schedule,
            monitored: BTreeMap::new(),
        }
    }

    /// The supervisor this registry talks to.
    #[inline]
    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    /// Returns `true` if `name` currently has a watcher.
    #[inline]
    pub fn is_monitored(&self, name: &str) -> bool {
        self.monitored.contains_key(name)
    }

    /// Names of all monitored targets, sorted.
    pub fn monitored(&self) -> impl Iterator<Item = &TargetName> {
        self.monitored.keys()
    }

    /// The watcher of a monitored target.
    pub fn watcher(&self, name: &str) -> Option<&DirectoryWatcher> {
        self.monitored.get(name)
    }

    /// Syncs the monitored set with the supervisor's current targets.
    ///
    /// Watchers of vanished targets are dropped, releasing their watches.
    /// Every unmonitored target is examined afresh; it is monitored only when
    /// it has a working directory carrying at least one rule file. If the
    /// target list cannot be fetched the tick does nothing.
    pub async fn reconcile(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let names = match self.supervisor.list().await {
            Ok(names) => names,
            Err(error) => {
                warn!(%error, "Cannot list targets, skipping reconciliation");
                report.list_failed = true;
                return report;
            }
        };
        let current: BTreeSet<TargetName> = names.into_iter().collect();

        let vanished: Vec<TargetName> = self
            .monitored
            .keys()
            .filter(|name| !current.contains(*name))
            .cloned()
            .collect();
        for name in vanished {
            self.monitored.remove(&name);
            info!(target_name = %name, "Target is gone, stopped monitoring");
            report.dropped.push(name);
        }

        let unmonitored: Vec<TargetName> = current
            .into_iter()
            .filter(|name| !self.monitored.contains_key(name))
            .collect();
        for name in unmonitored {
            match start_monitoring(&self.supervisor, &self.factory, &self.watch, &name).await {
                Ok(watcher) => {
                    self.monitored.insert(name.clone(), watcher);
                    report.added.push(name);
                }
                Err(reason) => report.skipped.push((name, reason)),
            }
        }

        report
    }

    /// Checks every watcher and signals the active targets that changed.
    ///
    /// Targets whose status cannot be read, or that are not active, are left
    /// alone. Their pending events are consumed either way.
    pub async fn poll(&mut self) -> PollReport {
        let mut report = PollReport::default();

        let changed: Vec<TargetName> = self
            .monitored
            .iter_mut()
            .filter_map(|(name, watcher)| watcher.has_changed().then(|| name.clone()))
            .collect();

        let signal = self.schedule.kill_signal;
        for name in changed {
            report.changed.push(name.clone());
            match self.supervisor.status(&name).await {
                Ok(status) if status.is_active() => {
                    info!(target_name = %name, signal, "Restarting target");
                    match self.supervisor.kill(&name, signal).await {
                        Ok(()) => report.restarted.push(name),
                        Err(error) => warn!(target_name = %name, %error, "Cannot signal target"),
                    }
                }
                Ok(status) => {
                    info!(target_name = %name, %status, "Target changed but is not active, leaving it");
                }
                Err(error) => {
                    warn!(target_name = %name, %error, "Cannot read target status, not restarting");
                }
            }
        }

        report
    }

    /// Drops every watcher, releasing all watches.
    pub fn release(&mut self) {
        if !self.monitored.is_empty() {
            info!(count = self.monitored.len(), "Releasing all watchers");
        }
        self.monitored.clear();
    }

    /// Runs both ticks until `shutdown` is cancelled.
    ///
    /// Reconciliation happens once immediately, then on its own interval.
    /// Ticks never overlap; a tick that falls behind is skipped rather than
    /// replayed.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut reconcile_tick = interval(self.schedule.reconcile_interval());
        reconcile_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll_tick = interval(self.schedule.poll_interval());
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            poll_ms = self.schedule.poll_interval_ms,
            reconcile_ms = self.schedule.reconcile_interval_ms,
            "Monitoring started"
        );

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                _ = reconcile_tick.tick() => {
                    let report = self.reconcile().await;
                    if report.changed_monitoring() {
                        info!(%report, monitored = self.monitored.len(), "Reconciled targets");
                    } else {
                        debug!(%report, "Reconciled targets");
                    }
                }

                _ = poll_tick.tick() => {
                    let report = self.poll().await;
                    if !report.is_quiet() {
                        debug!(
                            changed = report.changed.len(),
                            restarted = report.restarted.len(),
                            "Polled watchers"
                        );
                    }
                }
            }
        }

        self.release();
        info!("Monitoring stopped");
    }
}

async fn start_monitoring<S, F>(
    supervisor: &S,
    factory: &F,
    watch: &WatchConfig,
    name: &TargetName,
) -> Result<DirectoryWatcher, SkipReason>
where
    S: Supervisor,
    F: BackendFactory,
{
    let options = match supervisor.options(name).await {
        Ok(options) => options,
        Err(error) => {
            warn!(target_name = %name, %error, "Cannot read target options");
            return Err(SkipReason::OptionsUnavailable);
        }
    };

    let Some(working_dir) = options.working_dir else {
        debug!(target_name = %name, "Ignoring target without working directory");
        return Err(SkipReason::NoWorkingDir);
    };

    if !PatternSet::is_opted_in(&working_dir, watch) {
        debug!(
            target_name = %name,
            dir = %working_dir,
            "Ignoring target, no {} or {} file",
            watch.includes_file,
            watch.excludes_file
        );
        return Err(SkipReason::NotOptedIn);
    }

    let target = Target::new(name.clone(), working_dir);
    let backend = match factory.create(&target) {
        Ok(backend) => backend,
        Err(error) => {
            warn!(target_name = %name, %error, "Cannot create watch backend");
            return Err(SkipReason::BackendFailed);
        }
    };

    // The initial walk touches every directory of the tree.
    let watch = watch.clone();
    tokio::task::spawn_blocking(move || DirectoryWatcher::start(target, &watch, backend))
        .await
        .map_err(|error| {
            warn!(target_name = %name, %error, "Watch registration did not complete");
            SkipReason::BackendFailed
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ar_core::TargetStatus;
    use ar_supervisor::MemorySupervisor;
    use ar_watcher::{EventKind, MemoryBackend, WatchBackend, WatchError};
    use camino::{Utf8Path, Utf8PathBuf};
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Hands out one [`MemoryBackend`] per target and keeps a clone for
    /// event injection.
    #[derive(Clone, Default)]
    struct Backends {
        created: Arc<Mutex<BTreeMap<TargetName, MemoryBackend>>>,
        failing: bool,
    }

    impl Backends {
        fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        fn get(&self, name: &str) -> MemoryBackend {
            self.created.lock()[name].clone()
        }

        fn count(&self) -> usize {
            self.created.lock().len()
        }
    }

    impl BackendFactory for Backends {
        fn create(&self, target: &Target) -> Result<Box<dyn WatchBackend>, WatchError> {
            if self.failing {
                return Err(WatchError::refused(target.working_dir.clone()));
            }
            let backend = MemoryBackend::new();
            self.created.lock().insert(target.name.clone(), backend.clone());
            Ok(Box::new(backend))
        }
    }

    struct Site {
        _dir: TempDir,
        root: Utf8PathBuf,
    }

    impl Site {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();
            Self { _dir: dir, root }
        }

        fn app(&self, name: &str, includes: Option<&str>, excludes: Option<&str>) -> Utf8PathBuf {
            let dir = self.root.join(name);
            fs::create_dir_all(&dir).unwrap();
            if let Some(rules) = includes {
                fs::write(dir.join(".autorestart_includes"), rules).unwrap();
            }
            if let Some(rules) = excludes {
                fs::write(dir.join(".autorestart_excludes"), rules).unwrap();
            }
            dir
        }
    }

    fn write(backend: &MemoryBackend, path: &Utf8Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x").unwrap();
        backend.touch(path, EventKind::WriteClosed);
    }

    fn registry(
        supervisor: &MemorySupervisor,
        backends: &Backends,
    ) -> WatcherRegistry<MemorySupervisor, Backends> {
        WatcherRegistry::new(supervisor.clone(), backends.clone(), &Config::default())
    }

    fn web() -> TargetName {
        TargetName::new("web")
    }

    #[tokio::test]
    async fn test_include_rules_decide_restarts() {
        let site = Site::new();
        let dir = site.app("web", Some("*.py\n"), None);
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(dir.clone()), TargetStatus::Active);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);

        let report = registry.reconcile().await;
        assert_eq!(report.added, [web()]);

        write(&backends.get("web"), &dir.join("app.py"));
        let report = registry.poll().await;
        assert_eq!(report.restarted, [web()]);
        assert_eq!(supervisor.kills(), [(web(), 9)]);

        write(&backends.get("web"), &dir.join("app.log"));
        let report = registry.poll().await;
        assert!(report.is_quiet());
        assert_eq!(supervisor.kills().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watches_registered_off_the_runtime_workers() {
        let site = Site::new();
        let dir = site.app("web", None, Some("*.log\n"));
        for sub in ["a/b/c", "d/e", "f"] {
            fs::create_dir_all(dir.join(sub)).unwrap();
        }
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(dir.clone()), TargetStatus::Active);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);

        let report = registry.reconcile().await;

        assert_eq!(report.added, [web()]);
        assert_eq!(registry.watcher("web").map(DirectoryWatcher::watch_count), Some(7));
        assert_eq!(backends.get("web").watched_dirs().len(), 7);
    }

    #[tokio::test]
    async fn test_excluded_directory_never_restarts() {
        let site = Site::new();
        let dir = site.app("web", None, Some("/node_modules/\n"));
        fs::create_dir_all(dir.join("node_modules/x")).unwrap();
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(dir.clone()), TargetStatus::Active);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);
        registry.reconcile().await;

        let backend = backends.get("web");
        assert!(backend.handle_of(&dir.join("node_modules")).is_none());
        backend.touch(&dir.join("node_modules"), EventKind::AttributeChanged);
        assert!(registry.poll().await.is_quiet());

        write(&backend, &dir.join("main.js"));
        assert_eq!(registry.poll().await.restarted, [web()]);
    }

    #[tokio::test]
    async fn test_target_without_rule_files_is_never_monitored() {
        let site = Site::new();
        let dir = site.app("web", None, None);
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(dir), TargetStatus::Active);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);

        for _ in 0..3 {
            let report = registry.reconcile().await;
            assert_eq!(report.skip_reason("web"), Some(SkipReason::NotOptedIn));
            assert!(!registry.is_monitored("web"));
        }
        assert_eq!(backends.count(), 0);
    }

    #[tokio::test]
    async fn test_vanished_target_is_dropped() {
        let site = Site::new();
        let dir = site.app("web", Some("*\n"), None);
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(dir.clone()), TargetStatus::Active);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);
        registry.reconcile().await;
        assert!(registry.is_monitored("web"));

        supervisor.remove_target("web");
        let report = registry.reconcile().await;
        assert_eq!(report.dropped, [web()]);
        assert!(!registry.is_monitored("web"));

        write(&backends.get("web"), &dir.join("app.py"));
        assert!(registry.poll().await.is_quiet());
        assert!(supervisor.kills().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_target_is_not_killed() {
        let site = Site::new();
        let dir = site.app("web", Some("*.py\n"), None);
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(dir.clone()), TargetStatus::Stopped);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);
        registry.reconcile().await;

        write(&backends.get("web"), &dir.join("app.py"));
        let report = registry.poll().await;

        assert_eq!(report.changed, [web()]);
        assert!(report.restarted.is_empty());
        assert!(supervisor.kills().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let site = Site::new();
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(site.app("web", Some("*.py\n"), None)), TargetStatus::Active);
        supervisor.add_target("api", Some(site.app("api", None, Some("*.log\n"))), TargetStatus::Active);
        supervisor.add_target("db", Some(site.app("db", None, None)), TargetStatus::Active);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);

        registry.reconcile().await;
        let first: Vec<TargetName> = registry.monitored().cloned().collect();
        let report = registry.reconcile().await;
        let second: Vec<TargetName> = registry.monitored().cloned().collect();

        assert_eq!(first, [TargetName::new("api"), web()]);
        assert_eq!(first, second);
        assert!(!report.changed_monitoring());
        assert_eq!(backends.count(), 2);
    }

    #[tokio::test]
    async fn test_list_failure_keeps_monitored_set() {
        let site = Site::new();
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(site.app("web", Some("*\n"), None)), TargetStatus::Active);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);
        registry.reconcile().await;

        supervisor.set_unreachable(true);
        supervisor.remove_target("web");
        let report = registry.reconcile().await;

        assert!(report.list_failed);
        assert!(registry.is_monitored("web"));
    }

    #[tokio::test]
    async fn test_missing_working_dir_and_backend_failures_are_skipped() {
        let site = Site::new();
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("daemon", None::<&str>, TargetStatus::Active);
        supervisor.add_target("web", Some(site.app("web", Some("*\n"), None)), TargetStatus::Active);
        let mut registry = WatcherRegistry::new(supervisor, Backends::failing(), &Config::default());

        let report = registry.reconcile().await;
        assert_eq!(report.skip_reason("daemon"), Some(SkipReason::NoWorkingDir));
        assert_eq!(report.skip_reason("web"), Some(SkipReason::BackendFailed));
        assert_eq!(registry.monitored().count(), 0);

        // Still unmonitored, so the next tick tries again.
        let report = registry.reconcile().await;
        assert_eq!(report.skip_reason("web"), Some(SkipReason::BackendFailed));
    }

    #[tokio::test]
    async fn test_status_failure_skips_restart() {
        let site = Site::new();
        let dir = site.app("web", Some("*\n"), None);
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(dir.clone()), TargetStatus::Active);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);
        registry.reconcile().await;

        supervisor.set_unreachable(true);
        write(&backends.get("web"), &dir.join("app.py"));
        let report = registry.poll().await;
        assert_eq!(report.changed, [web()]);
        assert!(report.restarted.is_empty());

        supervisor.set_unreachable(false);
        assert!(registry.poll().await.is_quiet());
        assert!(supervisor.kills().is_empty());
    }

    #[tokio::test]
    async fn test_custom_signal() {
        let site = Site::new();
        let dir = site.app("web", Some("*\n"), None);
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(dir.clone()), TargetStatus::Active);
        let backends = Backends::default();
        let config = Config::from_json_str(r#"{"schedule": {"kill_signal": 15}}"#).unwrap();
        let mut registry = WatcherRegistry::new(supervisor.clone(), backends.clone(), &config);
        registry.reconcile().await;

        write(&backends.get("web"), &dir.join("app.py"));
        registry.poll().await;

        assert_eq!(supervisor.kills(), [(web(), 15)]);
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let site = Site::new();
        let dir = site.app("web", Some("*.py\n"), None);
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(dir.clone()), TargetStatus::Active);
        let backends = Backends::default();
        let config = Config::from_json_str(
            r#"{"schedule": {"poll_interval_ms": 10, "reconcile_interval_ms": 20}}"#,
        )
        .unwrap();
        let registry = WatcherRegistry::new(supervisor.clone(), backends.clone(), &config);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(registry.run(shutdown.clone()));

        let restarted = tokio::time::timeout(Duration::from_secs(5), async {
            while backends.count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            write(&backends.get("web"), &dir.join("app.py"));
            while supervisor.kills().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(restarted.is_ok(), "target was never restarted");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(supervisor.kills(), [(web(), 9)]);
    }

    #[tokio::test]
    async fn test_release_drops_watchers() {
        let site = Site::new();
        let supervisor = MemorySupervisor::new();
        supervisor.add_target("web", Some(site.app("web", Some("*\n"), None)), TargetStatus::Active);
        let backends = Backends::default();
        let mut registry = registry(&supervisor, &backends);

        registry.reconcile().await;
        assert_eq!(registry.monitored().count(), 1);

        registry.release();
        assert_eq!(registry.monitored().count(), 0);
        assert!(registry.watcher("web").is_none());
    }
}
