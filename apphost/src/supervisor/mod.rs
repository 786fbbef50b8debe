//! Process supervisor
//!
//! Owns the in-memory table of live application processes. The persisted
//! application status is a mirror of this table, updated on every start, stop
//! and crash; it is never used to re-attach to processes.

pub mod capture;
pub mod fsm;
pub mod process;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::PlatformError;
use crate::fanout::LogFanout;
use crate::models::app::{AppStatus, Application};
use crate::models::log::Stream;
use crate::store::apps::AppRepository;
use fsm::{ProcessEvent, ProcessFsm, ProcessState};

/// Supervisor options
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Executable run from the release directory
    pub entry_point: String,

    /// Time between the termination signal and the forced kill
    pub grace_period: Duration,

    /// Time the capture loops get to flush buffered output after exit
    pub drain_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            entry_point: "start".to_string(),
            grace_period: Duration::from_secs(10),
            drain_timeout: Duration::from_millis(500),
        }
    }
}

/// Snapshot of one supervised process
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub app_id: String,
    pub pid: Option<u32>,
    pub state: ProcessState,
    pub release: PathBuf,
    pub started_at: DateTime<Utc>,
}

struct LiveProcess {
    generation: u64,
    pid: Option<u32>,
    release: PathBuf,
    started_at: DateTime<Utc>,
    fsm: ProcessFsm,
    kill_tx: Option<oneshot::Sender<()>>,
    watcher: Option<JoinHandle<()>>,
    capture: Vec<JoinHandle<()>>,
}

impl LiveProcess {
    fn info(&self, app_id: &str) -> ProcessInfo {
        ProcessInfo {
            app_id: app_id.to_string(),
            pid: self.pid,
            state: self.fsm.state(),
            release: self.release.clone(),
            started_at: self.started_at,
        }
    }
}

type ProcessTable = Arc<Mutex<HashMap<String, LiveProcess>>>;

fn lock(table: &ProcessTable) -> MutexGuard<'_, HashMap<String, LiveProcess>> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

/// Starts, stops and watches application processes
pub struct Supervisor {
    apps: AppRepository,
    fanout: Arc<LogFanout>,
    options: SupervisorOptions,
    table: ProcessTable,
    generation: AtomicU64,
}

impl Supervisor {
    pub fn new(apps: AppRepository, fanout: Arc<LogFanout>, options: SupervisorOptions) -> Self {
        Self {
            apps,
            fanout,
            options,
            table: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Start the application's process from a release directory. A process
    /// already running for the application is stopped first.
    pub async fn start(&self, app: &Application, release: &Path) -> Result<ProcessInfo, PlatformError> {
        if self.stop(&app.id).await? {
            debug!(app_id = %app.id, "Stopped previous process before start");
        }

        let mut fsm = ProcessFsm::new();
        fsm.process(ProcessEvent::Start).map_err(PlatformError::Internal)?;

        let mut child = match process::spawn(app, release, &self.options.entry_point) {
            Ok(child) => child,
            Err(e) => {
                let _ = fsm.process(ProcessEvent::SpawnFailed(e.to_string()));
                error!(app_id = %app.id, "Failed to start application: {}", e);
                self.persist(&app.id, AppStatus::Error, None).await;
                return Err(e);
            }
        };
        fsm.process(ProcessEvent::Spawned).map_err(PlatformError::Internal)?;
        let pid = child.id();

        let mut capture = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            capture.push(capture::spawn_capture(stdout, Stream::Stdout, app.id.clone(), self.fanout.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            capture.push(capture::spawn_capture(stderr, Stream::Stderr, app.id.clone(), self.fanout.clone()));
        }

        // Running is persisted before the watcher exists, so a crash report
        // can never be overwritten by it.
        if let Err(e) = self
            .apps
            .update(&app.id, |record| {
                record.status = AppStatus::Running;
                record.pid = pid;
            })
            .await
        {
            if let Some(pid) = pid {
                process::force_kill(pid);
            }
            let _ = child.start_kill();
            let _ = child.wait().await;
            for handle in capture {
                handle.abort();
            }
            return Err(e);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let (kill_tx, kill_rx) = oneshot::channel();
        let context = ExitContext {
            app_id: app.id.clone(),
            generation,
            table: self.table.clone(),
            apps: self.apps.clone(),
            drain_timeout: self.options.drain_timeout,
        };

        let info = {
            let mut table = lock(&self.table);
            let watcher = tokio::spawn(watch_exit(child, kill_rx, context));
            let live = LiveProcess {
                generation,
                pid,
                release: release.to_path_buf(),
                started_at: Utc::now(),
                fsm,
                kill_tx: Some(kill_tx),
                watcher: Some(watcher),
                capture,
            };
            let info = live.info(&app.id);
            table.insert(app.id.clone(), live);
            info
        };

        info!(app_id = %app.id, pid = ?pid, release = %release.display(), "Application process started");
        Ok(info)
    }

    /// Stop the application's process: terminate, wait out the grace period,
    /// then kill. Returns false if nothing was running.
    pub async fn stop(&self, app_id: &str) -> Result<bool, PlatformError> {
        let (pid, watcher, kill_tx) = {
            let mut table = lock(&self.table);
            let Some(live) = table.get_mut(app_id) else {
                return Ok(false);
            };
            live.fsm.process(ProcessEvent::Stop).map_err(PlatformError::Conflict)?;
            (live.pid, live.watcher.take(), live.kill_tx.take())
        };

        info!(app_id = %app_id, pid = ?pid, "Stopping application process");
        if let Some(pid) = pid {
            process::terminate(pid);
        }

        if let Some(mut watcher) = watcher {
            if tokio::time::timeout(self.options.grace_period, &mut watcher).await.is_err() {
                warn!(app_id = %app_id, pid = ?pid, "Process ignored termination, killing");
                if let Some(pid) = pid {
                    process::force_kill(pid);
                }
                if let Some(kill_tx) = kill_tx {
                    let _ = kill_tx.send(());
                }
                if let Err(e) = watcher.await {
                    warn!(app_id = %app_id, "Exit watcher failed: {}", e);
                }
            }
        }

        let removed = lock(&self.table).remove(app_id);
        if let Some(live) = removed {
            drain(live.capture, self.options.drain_timeout).await;
        }

        self.persist(app_id, AppStatus::Stopped, None).await;
        info!(app_id = %app_id, "Application process stopped");
        Ok(true)
    }

    /// Stop then start; the only path deploys and rollbacks use
    pub async fn restart(&self, app: &Application, release: &Path) -> Result<ProcessInfo, PlatformError> {
        self.stop(&app.id).await?;
        self.start(app, release).await
    }

    /// Stop every supervised process. Returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let app_ids: Vec<String> = lock(&self.table).keys().cloned().collect();

        let results = futures::future::join_all(app_ids.iter().map(|id| self.stop(id))).await;

        let mut stopped = 0;
        for (app_id, result) in app_ids.iter().zip(results) {
            match result {
                Ok(true) => stopped += 1,
                Ok(false) => {}
                Err(e) => error!(app_id = %app_id, "Failed to stop application: {}", e),
            }
        }
        stopped
    }

    pub fn is_running(&self, app_id: &str) -> bool {
        self.state(app_id) == ProcessState::Running
    }

    pub fn state(&self, app_id: &str) -> ProcessState {
        lock(&self.table)
            .get(app_id)
            .map(|live| live.fsm.state())
            .unwrap_or(ProcessState::Stopped)
    }

    pub fn pid(&self, app_id: &str) -> Option<u32> {
        lock(&self.table).get(app_id).and_then(|live| live.pid)
    }

    pub fn info(&self, app_id: &str) -> Option<ProcessInfo> {
        lock(&self.table).get(app_id).map(|live| live.info(app_id))
    }

    /// Every supervised process, ordered by application id
    pub fn processes(&self) -> Vec<ProcessInfo> {
        let mut processes: Vec<_> = lock(&self.table)
            .iter()
            .map(|(app_id, live)| live.info(app_id))
            .collect();
        processes.sort_by(|a, b| a.app_id.cmp(&b.app_id));
        processes
    }

    async fn persist(&self, app_id: &str, status: AppStatus, pid: Option<u32>) {
        persist_status(&self.apps, app_id, status, pid).await;
    }
}

async fn persist_status(apps: &AppRepository, app_id: &str, status: AppStatus, pid: Option<u32>) {
    let result = apps
        .update(app_id, |record| {
            record.status = status;
            record.pid = pid;
        })
        .await;

    match result {
        Ok(_) => {}
        Err(PlatformError::NotFound(_)) => {
            debug!(app_id = %app_id, status = %status, "Application record gone, status not persisted");
        }
        Err(e) => warn!(app_id = %app_id, status = %status, "Failed to persist status: {}", e),
    }
}

struct ExitContext {
    app_id: String,
    generation: u64,
    table: ProcessTable,
    apps: AppRepository,
    drain_timeout: Duration,
}

async fn watch_exit(mut child: Child, kill_rx: oneshot::Receiver<()>, ctx: ExitContext) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                debug!(app_id = %ctx.app_id, "Kill failed: {}", e);
            }
            child.wait().await
        }
    };
    let code = status.as_ref().ok().and_then(|s| s.code());

    let crashed = {
        let mut table = lock(&ctx.table);
        let state = match table.get_mut(&ctx.app_id) {
            Some(live) if live.generation == ctx.generation => live.fsm.process(ProcessEvent::Exited(code)).ok(),
            _ => None,
        };
        match state {
            Some(ProcessState::Crashed) => table.remove(&ctx.app_id),
            _ => None,
        }
    };

    let Some(live) = crashed else {
        debug!(app_id = %ctx.app_id, exit_code = ?code, "Process exited on request");
        return;
    };

    error!(app_id = %ctx.app_id, pid = ?live.pid, exit_code = ?code, "Application process exited unexpectedly");
    drain(live.capture, ctx.drain_timeout).await;
    persist_crash(&ctx.apps, &ctx.app_id, live.pid).await;
}

/// Record a crash unless a newer process has been started in the meantime.
/// The table entry is already gone by now, so the record's pid is the only
/// thing that still ties it to the exited process.
async fn persist_crash(apps: &AppRepository, app_id: &str, pid: Option<u32>) {
    let result = apps
        .update(app_id, |record| {
            if record.pid == pid {
                record.status = AppStatus::Crashed;
                record.pid = None;
            }
        })
        .await;

    match result {
        Ok(record) if record.status == AppStatus::Crashed => {}
        Ok(record) => {
            debug!(app_id = %app_id, pid = ?record.pid, "Process replaced before crash was recorded");
        }
        Err(PlatformError::NotFound(_)) => {
            debug!(app_id = %app_id, "Application record gone, crash not persisted");
        }
        Err(e) => warn!(app_id = %app_id, "Failed to persist crash: {}", e),
    }
}

async fn drain(handles: Vec<JoinHandle<()>>, limit: Duration) {
    for mut handle in handles {
        if tokio::time::timeout(limit, &mut handle).await.is_err() {
            handle.abort();
        }
    }
}
