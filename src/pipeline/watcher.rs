//! Folder watching and the bounded worker pool.
//!
//! notify callback → unbounded event channel → debounce task → bounded queue
//! → N workers, each running `DocumentProcessor::process` on the blocking pool.
//! The debounce task awaits queue space, so a slow pool slows intake instead of
//! growing memory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;

use super::processor::{DocumentProcessor, ProcessingOutcome};
use super::IngestError;
use crate::config;
use crate::db::repository::append_log;
use crate::models::{LogAction, LogStatus, NewLogEntry};

/// Shortest debounce polling interval.
const MIN_TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// A file is settled once no event was seen for it during this window.
    pub debounce: Duration,
    pub queue_capacity: usize,
    pub workers: usize,
    /// How long `stop` waits for queued work before abandoning it.
    pub drain_timeout: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(config::DEFAULT_DEBOUNCE_MS),
            queue_capacity: config::DEFAULT_QUEUE_CAPACITY,
            workers: config::DEFAULT_WORKERS,
            drain_timeout: Duration::from_secs(config::DEFAULT_DRAIN_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatcherState {
    Stopped,
    Watching,
}

/// Case-insensitive file extension allow-list. Empty matches every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .is_some_and(|e| self.extensions.contains(&e))
    }
}

/// Result of `stop`: detected paths that were never processed, either still
/// queued at the drain deadline or still changing at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub abandoned: Vec<PathBuf>,
}

/// Resources of a running watcher. Dropping `watcher` stops observation.
struct RunningWatcher {
    root: PathBuf,
    watcher: RecommendedWatcher,
    shutdown_tx: Option<oneshot::Sender<()>>,
    queue_tx: mpsc::Sender<PathBuf>,
    queue_rx: Arc<TokioMutex<mpsc::Receiver<PathBuf>>>,
    pending: Arc<Mutex<HashMap<PathBuf, Instant>>>,
    debouncer: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

/// Watches one directory tree and feeds settled files to the processor.
pub struct FolderWatcher {
    processor: Arc<DocumentProcessor>,
    options: WatcherOptions,
    running: Option<RunningWatcher>,
}

impl FolderWatcher {
    pub fn new(processor: Arc<DocumentProcessor>, options: WatcherOptions) -> Self {
        Self {
            processor,
            options,
            running: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        if self.running.is_some() {
            WatcherState::Watching
        } else {
            WatcherState::Stopped
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.root.as_path())
    }

    /// Start observing `path`. Must be called inside a tokio runtime.
    pub fn start(
        &mut self,
        path: &Path,
        recursive: bool,
        extensions: &[String],
    ) -> Result<(), IngestError> {
        if self.running.is_some() {
            return Err(IngestError::Configuration(
                "watcher is already running".into(),
            ));
        }
        if !path.exists() {
            return Err(IngestError::Configuration(format!(
                "watch path does not exist: {}",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(IngestError::Configuration(format!(
                "watch path is not a directory: {}",
                path.display()
            )));
        }

        let filter = ExtensionFilter::new(extensions);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<PathBuf>();
        let callback_filter = filter.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    for path in event.paths {
                        if callback_filter.matches(&path) && path.is_file() {
                            let _ = event_tx.send(path);
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "File watcher event error"),
            }
        })?;
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(path, mode)?;

        let capacity = self.options.queue_capacity.max(1);
        let (queue_tx, queue_rx) = mpsc::channel::<PathBuf>(capacity);
        let queue_rx = Arc::new(TokioMutex::new(queue_rx));
        let pending = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let debouncer = tokio::spawn(debounce_loop(
            event_rx,
            queue_tx.clone(),
            shutdown_rx,
            Arc::clone(&pending),
            self.options.debounce,
        ));

        let workers = (0..self.options.workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&self.processor),
                    Arc::clone(&queue_rx),
                ))
            })
            .collect();

        tracing::info!(
            root = %path.display(),
            recursive,
            extensions = ?extensions,
            workers = self.options.workers.max(1),
            queue_capacity = capacity,
            "Folder watcher started"
        );

        self.running = Some(RunningWatcher {
            root: path.to_path_buf(),
            watcher,
            shutdown_tx: Some(shutdown_tx),
            queue_tx,
            queue_rx,
            pending,
            debouncer,
            workers,
        });
        Ok(())
    }

    /// Push a file straight onto the work queue, bypassing the debounce.
    /// Waits for queue space.
    pub async fn enqueue(&self, path: PathBuf) -> Result<(), IngestError> {
        let running = self
            .running
            .as_ref()
            .ok_or_else(|| IngestError::Configuration("watcher is not running".into()))?;
        running
            .queue_tx
            .send(path)
            .await
            .map_err(|_| IngestError::Configuration("work queue is closed".into()))
    }

    /// Enqueue every matching file under `path`. Already-indexed files come
    /// back from the processor as duplicates. Returns the number enqueued.
    pub async fn rescan(
        &self,
        path: &Path,
        recursive: bool,
        extensions: &[String],
    ) -> Result<usize, IngestError> {
        if self.running.is_none() {
            return Err(IngestError::Configuration("watcher is not running".into()));
        }
        let files = scan_directory(path, recursive, &ExtensionFilter::new(extensions))?;
        let count = files.len();
        for file in files {
            self.enqueue(file).await?;
        }
        tracing::info!(root = %path.display(), files = count, "Rescan enqueued");
        Ok(count)
    }

    /// Stop observing, flush settled paths, close the queue and wait for the
    /// workers up to the drain timeout. Paths still queued at the deadline, or
    /// still changing at shutdown, are logged as abandoned. Calling `stop` on a
    /// stopped watcher is a no-op.
    pub async fn stop(&mut self) -> Result<DrainReport, IngestError> {
        let Some(mut running) = self.running.take() else {
            return Ok(DrainReport::default());
        };

        drop(running.watcher);
        if let Some(tx) = running.shutdown_tx.take() {
            let _ = tx.send(());
        }
        drop(running.queue_tx);

        let abort_handles: Vec<AbortHandle> = std::iter::once(running.debouncer.abort_handle())
            .chain(running.workers.iter().map(|w| w.abort_handle()))
            .collect();
        let debouncer = running.debouncer;
        let workers = running.workers;
        let mut drain = tokio::spawn(async move {
            let _ = debouncer.await;
            for worker in workers {
                let _ = worker.await;
            }
        });

        if tokio::time::timeout(self.options.drain_timeout, &mut drain).await.is_ok() {
            let mut unsettled: Vec<PathBuf> =
                lock_pending(&running.pending).drain().map(|(p, _)| p).collect();
            unsettled.sort();
            if !unsettled.is_empty() {
                tracing::warn!(
                    root = %running.root.display(),
                    abandoned = unsettled.len(),
                    "Files still changing at shutdown, abandoning"
                );
                self.log_abandoned(&unsettled, json!({ "reason": "not settled at shutdown" }))
                    .await?;
            }
            tracing::info!(root = %running.root.display(), "Folder watcher stopped");
            return Ok(DrainReport { abandoned: unsettled });
        }

        // In-flight blocking work finishes on its own and logs its own outcome.
        for handle in &abort_handles {
            handle.abort();
        }
        let _ = drain.await;

        let mut abandoned = Vec::new();
        let mut seen = HashSet::new();
        {
            let mut rx = running.queue_rx.lock().await;
            while let Ok(path) = rx.try_recv() {
                if seen.insert(path.clone()) {
                    abandoned.push(path);
                }
            }
        }
        let leftovers: Vec<PathBuf> = lock_pending(&running.pending).drain().map(|(p, _)| p).collect();
        for path in leftovers {
            if seen.insert(path.clone()) {
                abandoned.push(path);
            }
        }

        tracing::warn!(
            root = %running.root.display(),
            abandoned = abandoned.len(),
            drain_timeout = ?self.options.drain_timeout,
            "Drain timeout reached, abandoning queued files"
        );

        let timeout_secs = self.options.drain_timeout.as_secs_f64();
        self.log_abandoned(
            &abandoned,
            json!({ "reason": "drain timeout", "drain_timeout_secs": timeout_secs }),
        )
        .await?;

        Ok(DrainReport { abandoned })
    }

    /// One `abandoned` / `failed` entry per path, written off the async threads.
    async fn log_abandoned(
        &self,
        paths: &[PathBuf],
        details: serde_json::Value,
    ) -> Result<(), IngestError> {
        let processor = Arc::clone(&self.processor);
        let to_log = paths.to_vec();
        tokio::task::spawn_blocking(move || {
            processor.database().with_conn(|conn| {
                for path in &to_log {
                    append_log(
                        conn,
                        &NewLogEntry::new(
                            path.to_string_lossy(),
                            LogAction::Abandoned,
                            LogStatus::Failed,
                            details.clone(),
                        ),
                    )?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| IngestError::Configuration(format!("abandon logging task failed: {e}")))??;
        Ok(())
    }
}

fn lock_pending(
    pending: &Mutex<HashMap<PathBuf, Instant>>,
) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Instant>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Collect events per path and release each path to the queue once it has
/// been quiet for `debounce`. On shutdown, events already received are kept
/// and every pending path gets the rest of its window (see `settle_pending`).
async fn debounce_loop(
    mut events: mpsc::UnboundedReceiver<PathBuf>,
    queue: mpsc::Sender<PathBuf>,
    mut shutdown: oneshot::Receiver<()>,
    pending: Arc<Mutex<HashMap<PathBuf, Instant>>>,
    debounce: Duration,
) {
    let mut tick = tokio::time::interval((debounce / 4).max(MIN_TICK));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Some(path) => {
                    lock_pending(&pending).insert(path, Instant::now());
                }
                None => break,
            },
            _ = tick.tick() => {
                let now = Instant::now();
                let mut settled: Vec<PathBuf> = lock_pending(&pending)
                    .iter()
                    .filter(|(_, seen)| now.duration_since(**seen) >= debounce)
                    .map(|(path, _)| path.clone())
                    .collect();
                settled.sort();
                for path in settled {
                    if !forward(&queue, &pending, path).await {
                        return;
                    }
                }
            }
        }
    }

    events.close();
    while let Some(path) = events.recv().await {
        lock_pending(&pending).insert(path, Instant::now());
    }
    settle_pending(&queue, &pending, debounce).await;
}

/// Size and modification time, compared across the shutdown wait.
type Fingerprint = (u64, Option<SystemTime>);

fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.len(), meta.modified().ok()))
}

/// Shutdown flush. No more events arrive, so each pending file is judged by
/// its fingerprint across the remainder of its debounce window. Files that
/// changed or vanished stay in `pending` for `stop` to report as abandoned.
async fn settle_pending(
    queue: &mpsc::Sender<PathBuf>,
    pending: &Mutex<HashMap<PathBuf, Instant>>,
    debounce: Duration,
) {
    let snapshot: Vec<(PathBuf, Instant, Option<Fingerprint>)> = lock_pending(pending)
        .iter()
        .map(|(path, seen)| (path.clone(), *seen, fingerprint(path)))
        .collect();
    if let Some(deadline) = snapshot.iter().map(|(_, seen, _)| *seen + debounce).max() {
        tokio::time::sleep_until(deadline).await;
    }

    let mut settled: Vec<PathBuf> = snapshot
        .into_iter()
        .filter(|(path, _, before)| before.is_some() && fingerprint(path) == *before)
        .map(|(path, _, _)| path)
        .collect();
    settled.sort();
    for path in settled {
        if !forward(queue, pending, path).await {
            return;
        }
    }
}

/// Send one settled path, then drop it from the pending set. Returns false
/// once the queue is closed.
async fn forward(
    queue: &mpsc::Sender<PathBuf>,
    pending: &Mutex<HashMap<PathBuf, Instant>>,
    path: PathBuf,
) -> bool {
    tracing::debug!(path = %path.display(), "File settled, queueing");
    if queue.send(path.clone()).await.is_err() {
        return false;
    }
    lock_pending(pending).remove(&path);
    true
}

async fn worker_loop(
    id: usize,
    processor: Arc<DocumentProcessor>,
    queue: Arc<TokioMutex<mpsc::Receiver<PathBuf>>>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(path) = next else {
            break;
        };

        let shown = path.display().to_string();
        let worker_processor = Arc::clone(&processor);
        match tokio::task::spawn_blocking(move || worker_processor.process(&path)).await {
            Ok(Ok(outcome)) => log_outcome(id, &shown, &outcome),
            Ok(Err(e)) => {
                tracing::error!(worker = id, path = %shown, error = %e, "Processing log unavailable");
            }
            Err(e) => {
                tracing::error!(worker = id, path = %shown, error = %e, "Processing task panicked");
            }
        }
    }
    tracing::debug!(worker = id, "Worker exiting, queue closed");
}

fn log_outcome(worker: usize, path: &str, outcome: &ProcessingOutcome) {
    match outcome {
        ProcessingOutcome::Processed { document_id, .. } => {
            tracing::debug!(worker, path, document_id, "Worker processed file");
        }
        ProcessingOutcome::Failed { reason } => {
            tracing::warn!(worker, path, reason = %reason, "Worker failed file");
        }
        other => {
            tracing::debug!(worker, path, outcome = ?other, "Worker skipped file");
        }
    }
}

/// Matching regular files under `root`, sorted for deterministic order.
pub fn scan_directory(
    root: &Path,
    recursive: bool,
    filter: &ExtensionFilter,
) -> Result<Vec<PathBuf>, IngestError> {
    if !root.is_dir() {
        return Err(IngestError::Configuration(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                if recursive {
                    dirs.push(path);
                }
            } else if file_type.is_file() && filter.matches(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
