//! Filesystem watch loop for YAML file sources.
//!
//! Directories containing registered files are watched (not the files
//! themselves) so that editors replacing a file are still observed. Each
//! write or create of a registered file is re-read and reconciled, and the
//! resulting events are forwarded to the listener in order. A rename target
//! counts as a create, so saving through a temporary file reloads the config.
//!
//! The loop runs on a blocking task and stops when:
//! - [`WatchHandle::shutdown`] is called (the loop is joined),
//! - the watcher reports an error (no restart), or
//! - the event channel closes.
//!
//! The channel has two senders: the watcher callback and the handle. It only
//! closes once both are gone, and dropping the handle already signals a stop,
//! so the closed-channel exit is a fallback.

use super::flatten::parse_yaml_file;
use super::{ChangeListener, lock};
use super::yaml::SharedState;
use crate::error::SourceResult;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Filesystem operation reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FsOp {
    Create,
    Write,
    Rename,
    Remove,
}

/// Split a notify event into per-path operations.
///
/// The destination of a rename is a create. For a rename reported with both
/// paths, the first is the old path and the second the new one.
fn classify(event: Event) -> Vec<(FsOp, PathBuf)> {
    let op = match event.kind {
        EventKind::Create(_) => FsOp::Create,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FsOp::Create,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            return paths
                .next()
                .map(|from| (FsOp::Rename, from))
                .into_iter()
                .chain(paths.map(|to| (FsOp::Create, to)))
                .collect();
        }
        EventKind::Modify(ModifyKind::Name(_)) => FsOp::Rename,
        EventKind::Modify(_) => FsOp::Write,
        EventKind::Remove(_) => FsOp::Remove,
        _ => return Vec::new(),
    };
    event.paths.into_iter().map(|path| (op, path)).collect()
}

/// Messages delivered to the watch loop.
#[derive(Debug)]
enum WatchMessage {
    Fs(Vec<(FsOp, PathBuf)>),
    Error(notify::Error),
    Shutdown,
}

type SharedWatcher = Arc<Mutex<RecommendedWatcher>>;

/// Subscribe the watcher to the directory containing `file`.
fn watch_parent(watcher: &mut RecommendedWatcher, file: &Path) -> notify::Result<()> {
    let dir = file.parent().unwrap_or(file);
    watcher.watch(dir, RecursiveMode::NonRecursive)
}

/// Handle to a running watch loop.
///
/// Dropping the handle signals the loop to stop without waiting for it.
pub(crate) struct WatchHandle {
    watcher: SharedWatcher,
    listener: Arc<dyn ChangeListener>,
    stop: Arc<AtomicBool>,
    control_tx: mpsc::Sender<WatchMessage>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Create a watcher, subscribe the directories of `files` and start the loop.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(
        shared: Arc<SharedState>,
        listener: Arc<dyn ChangeListener>,
        files: &[PathBuf],
    ) -> SourceResult<Self> {
        let (tx, rx) = mpsc::channel();
        let notify_tx = tx.clone();

        let watcher = recommended_watcher(move |res: notify::Result<Event>| {
            let message = match res {
                Ok(event) => {
                    let ops = classify(event);
                    if ops.is_empty() {
                        return;
                    }
                    WatchMessage::Fs(ops)
                }
                Err(e) => WatchMessage::Error(e),
            };
            let _ = notify_tx.send(message);
        })
        .map_err(|e| {
            error!("New file watcher failed: {}", e);
            e
        })?;
        let watcher = Arc::new(Mutex::new(watcher));

        {
            let mut guard = lock(&watcher);
            for file in files {
                if let Err(e) = watch_parent(&mut guard, file) {
                    error!(path = %file.display(), "Failed to watch directory: {}", e);
                    break;
                }
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let watch_loop = WatchLoop {
            shared,
            listener: Arc::clone(&listener),
            watcher: Arc::clone(&watcher),
            stop: Arc::clone(&stop),
        };
        let task = tokio::task::spawn_blocking(move || watch_loop.run(rx));

        info!(files = files.len(), "File watcher started");

        Ok(Self {
            watcher,
            listener,
            stop,
            control_tx: tx,
            task: Some(task),
        })
    }

    /// The listener events are forwarded to.
    pub(crate) fn listener(&self) -> Arc<dyn ChangeListener> {
        Arc::clone(&self.listener)
    }

    /// Whether the loop task is still running.
    ///
    /// False once the loop has exited, e.g. after a watcher error.
    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Watch the directory of a file registered after the loop started.
    pub(crate) fn add_watch_file(&self, file: &Path) {
        if let Err(e) = watch_parent(&mut lock(&self.watcher), file) {
            error!(path = %file.display(), "Failed to watch directory: {}", e);
        }
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// No listener call happens after this returns.
    pub(crate) async fn shutdown(mut self) {
        self.signal_stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("File watcher task failed: {}", e);
            }
        }
    }

    /// Deliver a watcher error to the loop as the notify callback would.
    #[cfg(test)]
    pub(crate) fn inject_error(&self, error: notify::Error) {
        let _ = self.control_tx.send(WatchMessage::Error(error));
    }

    fn signal_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.control_tx.send(WatchMessage::Shutdown);
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.signal_stop();
        }
    }
}

/// State owned by the loop task.
struct WatchLoop {
    shared: Arc<SharedState>,
    listener: Arc<dyn ChangeListener>,
    watcher: SharedWatcher,
    stop: Arc<AtomicBool>,
}

impl WatchLoop {
    fn run(self, rx: mpsc::Receiver<WatchMessage>) {
        loop {
            let message = match rx.recv() {
                Ok(message) => message,
                Err(_) => {
                    warn!("File watcher stopped");
                    return;
                }
            };

            if self.stop.load(Ordering::SeqCst) {
                debug!("File watcher shut down");
                return;
            }

            match message {
                WatchMessage::Shutdown => {
                    debug!("File watcher shut down");
                    return;
                }
                WatchMessage::Error(e) => {
                    error!("File watcher error, watch loop exiting: {}", e);
                    return;
                }
                WatchMessage::Fs(ops) => {
                    for (op, path) in &ops {
                        self.handle(*op, path);
                    }
                }
            }
        }
    }

    fn handle(&self, op: FsOp, path: &Path) {
        debug!(path = %path.display(), op = ?op, "File changed");

        match op {
            FsOp::Remove => {
                warn!(path = %path.display(), "File removed, keeping its configuration");
            }
            FsOp::Rename => self.rewatch(path),
            FsOp::Create | FsOp::Write => self.reload(path),
        }
    }

    fn rewatch(&self, path: &Path) {
        let exists = path.exists();
        let registered = self.shared.is_registered(path);

        {
            let mut watcher = lock(&self.watcher);
            if let Err(e) = watcher.unwatch(path) {
                debug!(path = %path.display(), "Unwatch after rename: {}", e);
            }
            if exists && let Err(e) = watch_parent(&mut watcher, path) {
                error!(path = %path.display(), "Failed to watch directory: {}", e);
            }
        }

        if exists {
            // Backends that cannot tell the old path from the new one report
            // both as plain renames.
            self.reload(path);
        } else if registered {
            warn!(
                path = %path.display(),
                "File does not exist so not able to watch further"
            );
        }
    }

    fn reload(&self, path: &Path) {
        if !self.shared.is_registered(path) {
            debug!(path = %path.display(), "Ignoring change to unregistered file");
            return;
        }

        let new_conf = match parse_yaml_file(path) {
            Ok(conf) => conf,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    "Failed to reload file, keeping previous configuration: {}", e
                );
                return;
            }
        };

        let events = self.shared.reconcile_file(path, new_conf);
        debug!(path = %path.display(), events = events.len(), "Reconciled file");

        for event in &events {
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            self.listener.on_event(event);
        }
    }
}
