use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::debug;

use crate::{QueryLogError, QueryLogFlags};

static NEXT_LOGGER_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL: LazyLock<QueryLogger> = LazyLock::new(QueryLogger::new);

/// What a subscriber is being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A query-log line.
    Log,
    /// The log destination was reopened, e.g. after rotation.
    Reopen,
}

/// One event delivered to subscribers.
#[derive(Debug, Clone)]
pub struct QueryLogEvent {
    pub action: Action,
    pub flag: QueryLogFlags,
    pub timestamp: DateTime<Local>,
    /// `0x<logger id>|<mark><elapsed ns> `
    pub info: String,
    pub message: String,
}

/// Per-call options for [`QueryLogger::log`].
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Category of the message (default: `COMMAND`).
    pub flag: QueryLogFlags,
    /// Short marker printed before the elapsed time.
    pub mark: Option<String>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            flag: QueryLogFlags::COMMAND,
            mark: None,
        }
    }
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, flag: QueryLogFlags) -> Self {
        self.flag = flag;
        self
    }

    pub fn mark(mut self, mark: impl Into<String>) -> Self {
        self.mark = Some(mark.into());
        self
    }
}

/// Handle returned by [`QueryLogger::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

type Callback = Arc<dyn Fn(&QueryLogEvent) + Send + Sync>;

struct Inner {
    flags: QueryLogFlags,
    path: Option<PathBuf>,
    file: Option<File>,
    subscribers: Vec<(SubscriberId, Callback)>,
    next_subscriber: u64,
}

/// Query logger with an ordered subscriber list and a file sink.
///
/// Subscribers receive every enabled event in registration order. While no
/// subscriber is registered, lines go to the file at [`path`](Self::path):
///
/// ```text
/// 2015-06-01 12:00:00.000000|0x1|:1234 message
/// ```
pub struct QueryLogger {
    id: u64,
    started: Instant,
    inner: Mutex<Inner>,
}

impl Default for QueryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryLogger {
    /// Creates an isolated logger with `DEFAULT` flags and no file.
    pub fn new() -> Self {
        Self {
            id: NEXT_LOGGER_ID.fetch_add(1, Ordering::Relaxed),
            started: Instant::now(),
            inner: Mutex::new(Inner {
                flags: QueryLogFlags::DEFAULT,
                path: None,
                file: None,
                subscribers: Vec::new(),
                next_subscriber: 1,
            }),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let logger = Self::new();
        logger.set_path(Some(path.into()));
        logger
    }

    /// The process-wide logger, created on first use.
    pub fn global() -> &'static QueryLogger {
        &GLOBAL
    }

    pub fn flags(&self) -> QueryLogFlags {
        self.inner.lock().flags
    }

    pub fn set_flags(&self, flags: QueryLogFlags) {
        self.inner.lock().flags = flags;
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    /// Changes the file sink. The current file, if any, is closed; the new
    /// one is opened on the next write.
    pub fn set_path(&self, path: Option<PathBuf>) {
        let mut inner = self.inner.lock();
        inner.file = None;
        inner.path = path;
    }

    /// Appends a subscriber. Subscribers replace the file sink.
    pub fn register<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&QueryLogEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriberId(inner.next_subscriber);
        inner.next_subscriber += 1;
        inner.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Drops every subscriber, restoring the file sink.
    pub fn unregister(&self) {
        self.inner.lock().subscribers.clear();
    }

    /// Drops one subscriber. Returns `false` if `id` was not registered.
    pub fn unregister_one(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Logs `message` if `options.flag` is enabled.
    ///
    /// # Errors
    ///
    /// I/O errors from the file sink.
    pub fn log(&self, message: &str, options: &LogOptions) -> Result<(), QueryLogError> {
        let mut inner = self.inner.lock();
        if !inner.flags.intersects(options.flag) {
            return Ok(());
        }
        let event = QueryLogEvent {
            action: Action::Log,
            flag: options.flag,
            timestamp: Local::now(),
            info: self.info(options.mark.as_deref()),
            message: message.to_owned(),
        };

        if inner.subscribers.is_empty() {
            return write_line(&mut inner, &event);
        }
        let subscribers = snapshot(&inner);
        drop(inner);
        for callback in subscribers {
            callback(&event);
        }
        Ok(())
    }

    /// Closes and recreates the log file at the current path, then tells
    /// subscribers. Used after the file was moved away for rotation.
    pub fn reopen(&self) -> Result<(), QueryLogError> {
        let mut inner = self.inner.lock();
        inner.file = None;
        if let Some(path) = inner.path.clone() {
            inner.file = Some(open_log(&path)?);
            debug!(path = %path.display(), "reopened query log");
        }

        let event = QueryLogEvent {
            action: Action::Reopen,
            flag: QueryLogFlags::NONE,
            timestamp: Local::now(),
            info: self.info(None),
            message: String::new(),
        };
        let subscribers = snapshot(&inner);
        drop(inner);
        for callback in subscribers {
            callback(&event);
        }
        Ok(())
    }

    fn info(&self, mark: Option<&str>) -> String {
        let elapsed = self.started.elapsed().as_nanos();
        format!("{:#x}|{}{} ", self.id, mark.unwrap_or(""), elapsed)
    }
}

fn snapshot(inner: &Inner) -> Vec<Callback> {
    inner.subscribers.iter().map(|(_, cb)| cb.clone()).collect()
}

fn open_log(path: &Path) -> Result<File, QueryLogError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn write_line(inner: &mut Inner, event: &QueryLogEvent) -> Result<(), QueryLogError> {
    if inner.file.is_none() {
        let Some(path) = inner.path.as_deref() else {
            return Ok(());
        };
        inner.file = Some(open_log(path)?);
    }
    if let Some(file) = inner.file.as_mut() {
        writeln!(
            file,
            "{}|{}{}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
            event.info,
            event.message
        )?;
    }
    Ok(())
}
