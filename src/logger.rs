//! Process-wide tracing output and per-match JSON-lines logs.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Instant,
};

use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Value};
use time::{
    format_description::{self, well_known::Rfc3339},
    OffsetDateTime,
};
use tracing::{debug, subscriber::set_global_default, warn, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Sends all tracing output to a fresh timestamped file in `dir`.
///
/// # Errors
///
/// Fails if the file cannot be created or another global subscriber is already set.
pub fn init_logger(dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join(get_log_file_name()?);
    let file = File::create(&path)
        .with_context(|| format!("could not create log file {}", path.display()))?;
    let writer = BoxMakeWriter::new(file);
    let local_offset =
        time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid time format")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).context(
        "Could not set global default tracing subscriber. Consider disabling logs if you are already setting a subscriber.",
    )?;
    Ok(path)
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = format_description::parse("[year]-[month]-[day]_[hour]-[minute]-[second]_log.txt")
        .context("invalid file name format")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&format).context("could not format log file name")
}

/// Kind of a match log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogKind {
    Debug,
    Warn,
    Error,
    /// Full game state after a tick.
    View,
    /// A player's accepted move message.
    Move,
}

/// Structured, leveled log of one match.
///
/// Logging never fails and never blocks the turn loop for longer than one buffered write.
pub trait MatchLog: Send + Sync {
    fn log(&self, kind: LogKind, msg: Vec<Value>);

    fn log_text(&self, kind: LogKind, text: &str) {
        self.log(kind, vec![Value::String(text.to_owned())]);
    }
}

/// Writes one `{"typ","msg","elapsed","time"}` JSON object per line.
pub struct JsonLinesLogger {
    out: Mutex<BufWriter<Box<dyn Write + Send>>>,
    start: Instant,
}

impl JsonLinesLogger {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        JsonLinesLogger {
            out: Mutex::new(BufWriter::new(Box::new(out))),
            start: Instant::now(),
        }
    }

    /// Creates (or truncates) `path`.
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("could not create match log {}", path.display()))?;
        Ok(Self::new(file))
    }

    pub fn flush(&self) {
        if let Ok(mut out) = self.out.lock() {
            let _ = out.flush();
        }
    }
}

impl MatchLog for JsonLinesLogger {
    fn log(&self, kind: LogKind, msg: Vec<Value>) {
        match kind {
            LogKind::Warn | LogKind::Error => warn!(?kind, ?msg),
            LogKind::Debug => debug!(?msg),
            LogKind::View | LogKind::Move => {}
        }
        let time = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let record = json!({
            "typ": kind,
            "msg": msg,
            "elapsed": format!("{:?}", self.start.elapsed()),
            "time": time,
        });
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        if serde_json::to_writer(&mut *out, &record).is_ok() {
            let _ = out.write_all(b"\n");
        }
    }
}

impl Drop for JsonLinesLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl MatchLog for NullLog {
    fn log(&self, _kind: LogKind, _msg: Vec<Value>) {}
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    records: Mutex<Vec<(LogKind, Vec<Value>)>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(LogKind, Vec<Value>)> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn of_kind(&self, kind: LogKind) -> Vec<Vec<Value>> {
        self.records()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, msg)| msg)
            .collect()
    }
}

impl MatchLog for RecordingLog {
    fn log(&self, kind: LogKind, msg: Vec<Value>) {
        if let Ok(mut records) = self.records.lock() {
            records.push((kind, msg));
        }
    }
}
