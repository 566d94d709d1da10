//! JSONL file sink.
//!
//! Writes structured log lines to a central file that can be tailed by
//! external tools. Multi-process safe via append-only semantics.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Central log file location.
///
/// Uses `~/.chatsync/logs/chatsync.jsonl`, or a relative path when the home
/// directory cannot be determined.
pub fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatsync")
        .join("logs")
        .join("chatsync.jsonl")
}

/// File writer that appends to the central log file.
/// Flushes after every write so concurrent processes interleave whole lines.
#[derive(Clone)]
pub struct CentralLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl CentralLogWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// MakeWriter implementation for tracing-subscriber.
#[derive(Clone)]
pub struct WriterFactory {
    writer: CentralLogWriter,
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

/// Builds the JSONL layer for the configured (or default) path.
pub(crate) fn json_layer(config: &LogConfig) -> io::Result<JsonLayer<WriterFactory>> {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);
    let writer = CentralLogWriter::new(&log_path)?;
    Ok(JsonLayer::new(
        config.service_name.clone(),
        WriterFactory { writer },
    ))
}
