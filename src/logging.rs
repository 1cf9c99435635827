//! Process-wide logging.
//!
//! Each pipeline stage writes to its own file under the log directory
//! (`index.log`, `ingest.log`, `chat.log`) and to the console. Files rotate
//! by size: when a write would push the active file past `max_bytes`, the
//! file becomes `<name>.1`, older backups shift up, and anything beyond
//! `max_files` backups is removed.
//!
//! Console lines read `LEVEL | message fields`; file lines read
//! `timestamp | LEVEL | target | message fields`. ANSI styling is only used
//! when stdout is a terminal, and never in files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{ChronoLocal, FormatTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::Result;

/// Pipeline stage, used to pick the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Index,
    Ingest,
    Chat,
}

impl Stage {
    pub fn log_file(self) -> &'static str {
        match self {
            Stage::Index => "index.log",
            Stage::Ingest => "ingest.log",
            Stage::Chat => "chat.log",
        }
    }
}

/// Noisy HTTP internals are capped at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls", "tower_http"];

fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut directives = level.to_string();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{}=warn", target));
    }
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber for `stage`.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init(stage: Stage, config: &LoggingConfig) -> Result<()> {
    let writer = RotatingWriter::open(
        config.dir.join(stage.log_file()),
        config.max_bytes,
        config.max_files,
    )?;

    let file_layer = fmt::layer()
        .with_ansi(false)
        .event_format(PipeFormat::file())
        .with_writer(writer);

    let console_layer = fmt::layer()
        .with_ansi(io::stdout().is_terminal())
        .event_format(PipeFormat::console())
        .with_writer(io::stdout);

    let _ = tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(file_layer)
        .with(console_layer)
        .try_init();

    Ok(())
}

/// `|`-separated event lines.
struct PipeFormat {
    timer: Option<ChronoLocal>,
    target: bool,
}

impl PipeFormat {
    fn console() -> Self {
        Self {
            timer: None,
            target: false,
        }
    }

    fn file() -> Self {
        Self {
            timer: Some(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string())),
            target: true,
        }
    }
}

impl<S, N> FormatEvent<S, N> for PipeFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        if let Some(timer) = &self.timer {
            timer.format_time(&mut writer)?;
            write!(writer, " | ")?;
        }
        let meta = event.metadata();
        write!(writer, "{:<5} | ", meta.level())?;
        if self.target {
            write!(writer, "{} | ", meta.target())?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Log panics through `tracing` so they land in the stage log file, then
/// defer to the previously installed hook.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "uncaught panic");
        previous(info);
    }));
}

// ============ Rotating file writer ============

struct RotatingState {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    max_files: usize,
}

impl RotatingState {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.max_files == 0 {
            self.file = File::create(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = backup_path(&self.path, self.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.max_files).rev() {
            let from = backup_path(&self.path, n);
            if from.exists() {
                fs::rename(&from, backup_path(&self.path, n + 1))?;
            }
        }
        fs::rename(&self.path, backup_path(&self.path, 1))?;

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}

/// Size-rotating log file, shared between subscriber writer handles.
#[derive(Clone)]
pub struct RotatingWriter {
    state: Arc<Mutex<RotatingState>>,
}

impl RotatingWriter {
    pub fn open(path: PathBuf, max_bytes: u64, max_files: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            state: Arc::new(Mutex::new(RotatingState {
                path,
                file,
                written,
                max_bytes,
                max_files,
            })),
        })
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer poisoned"))?;
        if state.written > 0 && state.written + buf.len() as u64 > state.max_bytes {
            state.rotate()?;
        }
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer poisoned"))?;
        state.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stage_file_names() {
        assert_eq!(Stage::Index.log_file(), "index.log");
        assert_eq!(Stage::Ingest.log_file(), "ingest.log");
        assert_eq!(Stage::Chat.log_file(), "chat.log");
    }

    #[test]
    fn creates_log_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/logs/chat.log");
        let mut w = RotatingWriter::open(path.clone(), 1024, 3).unwrap();
        w.write_all(b"hello\n").unwrap();
        w.flush().unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "hello\n");
    }

    #[test]
    fn rotates_when_size_exceeded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ingest.log");
        let mut w = RotatingWriter::open(path.clone(), 10, 2).unwrap();

        w.write_all(b"aaaaaaaa\n").unwrap(); // 9 bytes
        w.write_all(b"bbbbbbbb\n").unwrap(); // would be 18 -> rotate
        w.write_all(b"cccccccc\n").unwrap(); // rotate again
        w.write_all(b"dddddddd\n").unwrap(); // oldest backup dropped
        w.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "dddddddd\n");
        assert_eq!(
            fs::read_to_string(backup_path(&path, 1)).unwrap(),
            "cccccccc\n"
        );
        assert_eq!(
            fs::read_to_string(backup_path(&path, 2)).unwrap(),
            "bbbbbbbb\n"
        );
        assert!(!backup_path(&path, 3).exists());
    }

    #[test]
    fn oversized_single_write_goes_to_fresh_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.log");
        let mut w = RotatingWriter::open(path.clone(), 4, 1).unwrap();
        w.write_all(b"0123456789").unwrap();
        w.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0123456789");
        assert!(!backup_path(&path, 1).exists());
    }

    #[test]
    fn appends_to_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.log");
        fs::write(&path, "old\n").unwrap();
        let mut w = RotatingWriter::open(path.clone(), 1024, 3).unwrap();
        w.write_all(b"new\n").unwrap();
        w.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }

    fn capture(format: PipeFormat, dir: &Path) -> String {
        let path = dir.join("capture.log");
        let writer = RotatingWriter::open(path.clone(), 1 << 20, 1).unwrap();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_ansi(false)
                .event_format(format)
                .with_writer(writer),
        );
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(file = "a.pdf", "skipping unreadable document");
        });
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn console_lines_are_level_and_message() {
        let tmp = TempDir::new().unwrap();
        let line = capture(PipeFormat::console(), tmp.path());
        let parts: Vec<&str> = line.trim_end().split(" | ").collect();
        assert_eq!(parts.len(), 2, "{:?}", line);
        assert_eq!(parts[0].trim(), "WARN");
        assert_eq!(parts[1], "skipping unreadable document file=\"a.pdf\"");
    }

    #[test]
    fn file_lines_carry_time_and_target() {
        let tmp = TempDir::new().unwrap();
        let line = capture(PipeFormat::file(), tmp.path());
        let parts: Vec<&str> = line.trim_end().split(" | ").collect();
        assert_eq!(parts.len(), 4, "{:?}", line);
        assert_eq!(parts[0].len(), "2026-01-01 00:00:00".len());
        assert_eq!(parts[1].trim(), "WARN");
        assert_eq!(parts[2], module_path!());
        assert!(parts[3].starts_with("skipping unreadable document"));
        assert!(!line.contains('\u{1b}'));
    }
}
