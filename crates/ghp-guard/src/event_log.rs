//! Operator-facing event log.
//!
//! Every relay event becomes one line `[yyyy-MM-dd HH:mm:ss] message`,
//! printed to stdout and appended to the log file. The log is created once in
//! `main` and handed to the listener and every session as
//! `Arc<dyn EventLog>`.
//!
//! Neither sink can stop the relay. The first failure of each is reported
//! through `tracing`, and later lines are still attempted.
//!
//! Diagnostics with structured fields go through `tracing` instead and end
//! up on stderr.

use chrono::{DateTime, Local};
use ghp_guard_core::GuardResult;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Sink for relay events. Calls are synchronous and must not interleave
/// within a line.
pub trait EventLog: Send + Sync {
    fn log(&self, text: &str);
}

/// Shared handle passed to every component.
pub type SharedEventLog = Arc<dyn EventLog>;

/// Format one event line with the given timestamp.
pub fn format_line(at: DateTime<Local>, text: &str) -> String {
    format!("[{}] {}", at.format("%Y-%m-%d %H:%M:%S"), text)
}

/// Console sink for event lines.
pub type ConsoleWriter = Box<dyn Write + Send>;

/// Event log writing to stdout and an append-only file.
pub struct FileEventLog {
    path: PathBuf,
    /// Guards both sinks so a line reaches them in the same order.
    sinks: Mutex<Sinks>,
    /// Set after the first failed file write so the warning is not repeated.
    write_failed: AtomicBool,
    /// Same, for the console.
    console_failed: AtomicBool,
}

struct Sinks {
    file: File,
    console: Option<ConsoleWriter>,
}

impl FileEventLog {
    /// Open (or create) the log file for appending. Lines are also copied to
    /// stdout until [`with_console`](Self::with_console) turns that off.
    pub fn open(path: &Path) -> GuardResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), "event log opened");
        Ok(Self {
            path: path.to_path_buf(),
            sinks: Mutex::new(Sinks {
                file,
                console: Some(Box::new(io::stdout())),
            }),
            write_failed: AtomicBool::new(false),
            console_failed: AtomicBool::new(false),
        })
    }

    /// Enable or disable the stdout copy.
    pub fn with_console(self, echo: bool) -> Self {
        if echo {
            self.with_console_writer(Box::new(io::stdout()))
        } else {
            self.replace_console(None)
        }
    }

    /// Copy lines to `writer` instead of stdout.
    pub fn with_console_writer(self, writer: ConsoleWriter) -> Self {
        self.replace_console(Some(writer))
    }

    fn replace_console(mut self, console: Option<ConsoleWriter>) -> Self {
        self.sinks.get_mut().unwrap_or_else(|e| e.into_inner()).console = console;
        self
    }
}

impl EventLog for FileEventLog {
    fn log(&self, text: &str) {
        let line = format_line(Local::now(), text);
        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(console) = sinks.console.as_mut() {
            if let Err(e) = writeln!(console, "{line}").and_then(|_| console.flush()) {
                if !self.console_failed.swap(true, Ordering::Relaxed) {
                    warn!(error = %e, "failed to write event log to console");
                }
            }
        }

        if let Err(e) = writeln!(sinks.file, "{line}") {
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                warn!(path = %self.path.display(), error = %e, "failed to append to event log");
            }
        }
    }
}

/// In-memory event log for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryEventLog {
    lines: Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemoryEventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Logged messages, without timestamps.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    pub fn count(&self, message: &str) -> usize {
        self.lines().iter().filter(|l| *l == message).count()
    }
}

#[cfg(test)]
impl EventLog for MemoryEventLog {
    fn log(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn line_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(format_line(at, "PLC connected."), "[2024-03-07 09:05:01] PLC connected.");
    }

    #[test]
    fn appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_log.txt");
        std::fs::write(&path, "existing\n").unwrap();

        let log = FileEventLog::open(&path).unwrap().with_console(false);
        log.log("first");
        log.log("second");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "existing");
        assert!(lines[1].starts_with('[') && lines[1].ends_with("] first"));
        assert!(lines[2].ends_with("] second"));
    }

    /// Console that fails every write, like stdout after the reader exits.
    struct BrokenPipe {
        attempts: Arc<AtomicUsize>,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn console_failure_does_not_stop_file_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_log.txt");
        let attempts = Arc::new(AtomicUsize::new(0));
        let log = FileEventLog::open(&path).unwrap().with_console_writer(Box::new(BrokenPipe {
            attempts: attempts.clone(),
        }));

        log.log("PLC connected.");
        log.log("Connection closed.");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] PLC connected."));
        assert!(lines[1].ends_with("] Connection closed."));
        // console is retried for every line
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert!(log.console_failed.load(Ordering::SeqCst));
    }

    #[test]
    fn console_receives_formatted_lines() {
        #[derive(Clone, Default)]
        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let console = Shared::default();
        let log = FileEventLog::open(&dir.path().join("proxy_log.txt"))
            .unwrap()
            .with_console_writer(Box::new(console.clone()));
        log.log("Connected to GHP.");

        let printed = String::from_utf8(console.0.lock().unwrap().clone()).unwrap();
        assert!(printed.starts_with('['));
        assert!(printed.ends_with("] Connected to GHP.\n"));
    }

    #[test]
    fn concurrent_lines_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy_log.txt");
        let log = Arc::new(FileEventLog::open(&path).unwrap().with_console(false));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        log.log(&format!("thread {t} line {i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 400);
        assert!(lines.iter().all(|l| l.starts_with('[') && l.contains("] thread ")));
    }
}
