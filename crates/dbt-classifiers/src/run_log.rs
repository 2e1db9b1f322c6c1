//! Per-run log files.
//!
//! Records go to the console through `env_logger` and, while a
//! [`RunLogGuard`] is alive, to the run's log file as well. Dropping the guard
//! flushes the file and puts back whatever sink was active before it.
use std::fs::{self, File};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{LevelFilter, Log, Metadata, Record};

type Sink = Box<dyn Write + Send>;

static FILE_SINK: Mutex<Option<Sink>> = Mutex::new(None);

/// Level written to the run file regardless of the console filter.
const FILE_LEVEL: LevelFilter = LevelFilter::Info;

fn with_sink<R>(f: impl FnOnce(&mut Option<Sink>) -> R) -> R {
    let mut guard = FILE_SINK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

/// Console logger plus the optional per-run file sink.
pub struct RunLogger {
    console: env_logger::Logger,
}

impl RunLogger {
    pub fn new(console: env_logger::Logger) -> Self {
        RunLogger { console }
    }

    /// Most verbose level either sink accepts.
    pub fn max_level(&self) -> LevelFilter {
        self.console.filter().max(FILE_LEVEL)
    }
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || metadata.level() <= FILE_LEVEL
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            self.console.log(record);
        }
        if record.level() <= FILE_LEVEL {
            with_sink(|sink| {
                if let Some(out) = sink.as_mut() {
                    // A failing log write must not take the run down.
                    let _ = writeln!(
                        out,
                        "{} {:<5} {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.args()
                    );
                }
            });
        }
    }

    fn flush(&self) {
        self.console.flush();
        with_sink(|sink| {
            if let Some(out) = sink.as_mut() {
                let _ = out.flush();
            }
        });
    }
}

/// Install [`RunLogger`] as the global logger. The console filter comes from
/// `DBT_LOG` (default `info`).
pub fn init_logging() -> Result<(), log::SetLoggerError> {
    let console = env_logger::Builder::default()
        .filter_level(LevelFilter::Info)
        .parse_env(env_logger::Env::default().filter_or("DBT_LOG", "info"))
        .build();
    let logger = RunLogger::new(console);
    let max_level = logger.max_level();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}

/// Keeps a run's log file installed as the file sink.
#[must_use = "the log file is detached as soon as the guard is dropped"]
pub struct RunLogGuard {
    path: PathBuf,
    previous: Option<Sink>,
}

impl RunLogGuard {
    /// Create (truncate) `path` and route file records to it.
    ///
    /// Installs the global logger first if nobody has; an already installed
    /// foreign logger is left alone, in which case only the run header lands
    /// in the file.
    pub fn install(path: &Path) -> io::Result<Self> {
        let _ = init_logging();

        let mut file = LineWriter::new(File::create(path)?);
        writeln!(
            file,
            "{} run log opened",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        let previous = with_sink(|sink| sink.replace(Box::new(file)));
        Ok(RunLogGuard {
            path: path.to_path_buf(),
            previous,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLogGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let mut current = with_sink(|sink| std::mem::replace(sink, previous));
        if let Some(out) = current.as_mut() {
            let _ = out.flush();
        }
    }
}

/// Prepare `logs_dir/{name}.log` for a new run.
///
/// An existing log becomes `{name}-prev.log`, replacing any older previous
/// log, so at most two generations exist. Returns the path of the fresh log,
/// which is not created here.
pub fn rotate_log(logs_dir: &Path, name: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(logs_dir)?;
    let current = logs_dir.join(format!("{}.log", name));
    if current.exists() {
        let previous = logs_dir.join(format!("{}-prev.log", name));
        if previous.exists() {
            fs::remove_file(&previous)?;
        }
        fs::rename(&current, &previous)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn three_runs_keep_two_generations() {
        let dir = tempfile::tempdir().unwrap();
        for run in 1..=3 {
            let path = rotate_log(dir.path(), "KNN-summary").unwrap();
            fs::write(&path, format!("run {}", run)).unwrap();
        }

        assert_eq!(log_files(dir.path()), vec!["KNN-summary-prev.log", "KNN-summary.log"]);
        let prev = fs::read_to_string(dir.path().join("KNN-summary-prev.log")).unwrap();
        let current = fs::read_to_string(dir.path().join("KNN-summary.log")).unwrap();
        assert_eq!(prev, "run 2");
        assert_eq!(current, "run 3");
    }

    #[test]
    fn first_run_creates_logs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("tmp").join("logs");
        let path = rotate_log(&logs, "RF-summary").unwrap();
        assert!(logs.is_dir());
        assert!(!path.exists());
    }

    #[test]
    fn guard_captures_records_and_detaches_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        {
            let guard = RunLogGuard::install(&path).unwrap();
            assert_eq!(guard.path(), path.as_path());
            log::info!("inside the run");
        }
        log::info!("after the run");

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("run log opened"));
        assert!(content.contains("inside the run"));
        assert!(!content.contains("after the run"));
    }
}
