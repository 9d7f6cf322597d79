use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const MAX_LOG_SIZE: u64 = 1024 * 1024;

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append-only install log that survives the install directory being
/// cleaned while the run is still writing to it.
struct InstallLogWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl InstallLogWriter {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn with_file<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.path.exists() {
            if let Some(dir) = self.path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            *file = open_append(&self.path)?;
        }
        op(&mut file)
    }
}

impl Write for InstallLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

/// Drop the older half of an oversized log, cutting at a line boundary.
fn trim_oversized_log(path: &Path, limit: u64) {
    let oversized = std::fs::metadata(path).is_ok_and(|meta| meta.len() > limit);
    if !oversized {
        return;
    }
    let Ok(contents) = std::fs::read(path) else {
        return;
    };
    let middle = contents.len() / 2;
    let cut = contents[middle..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(middle, |offset| middle + offset + 1);
    if let Err(error) = std::fs::write(path, &contents[cut..]) {
        eprintln!("Could not trim log file {}: {error}", path.display());
    }
}

#[must_use]
pub fn console_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Log to the terminal and, when `log_path` is given, to the install log.
pub fn init_logging(log_path: Option<&Path>, verbose: bool) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("spg_")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        console_level(verbose),
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if let Some(log_path) = log_path {
        trim_oversized_log(log_path, MAX_LOG_SIZE);
        match InstallLogWriter::open(log_path.to_path_buf()) {
            Ok(writer) => loggers.push(WriteLogger::new(LevelFilter::Debug, config, writer)),
            Err(error) => eprintln!("Could not open log file {}: {error}", log_path.display()),
        }
    }

    let _ = CombinedLogger::init(loggers);
    log::set_max_level(LevelFilter::Debug);

    if let Some(log_path) = log_path {
        log::info!("Logging to {}", log_path.display());
    }
}
