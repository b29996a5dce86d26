//! Process-wide logger set-up.
//!
//! Library code logs through the `log` macros only. The binary calls [`init`] once with the
//! `[logging]` section of the configuration; `RUST_LOG` still overrides the level.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use env_logger::{Builder, Env, Target};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, LevelFilter};
use serde::Deserialize;

static HANDLE: OnceLock<LogHandle> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("unknown log level '{0}'")]
    InvalidLevel(String),
    #[error("cannot prepare log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `timestamp | LEVEL | target:line - message`
    #[default]
    Detailed,
    /// `LEVEL message`
    Compact,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub format: LogFormat,
    pub max_size_mb: u64,
    pub retention_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: LogFormat::Detailed,
            max_size_mb: 10,
            retention_days: 30,
        }
    }
}

impl LoggingConfig {
    /// Parsed level. `warning` is accepted as an alias of `warn`.
    pub fn level_filter(&self) -> Result<LevelFilter, LoggingError> {
        let normalized = self.level.trim().to_ascii_lowercase();
        let name = if normalized == "warning" { "warn" } else { normalized.as_str() };
        name.parse::<LevelFilter>()
            .map_err(|_| LoggingError::InvalidLevel(self.level.clone()))
    }
}

/// Sinks chosen by the first successful [`init`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogHandle {
    pub level: LevelFilter,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

/// Installs the global logger. Later calls return the handle of the first one.
pub fn init(config: &LoggingConfig) -> Result<&'static LogHandle, LoggingError> {
    if let Some(handle) = HANDLE.get() {
        return Ok(handle);
    }

    let level = config.level_filter()?;
    let file = match &config.file {
        Some(path) => Some((path.clone(), open_log_file(path, config)?)),
        None => None,
    };

    let mut builder = Builder::from_env(Env::default().default_filter_or(level.as_str()));
    match config.format {
        LogFormat::Detailed => builder.format(|buf, record| {
            writeln!(
                buf,
                "{} | {:<5} | {}:{} - {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.line().unwrap_or(0),
                record.args()
            )
        }),
        LogFormat::Compact => builder.format(|buf, record| writeln!(buf, "{:<5} {}", record.level(), record.args())),
    };
    let file_path = match file {
        Some((path, handle)) => {
            builder.target(Target::Pipe(Box::new(Tee {
                console: io::stderr(),
                file: handle,
            })));
            Some(path)
        }
        None => None,
    };

    if let Err(e) = builder.try_init() {
        debug!("Logger already installed: {}", e);
    }

    Ok(HANDLE.get_or_init(|| LogHandle {
        level,
        format: config.format,
        file: file_path,
    }))
}

fn open_log_file(path: &Path, config: &LoggingConfig) -> Result<File, LoggingError> {
    let wrap = |source| LoggingError::File {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    rotate_if_large(path, config.max_size_mb.saturating_mul(1024 * 1024)).map_err(wrap)?;
    prune_rotated(path, Duration::from_secs(config.retention_days.saturating_mul(24 * 60 * 60))).map_err(wrap)?;
    OpenOptions::new().create(true).append(true).open(path).map_err(wrap)
}

/// Moves `path` to a gzip archive `<path>.<unix-seconds>.gz` once it reaches `max_bytes`.
///
/// Returns the archive name, if any.
pub fn rotate_if_large(path: &Path, max_bytes: u64) -> io::Result<Option<PathBuf>> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if size < max_bytes {
        return Ok(None);
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let mut rotated = path.as_os_str().to_owned();
    rotated.push(format!(".{}", stamp));
    let rotated = PathBuf::from(rotated);
    fs::rename(path, &rotated)?;

    let mut archive = rotated.as_os_str().to_owned();
    archive.push(".gz");
    let archive = PathBuf::from(archive);
    compress(&rotated, &archive)?;
    fs::remove_file(&rotated)?;
    Ok(Some(archive))
}

fn compress(source: &Path, target: &Path) -> io::Result<()> {
    let mut input = BufReader::new(File::open(source)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(target)?), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()
}

/// Deletes rotated siblings of `path` last modified more than `retention` ago.
///
/// Returns the number of files removed.
pub fn prune_rotated(path: &Path, retention: Duration) -> io::Result<usize> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(0);
    };
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Ok(0);
    }

    let prefix = format!("{}.", name);
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(suffix) = file_name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
            continue;
        };
        let stamp = suffix.strip_suffix(".gz").unwrap_or(suffix);
        if stamp.is_empty() || !stamp.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let age = entry
            .metadata()?
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age > retention {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

// Duplicates every record to the console and the log file.
struct Tee {
    console: io::Stderr,
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.console.write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.flush()?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_level_aliases() {
        let mut config = LoggingConfig::default();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Info);

        config.level = "WARNING".into();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Warn);

        config.level = "verbose".into();
        assert!(matches!(config.level_filter(), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_rotation_threshold() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("run.log");

        assert_eq!(rotate_if_large(&path, 10)?, None);

        fs::write(&path, b"short")?;
        assert_eq!(rotate_if_large(&path, 10)?, None);
        assert!(path.exists());

        fs::write(&path, b"0123456789abcdef")?;
        let rotated = rotate_if_large(&path, 10)?.expect("file should rotate");
        assert!(!path.exists());
        assert!(rotated.exists());
        let name = rotated.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("run.log.") && name.ends_with(".gz"), "{}", name);

        let mut restored = String::new();
        GzDecoder::new(File::open(&rotated)?).read_to_string(&mut restored)?;
        assert_eq!(restored, "0123456789abcdef");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_prune_keeps_recent_and_unrelated_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("run.log");
        fs::write(&path, b"current")?;
        fs::write(dir.path().join("run.log.1700000000"), b"old")?;
        fs::write(dir.path().join("run.log.1700000001.gz"), b"old archive")?;
        fs::write(dir.path().join("run.log.backup"), b"not rotated")?;
        fs::write(dir.path().join("other.log.1700000000"), b"other")?;

        // Everything was just written, so nothing is past a one-day retention
        assert_eq!(prune_rotated(&path, Duration::from_secs(86_400))?, 0);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(prune_rotated(&path, Duration::from_millis(1))?, 2);
        assert!(!dir.path().join("run.log.1700000000").exists());
        assert!(!dir.path().join("run.log.1700000001.gz").exists());
        assert!(dir.path().join("run.log.backup").exists());
        assert!(dir.path().join("other.log.1700000000").exists());
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_config_from_toml() {
        let config: LoggingConfig = toml::from_str(
            r#"
            level = "debug"
            file = "logs/phenoscope.log"
            format = "compact"
            "#,
        )
        .unwrap();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.file, Some(PathBuf::from("logs/phenoscope.log")));
        assert_eq!(config.max_size_mb, 10);
        assert_eq!(config.retention_days, 30);
    }

    #[test]
    fn test_init_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let config = LoggingConfig {
            level: "warn".into(),
            file: Some(dir.path().join("nested").join("run.log")),
            ..LoggingConfig::default()
        };
        let first = init(&config)?;
        let second = init(&LoggingConfig::default())?;
        assert_eq!(first, second);
        Ok(())
    }
}
