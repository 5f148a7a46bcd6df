use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

use crate::platform::{NativePlatform, Platform};

pub const LOG_ENV: &str = "CREATORFLOW_LOG";
pub const LOG_FILE: &str = "creatorflow.log";

/// Sends every log line to `<data_dir>/logs/creatorflow.log`, and to stderr
/// as well when asked to.
#[derive(Clone)]
pub(crate) struct TeeMakeWriter {
    pub file: Option<Arc<Mutex<File>>>,
    pub echo_stderr: bool,
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            file: self.file.clone(),
            echo_stderr: self.echo_stderr,
        }
    }
}

pub(crate) struct TeeWriter {
    file: Option<Arc<Mutex<File>>>,
    echo_stderr: bool,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = file.write_all(buf);
        }
        if self.echo_stderr {
            std::io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = file.flush();
        }
        if self.echo_stderr {
            std::io::stderr().flush()?;
        }
        Ok(())
    }
}

fn open_log_file(data_dir: &Path) -> Option<File> {
    let dir = data_dir.join("logs");
    std::fs::create_dir_all(&dir).ok()?;
    NativePlatform::restrict_dir_permissions(&dir);
    let path = dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;
    NativePlatform::restrict_file_permissions(&path);
    Some(file)
}

/// Installs the global subscriber. The filter comes from `CREATORFLOW_LOG`
/// (default `info`); setting it also mirrors logs to stderr.
pub fn init(data_dir: &Path) {
    let requested = std::env::var(LOG_ENV).ok().filter(|v| !v.trim().is_empty());
    let filter = requested
        .as_deref()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let make_writer = TeeMakeWriter {
        file: open_log_file(data_dir).map(|f| Arc::new(Mutex::new(f))),
        echo_stderr: requested.is_some(),
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn tee_writer_appends_to_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = open_log_file(tmp.path()).unwrap();
        let make = TeeMakeWriter {
            file: Some(Arc::new(Mutex::new(file))),
            echo_stderr: false,
        };
        make.make_writer().write_all(b"first\n").unwrap();
        let mut w = make.make_writer();
        w.write_all(b"second\n").unwrap();
        w.flush().unwrap();

        let mut contents = String::new();
        File::open(tmp.path().join("logs").join(LOG_FILE))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn writer_without_file_still_accepts_bytes() {
        let make = TeeMakeWriter {
            file: None,
            echo_stderr: false,
        };
        assert_eq!(make.make_writer().write(b"dropped").unwrap(), 7);
    }
}
