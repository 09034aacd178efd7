//! File transport.

use super::{read_full, Transport};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
enum Handle {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
}

/// Buffered file, opened either for writing or for reading
#[derive(Debug)]
pub struct FileTransport {
    path: PathBuf,
    handle: Handle,
}

impl FileTransport {
    /// Create (or truncate) `path` for writing
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::file_open(path, e))?;
        debug!(path = %path.display(), "archive file created");
        Ok(Self {
            path: path.to_path_buf(),
            handle: Handle::Writer(BufWriter::new(file)),
        })
    }

    /// Open `path` for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::file_open(path, e))?;
        debug!(path = %path.display(), "archive file opened");
        Ok(Self {
            path: path.to_path_buf(),
            handle: Handle::Reader(BufReader::new(file)),
        })
    }

    /// Path the transport was opened with
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if opened for writing
    pub fn is_writer(&self) -> bool {
        matches!(self.handle, Handle::Writer(_))
    }
}

fn wrong_direction(op: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot {op}: file opened in the other direction"),
    )
}

impl Transport for FileTransport {
    fn save(&mut self, data: &[u8]) -> io::Result<usize> {
        match &mut self.handle {
            Handle::Writer(writer) => {
                writer.write_all(data)?;
                Ok(data.len())
            }
            Handle::Reader(_) => Err(wrong_direction("save")),
        }
    }

    fn load(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.handle {
            Handle::Reader(reader) => read_full(reader, buf),
            Handle::Writer(_) => Err(wrong_direction("load")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.handle {
            Handle::Writer(writer) => writer.flush(),
            Handle::Reader(_) => Ok(()),
        }
    }
}
