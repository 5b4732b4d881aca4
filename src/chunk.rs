//! Fixed-size chunk reading for the sender and append-only writing for the
//! receiver.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{DrtpError, Result};
use crate::CHUNK_SIZE;

/// Number of chunks needed to carry `size` bytes.
pub fn total_chunks(size: u64) -> u64 {
    size.div_ceil(CHUNK_SIZE as u64)
}

pub struct ChunkSource<R> {
    inner: R,
    origin: String,
    size: u64,
}

impl ChunkSource<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let file = File::open(path).map_err(|source| DrtpError::SourceUnavailable {
            origin: origin.clone(),
            source,
        })?;
        Self::new(file, origin)
    }
}

impl<R: Read + Seek> ChunkSource<R> {
    pub fn new(mut inner: R, origin: impl Into<String>) -> Result<Self> {
        let origin = origin.into();
        let size = inner
            .seek(SeekFrom::End(0))
            .map_err(|source| DrtpError::SourceUnavailable {
                origin: origin.clone(),
                source,
            })?;
        Ok(Self {
            inner,
            origin,
            size,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn total_chunks(&self) -> u64 {
        total_chunks(self.size)
    }

    /// Read chunk `index` (1-based). The last chunk may be short.
    pub fn read_chunk(&mut self, index: u16) -> Result<Vec<u8>> {
        let offset = u64::from(index.saturating_sub(1)) * CHUNK_SIZE as u64;
        self.read_at(offset)
            .map_err(|source| DrtpError::SourceUnavailable {
                origin: self.origin.clone(),
                source,
            })
    }

    fn read_at(&mut self, offset: u64) -> io::Result<Vec<u8>> {
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut chunk = Vec::with_capacity(CHUNK_SIZE);
        (&mut self.inner)
            .take(CHUNK_SIZE as u64)
            .read_to_end(&mut chunk)?;
        Ok(chunk)
    }
}

pub struct ChunkSink<W: Write> {
    inner: W,
    written: u64,
}

impl ChunkSink<BufWriter<File>> {
    /// Create `path`, truncating anything already there.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| DrtpError::SinkUnavailable {
            path: PathBuf::from(path),
            source,
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ChunkSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
