//! File sources: the payload a transfer reads chunks from.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// A readable, fixed-size payload. Ranges are half-open `[start, end)`.
pub trait FileSource: Send + Sync {
    /// Display name (sent to the server on session creation).
    fn name(&self) -> &str;
    /// Total size in bytes.
    fn size(&self) -> u64;
    fn mime_type(&self) -> &str {
        "application/octet-stream"
    }
    /// Read exactly the bytes in `[start, end)`.
    fn read_range(&self, start: u64, end: u64) -> io::Result<Vec<u8>>;
}

fn check_range(start: u64, end: u64, size: u64) -> io::Result<usize> {
    if start > end || end > size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("range {}..{} outside file of {} bytes", start, end, size),
        ));
    }
    Ok((end - start) as usize)
}

/// A file on the local filesystem. Size is captured when opened.
#[derive(Debug)]
pub struct LocalFile {
    file: File,
    path: PathBuf,
    name: String,
    size: u64,
    mime_type: String,
}

impl LocalFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let size = file
            .metadata()
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mime_type: guess_mime_type(&name).to_string(),
            name,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Positional read; does not move a shared cursor.
    #[cfg(unix)]
    fn read_range(&self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let len = check_range(start, end, self.size)?;
        let mut buf = vec![0u8; len];
        self.file.read_exact_at(&mut buf, start)?;
        Ok(buf)
    }

    /// Non-Unix: seek + read on a cloned handle.
    #[cfg(not(unix))]
    fn read_range(&self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};
        let len = check_range(start, end, self.size)?;
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; len];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// An in-memory payload.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    data: Vec<u8>,
    mime_type: String,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        Self {
            mime_type: guess_mime_type(&name).to_string(),
            name,
            data: data.into(),
        }
    }
}

impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn read_range(&self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        check_range(start, end, self.size())?;
        Ok(self.data[start as usize..end as usize].to_vec())
    }
}

/// MIME type from the file extension; octet-stream when unknown.
pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn local_file_reads_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"0123456789").unwrap();
        drop(f);

        let src = LocalFile::open(&path).unwrap();
        assert_eq!(src.name(), "notes.txt");
        assert_eq!(src.size(), 10);
        assert_eq!(src.mime_type(), "text/plain");
        assert_eq!(src.read_range(2, 5).unwrap(), b"234");
        assert_eq!(src.read_range(10, 10).unwrap(), b"");
        assert!(src.read_range(5, 11).is_err());
    }

    #[test]
    fn local_file_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalFile::open(dir.path().join("nope.bin")).is_err());
    }

    #[test]
    fn memory_file_ranges() {
        let src = MemoryFile::new("a.bin", b"abcdef".to_vec());
        assert_eq!(src.size(), 6);
        assert_eq!(src.read_range(0, 6).unwrap(), b"abcdef");
        assert_eq!(src.read_range(4, 6).unwrap(), b"ef");
        assert!(src.read_range(4, 3).is_err());
    }

    #[test]
    fn mime_guess() {
        assert_eq!(guess_mime_type("Photo.JPG"), "image/jpeg");
        assert_eq!(guess_mime_type("archive.tar"), "application/x-tar");
        assert_eq!(guess_mime_type("noext"), "application/octet-stream");
    }
}
