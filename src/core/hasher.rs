//! Streaming SHA-256 file fingerprints.
//!
//! This module provides `FileHasher` for computing the content fingerprint
//! used to look files up in the sandbox. Cuckoo indexes samples by SHA-256,
//! so that is the only digest computed. Files are read in fixed-size chunks
//! and never loaded into memory as a whole.

use crate::core::error::SandboxError;
use crate::core::types::Fingerprint;

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Default read size when streaming a file through the digest.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Computes content fingerprints.
///
/// # Examples
///
/// ```rust
/// use sandbridge::core::FileHasher;
///
/// let hasher = FileHasher::new();
/// let fingerprint = hasher.hash_bytes(b"hello world");
/// assert_eq!(
///     fingerprint.as_str(),
///     "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct FileHasher {
    chunk_size: usize,
}

impl Default for FileHasher {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl FileHasher {
    /// Creates a new `FileHasher` reading 4096-byte chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the read chunk size. The digest does not depend on it.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Returns the read chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Computes the fingerprint of bytes already in memory.
    pub fn hash_bytes(&self, data: &[u8]) -> Fingerprint {
        Fingerprint::new(format!("{:x}", Sha256::digest(data)))
    }

    /// Computes the fingerprint of a file on disk.
    ///
    /// A file that vanished between enumeration and hashing is reported as
    /// `FileNotFound`; any other read failure, including one in the middle
    /// of the file, as `Io`.
    pub fn hash_file(&self, path: &Path) -> Result<Fingerprint, SandboxError> {
        let mut file = std::fs::File::open(path).map_err(|e| not_found_or_io(e, path))?;
        self.hash_reader(&mut file)
            .map_err(|e| match e {
                SandboxError::Io(io) => not_found_or_io(io, path),
                other => other,
            })
    }

    /// Streams a reader through the digest, one chunk at a time.
    pub fn hash_reader<R: Read>(&self, reader: &mut R) -> Result<Fingerprint, SandboxError> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SandboxError::Io(e)),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Fingerprint::new(format!("{:x}", hasher.finalize())))
    }

    /// Computes the fingerprint of a file without blocking the async runtime.
    pub async fn hash_file_async(&self, path: &Path) -> Result<Fingerprint, SandboxError> {
        let hasher = self.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || hasher.hash_file(&path))
            .await
            .map_err(|e| SandboxError::internal(format!("hashing task failed: {}", e)))?
    }
}

fn not_found_or_io(e: std::io::Error, path: &Path) -> SandboxError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SandboxError::FileNotFound {
            path: path.display().to_string(),
        }
    } else {
        SandboxError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_bytes_known_digest() {
        let hasher = FileHasher::new();
        let fp = hasher.hash_bytes(b"");
        assert_eq!(
            fp.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = FileHasher::new();
        let data = b"test data for hashing";

        assert_eq!(hasher.hash_bytes(data), hasher.hash_bytes(data));
    }

    #[test]
    fn test_hash_different_data() {
        let hasher = FileHasher::new();
        assert_ne!(hasher.hash_bytes(b"data1"), hasher.hash_bytes(b"data2"));
    }

    #[test]
    fn test_chunk_size_does_not_change_digest() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let expected = FileHasher::new().hash_bytes(&data);

        for chunk_size in [1, 7, 4096, 4097, 65536] {
            let hasher = FileHasher::new().with_chunk_size(chunk_size);
            let got = hasher.hash_reader(&mut data.as_slice()).unwrap();
            assert_eq!(got, expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"MZ\x90\x00 not really a PE").unwrap();

        let hasher = FileHasher::new();
        let from_file = hasher.hash_file(file.path()).unwrap();
        assert_eq!(from_file, hasher.hash_bytes(b"MZ\x90\x00 not really a PE"));
    }

    #[test]
    fn test_hash_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileHasher::new().hash_file(&dir.path().join("gone.exe"));
        assert!(matches!(result, Err(SandboxError::FileNotFound { .. })));
    }

    #[test]
    fn test_default_chunk_size() {
        assert_eq!(FileHasher::new().chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(FileHasher::new().with_chunk_size(0).chunk_size(), 1);
    }

    /// Yields a few bytes, then fails like a disk error in the middle of a file.
    struct FailsMidRead {
        remaining: usize,
        interrupted: bool,
    }

    impl Read for FailsMidRead {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(std::io::ErrorKind::Interrupted));
            }
            if self.remaining == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone"));
            }
            let n = buf.len().min(self.remaining).min(1);
            buf[..n].fill(b'x');
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_read_failure_mid_file_is_io_error() {
        let mut reader = FailsMidRead {
            remaining: 3,
            interrupted: false,
        };

        let err = FileHasher::new().hash_reader(&mut reader).unwrap_err();

        match err {
            SandboxError::Io(io) => {
                assert_eq!(io.kind(), std::io::ErrorKind::Other);
                assert_eq!(io.to_string(), "device gone");
            }
            other => panic!("expected Io, got {other:?}"),
        }
        assert_eq!(reader.remaining, 0);
    }

    #[tokio::test]
    async fn test_hash_file_async() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"async content").unwrap();

        let hasher = FileHasher::new();
        let fp = hasher.hash_file_async(file.path()).await.unwrap();
        assert_eq!(fp, hasher.hash_bytes(b"async content"));
    }
}
