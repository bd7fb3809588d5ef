//! Directory-backed storage backend.
//!
//! Each key is one file named by the hex encoding of the key. Files are
//! framed with a magic header, a length and a CRC32 so that torn or foreign
//! files are reported as corruption instead of being handed to the decoder.

use crate::error::StorageError;
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::StorageBackend;

/// Magic bytes for entry files.
const ENTRY_MAGIC: &[u8; 4] = b"SWY\0";

/// Current entry format version.
const ENTRY_VERSION: u8 = 1;

/// Extension of entry files.
const ENTRY_EXT: &str = "entry";

/// Bytes of framing around the payload: magic, version, length and CRC.
const FRAME_OVERHEAD: u64 = 4 + 1 + 8 + 4;

/// Name of the advisory lock file held while mutating.
const LOCK_FILE: &str = "LOCK";

/// Storage that persists entries as files in a directory.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) storage rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Directory holding the entries.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.path
            .join(format!("{}.{}", hex::encode(key.as_bytes()), ENTRY_EXT))
    }

    /// Hold an exclusive lock for the duration of one mutation. The lock is
    /// released when the returned file is dropped.
    fn lock(&self) -> Result<File, StorageError> {
        let lock_file = File::create(self.path.join(LOCK_FILE))?;
        FileExt::lock_exclusive(&lock_file)?;
        Ok(lock_file)
    }

    fn decode_frame(mut file: File) -> Result<Vec<u8>, StorageError> {
        let file_len = file.metadata()?.len();

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != ENTRY_MAGIC {
            return Err(StorageError::Corruption("invalid entry magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != ENTRY_VERSION {
            return Err(StorageError::Corruption(format!(
                "unsupported entry version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);
        if len > file_len.saturating_sub(FRAME_OVERHEAD) {
            return Err(StorageError::Corruption(format!(
                "entry length {len} exceeds file size {file_len}"
            )));
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&payload);
        if stored != computed {
            return Err(StorageError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        Ok(payload)
    }
}

impl StorageBackend for FileStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let entry_path = self.entry_path(key);
        if !entry_path.exists() {
            return Ok(None);
        }

        let file = File::open(&entry_path)?;
        match Self::decode_frame(file) {
            Ok(payload) => Ok(Some(payload)),
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(
                StorageError::Corruption(format!("truncated entry for {key}")),
            ),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let _lock = self.lock()?;

        // Write to a sibling temp file, then rename over the entry.
        let entry_path = self.entry_path(key);
        let tmp_path = entry_path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(ENTRY_MAGIC)?;
            file.write_all(&[ENTRY_VERSION])?;
            file.write_all(&(bytes.len() as u64).to_le_bytes())?;
            file.write_all(bytes)?;
            file.write_all(&crc32fast::hash(bytes).to_le_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &entry_path)?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _lock = self.lock()?;

        let entry_path = self.entry_path(key);
        if entry_path.exists() {
            fs::remove_file(&entry_path)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let Some(stem) = file_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Foreign files that are not hex-named keys are skipped.
            if let Some(key) = hex::decode(stem)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            {
                keys.push(key);
            }
        }

        Ok(keys)
    }
}
