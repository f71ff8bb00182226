//! Content-addressed blob storage for raw document text
//!
//! BLAKE3-addressed with zstd compression above a size threshold. Raw text is
//! retained so `reindex` can rebuild the corpus from source after a chunking
//! or embedding configuration change.

use crate::error::{RagnarError, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Content-addressed blob storage
pub struct BlobStore {
    base_path: PathBuf,
    compression_threshold: usize,
}

impl BlobStore {
    /// Create a blob store rooted at `base_path`
    pub fn new(base_path: PathBuf, compression_threshold: usize) -> Result<Self> {
        let blobs_dir = base_path.join("blobs");
        fs::create_dir_all(&blobs_dir).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to create blobs directory: {}", blobs_dir.display()),
        })?;

        Ok(Self {
            base_path,
            compression_threshold,
        })
    }

    /// Write data, returning (hash, was_new). Identical content deduplicates.
    pub fn write(&self, data: &[u8]) -> Result<(String, bool)> {
        let hash = hash_data(data);

        let blob_path = self.blob_path(&hash);
        if blob_path.exists() {
            return Ok((hash, false));
        }

        let parent = blob_path
            .parent()
            .ok_or_else(|| RagnarError::Config("Invalid blob path".to_string()))?;
        fs::create_dir_all(parent).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to create blob directory: {}", parent.display()),
        })?;

        // Write to a temp file first so readers never see a partial blob
        let temp_path = blob_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to create temp blob file: {}", temp_path.display()),
        })?;

        if data.len() >= self.compression_threshold {
            let compressed = zstd::encode_all(data, 3).map_err(|e| RagnarError::Io {
                source: e,
                context: "Failed to compress blob data".to_string(),
            })?;
            file.write_all(&compressed)
        } else {
            file.write_all(data)
        }
        .map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to write blob: {}", temp_path.display()),
        })?;

        file.sync_all().map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to sync blob file: {}", temp_path.display()),
        })?;
        drop(file);

        fs::rename(&temp_path, &blob_path).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to finalize blob: {}", blob_path.display()),
        })?;

        Ok((hash, true))
    }

    /// Read a blob back, transparently decompressing
    pub fn read(&self, hash: &str) -> Result<Vec<u8>> {
        let blob_path = self.blob_path(hash);

        if !blob_path.exists() {
            return Err(RagnarError::Config(format!("Blob not found: {}", hash)));
        }

        let data = fs::read(&blob_path).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to read blob: {}", blob_path.display()),
        })?;

        match zstd::decode_all(&data[..]) {
            Ok(decompressed) => Ok(decompressed),
            Err(_) => Ok(data), // stored uncompressed
        }
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.blob_path(hash).exists()
    }

    /// Two-level sharding: blobs/ab/cd/abcdef...
    fn blob_path(&self, hash: &str) -> PathBuf {
        self.base_path
            .join("blobs")
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(hash)
    }
}

/// Truncated BLAKE3 hex digest (32 chars / 16 bytes)
fn hash_data(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("{:.32}", hash.to_hex())
}
