//! Snapshot persistence for the in-memory store
//!
//! ## File Format
//! ```text
//! ┌──────────┬──────────┬──────────────┬──────────┬──────────────────┐
//! │Magic (4) │Version(2)│ Payload Len  │ CRC32    │ bincode payload  │
//! │          │          │    (8)       │  (4)     │                  │
//! └──────────┴──────────┴──────────────┴──────────┴──────────────────┘
//! ```
//! The file is written next to its destination and renamed into place, so a
//! crash mid-save leaves the previous snapshot intact.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::AtomicU64;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

use super::memory::TableData;
use super::{InMemoryKeyValueService, Timestamp};

const MAGIC: &[u8; 4] = b"AMVS";
const FORMAT_VERSION: u16 = 1;
const HEADER_SIZE: usize = 4 + 2 + 8 + 4;

#[derive(Serialize, Deserialize)]
struct SnapshotPayload {
    latest_timestamp: Timestamp,
    tables: BTreeMap<String, TableData>,
}

impl InMemoryKeyValueService {
    /// Write the whole store to `path`
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let payload = {
            let tables = self.tables.read();
            bincode::serialize(&SnapshotPayload {
                latest_timestamp: self.latest_timestamp(),
                tables: tables.clone(),
            })?
        };

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("snap.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(MAGIC)?;
            file.write_all(&FORMAT_VERSION.to_le_bytes())?;
            file.write_all(&(payload.len() as u64).to_le_bytes())?;
            file.write_all(&crc.to_le_bytes())?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        tracing::debug!("Saved snapshot ({} bytes) to {}", payload.len(), path.display());
        Ok(())
    }

    /// Load a store from `path`
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE {
            return Err(AtlasError::Corruption(format!(
                "snapshot {} is truncated ({} bytes)",
                path.display(),
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(AtlasError::Corruption("bad snapshot magic".to_string()));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(AtlasError::Corruption(format!("unsupported snapshot version {}", version)));
        }

        let mut len_buf = [0u8; 8];
        len_buf.copy_from_slice(&bytes[6..14]);
        let payload_len = u64::from_le_bytes(len_buf) as usize;

        let mut crc_buf = [0u8; 4];
        crc_buf.copy_from_slice(&bytes[14..18]);
        let expected_crc = u32::from_le_bytes(crc_buf);

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != payload_len {
            return Err(AtlasError::Corruption(format!(
                "snapshot payload is {} bytes, header says {}",
                payload.len(),
                payload_len
            )));
        }
        if crc32fast::hash(payload) != expected_crc {
            return Err(AtlasError::Corruption("snapshot checksum mismatch".to_string()));
        }

        let decoded: SnapshotPayload = bincode::deserialize(payload)?;
        tracing::debug!(
            "Loaded snapshot with {} tables, latest timestamp {}",
            decoded.tables.len(),
            decoded.latest_timestamp
        );

        Ok(Self {
            tables: RwLock::new(decoded.tables),
            latest_timestamp: AtomicU64::new(decoded.latest_timestamp),
        })
    }

    /// Load `path` if it exists, otherwise start empty
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_snapshot(path)
        } else {
            Ok(Self::new())
        }
    }
}
