//! Append-only daily log with a per-file hash chain.
//!
//! Record layout: `u32-LE length || payload || 16-byte chain digest`,
//! where the digest is the first 16 bytes of SHA-256 over the previous
//! record's digest concatenated with this payload. The first record of
//! each file chains from sixteen zero bytes. Every write is fsynced
//! before `append` returns. A manifest records the last sealed daily
//! file and its final digest.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::PersistError;

const DIGEST_LEN: usize = 16;
const ZERO_DIGEST: [u8; DIGEST_LEN] = [0u8; DIGEST_LEN];

/// Manifest sidecar: the last sealed file and where its chain ended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub last_sealed_file: Option<String>,
    pub last_sealed_digest: Option<String>,
}

fn chain_digest(previous: &[u8; DIGEST_LEN], payload: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(previous);
    hasher.update(payload);
    let full = hasher.finalize();
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&full[..DIGEST_LEN]);
    out
}

fn file_name_for(date: NaiveDate) -> String {
    format!("{}.log", date.format("%Y-%m-%d"))
}

/// The writer half. One writer per root directory.
pub struct WalWriter {
    root: PathBuf,
    current_date: NaiveDate,
    file: File,
    last_digest: [u8; DIGEST_LEN],
}

impl WalWriter {
    /// Open (or continue) the daily file for `date` under `root`.
    pub fn open(root: impl Into<PathBuf>, date: NaiveDate) -> Result<Self, PersistError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let path = root.join(file_name_for(date));
        // Resume the chain if the file already has records.
        let last_digest = if path.exists() {
            last_digest_of(&path)?
        } else {
            ZERO_DIGEST
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            root,
            current_date: date,
            file,
            last_digest,
        })
    }

    /// Append one payload, fsync, and advance the chain. Rotates to a
    /// new daily file (sealing the old one into the manifest) when the
    /// date moves on.
    pub fn append(&mut self, payload: &[u8], today: NaiveDate) -> Result<(), PersistError> {
        if today != self.current_date {
            self.rotate(today)?;
        }

        let digest = chain_digest(&self.last_digest, payload);

        let mut record = Vec::with_capacity(4 + payload.len() + DIGEST_LEN);
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(payload);
        record.extend_from_slice(&digest);

        self.file.write_all(&record)?;
        self.file.sync_all()?;
        self.last_digest = digest;
        Ok(())
    }

    fn rotate(&mut self, today: NaiveDate) -> Result<(), PersistError> {
        let sealed_name = file_name_for(self.current_date);
        let manifest = Manifest {
            last_sealed_file: Some(sealed_name.clone()),
            last_sealed_digest: Some(hex::encode(self.last_digest)),
        };
        write_manifest(&self.root, &manifest)?;
        tracing::info!(file = %sealed_name, "daily log sealed");

        let path = self.root.join(file_name_for(today));
        self.file = OpenOptions::new().create(true).append(true).open(path)?;
        self.current_date = today;
        self.last_digest = ZERO_DIGEST;
        Ok(())
    }
}

fn manifest_path(root: &Path) -> PathBuf {
    root.join("manifest.json")
}

fn write_manifest(root: &Path, manifest: &Manifest) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| PersistError::Corrupt(format!("manifest serialise: {e}")))?;
    let mut file = File::create(manifest_path(root))?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Read the manifest, when present.
pub fn read_manifest(root: &Path) -> Result<Option<Manifest>, PersistError> {
    let path = manifest_path(root);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PersistError::Corrupt(format!("manifest parse: {e}")))
}

/// Parse every record of one file, verifying the chain as we go.
fn read_file_records(path: &Path) -> Result<Vec<Vec<u8>>, PersistError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let mut records = Vec::new();
    let mut digest = ZERO_DIGEST;
    let mut pos = 0usize;

    while pos < bytes.len() {
        if pos + 4 > bytes.len() {
            return Err(PersistError::Corrupt(format!(
                "{}: truncated length prefix at offset {pos}",
                path.display()
            )));
        }
        let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().expect("4 bytes")) as usize;
        pos += 4;

        if pos + len + DIGEST_LEN > bytes.len() {
            return Err(PersistError::Corrupt(format!(
                "{}: truncated record at offset {pos}",
                path.display()
            )));
        }
        let payload = &bytes[pos..pos + len];
        pos += len;
        let recorded: [u8; DIGEST_LEN] =
            bytes[pos..pos + DIGEST_LEN].try_into().expect("16 bytes");
        pos += DIGEST_LEN;

        let expected = chain_digest(&digest, payload);
        if recorded != expected {
            return Err(PersistError::Corrupt(format!(
                "{}: hash chain broken at offset {pos}",
                path.display()
            )));
        }

        digest = recorded;
        records.push(payload.to_vec());
    }

    Ok(records)
}

fn last_digest_of(path: &Path) -> Result<[u8; DIGEST_LEN], PersistError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() < DIGEST_LEN {
        return Ok(ZERO_DIGEST);
    }
    // Verify on resume too; a torn tail must not be silently extended.
    read_file_records(path)?;
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&bytes[bytes.len() - DIGEST_LEN..]);
    Ok(digest)
}

/// Daily files under `root` in name (= date) order.
fn log_files(root: &Path) -> Result<Vec<PathBuf>, PersistError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().map(|e| e == "log").unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}

/// Replay every record of every daily file, oldest first.
pub fn replay(root: &Path) -> Result<Vec<Vec<u8>>, PersistError> {
    let mut all = Vec::new();
    for path in log_files(root)? {
        all.extend(read_file_records(&path)?);
    }
    Ok(all)
}

/// Walk every frame of every file checking the chain. Returns the
/// total record count.
pub fn verify_all(root: &Path) -> Result<usize, PersistError> {
    let mut count = 0usize;
    for path in log_files(root)? {
        count += read_file_records(&path)?.len();
    }
    Ok(count)
}
