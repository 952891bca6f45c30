//! Snapshot storage.
//!
//! [`WorksheetStore`] is the contract the coordinator talks to. [`FileStore`]
//! keeps one gzip-compressed bincode archive per record and worksheet, holding
//! the rolling autosave slot and every explicitly saved version.

use async_trait::async_trait;
use bincode::{deserialize_from, serialize_into};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Result, WorksheetError};
use crate::extract::FieldMap;
use crate::worksheet::WorksheetKind;

/// One explicitly saved version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub id: String,
    pub version_number: u32,
    pub title: String,
    pub created_date: DateTime<Utc>,
    pub created_by: String,
}

#[async_trait]
pub trait WorksheetStore: Send + Sync {
    /// Newest snapshot of the record, autosave or saved version.
    async fn load_latest(&self, kind: WorksheetKind, record_id: &str) -> Result<Option<String>>;

    async fn load_version(
        &self,
        kind: WorksheetKind,
        record_id: &str,
        version_id: &str,
    ) -> Result<Option<String>>;

    /// Stores a new numbered version.
    async fn save(&self, kind: WorksheetKind, record_id: &str, blob: &str) -> Result<VersionInfo>;

    /// Overwrites the single autosave slot.
    async fn autosave(&self, kind: WorksheetKind, record_id: &str, blob: &str) -> Result<()>;

    /// Saved versions, newest first.
    async fn list_versions(&self, kind: WorksheetKind, record_id: &str)
    -> Result<Vec<VersionInfo>>;

    async fn next_version_number(&self, kind: WorksheetKind, record_id: &str) -> Result<u32>;

    /// Merges extracted fields into the external record.
    async fn update_external_record(&self, record_id: &str, fields: &FieldMap) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredBlob {
    blob: String,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVersion {
    info: VersionInfo,
    blob: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Archive {
    autosave: Option<StoredBlob>,
    versions: Vec<StoredVersion>,
    next_number: u32,
}

impl Archive {
    fn next_number(&self) -> u32 {
        self.next_number.max(1)
    }
}

fn write_archive(path: &Path, archive: &Archive) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);
    serialize_into(&mut writer, archive)?;
    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?;
    Ok(())
}

fn read_archive(path: &Path) -> Result<Archive> {
    if !path.exists() {
        return Ok(Archive::default());
    }
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = BufReader::new(decoder);
    Ok(deserialize_from(&mut reader)?)
}

/// Record ids become directory names, so only a safe alphabet is accepted.
fn checked_record_id(record_id: &str) -> Result<&str> {
    let valid = !record_id.is_empty()
        && record_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(record_id)
    } else {
        Err(WorksheetError::Store(format!("invalid record id '{}'", record_id)))
    }
}

/// Directory-backed store.
pub struct FileStore {
    root: PathBuf,
    user: String,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            user: "system".to_string(),
            lock: Mutex::new(()),
        }
    }

    /// Name recorded as `createdBy` on saved versions.
    pub fn with_user(mut self, user: &str) -> Self {
        self.user = user.to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn archive_path(&self, kind: WorksheetKind, record_id: &str) -> Result<PathBuf> {
        let record_id = checked_record_id(record_id)?;
        Ok(self
            .root
            .join(record_id)
            .join(format!("{}.bin.gz", kind.slug())))
    }

    fn record_path(&self, record_id: &str) -> Result<PathBuf> {
        let record_id = checked_record_id(record_id)?;
        Ok(self.root.join(record_id).join("record.json"))
    }

    /// Fields written so far by [`WorksheetStore::update_external_record`].
    pub fn external_record(&self, record_id: &str) -> Result<FieldMap> {
        read_record(&self.record_path(record_id)?)
    }
}

fn read_record(path: &Path) -> Result<FieldMap> {
    if !path.exists() {
        return Ok(FieldMap::new());
    }
    let value: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(match value {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

/// Runs file and codec work on the blocking pool so archive reads and writes
/// never stall the runtime.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| WorksheetError::Store(format!("archive task failed: {}", e)))?
}

fn newest_blob(archive: Archive) -> Option<String> {
    let Archive {
        autosave, versions, ..
    } = archive;
    let newest_version = versions.into_iter().max_by_key(|v| v.info.created_date);
    match (autosave, newest_version) {
        (Some(a), Some(v)) => Some(if a.saved_at >= v.info.created_date {
            a.blob
        } else {
            v.blob
        }),
        (Some(a), None) => Some(a.blob),
        (None, v) => v.map(|v| v.blob),
    }
}

#[async_trait]
impl WorksheetStore for FileStore {
    async fn load_latest(&self, kind: WorksheetKind, record_id: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let path = self.archive_path(kind, record_id)?;
        let latest = blocking(move || read_archive(&path).map(newest_blob)).await?;
        debug!(
            "load_latest {} {}: {}",
            kind,
            record_id,
            if latest.is_some() { "found" } else { "empty" }
        );
        Ok(latest)
    }

    async fn load_version(
        &self,
        kind: WorksheetKind,
        record_id: &str,
        version_id: &str,
    ) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let path = self.archive_path(kind, record_id)?;
        let archive = blocking(move || read_archive(&path)).await?;
        Ok(archive
            .versions
            .into_iter()
            .find(|v| v.info.id == version_id)
            .map(|v| v.blob))
    }

    async fn save(&self, kind: WorksheetKind, record_id: &str, blob: &str) -> Result<VersionInfo> {
        let _guard = self.lock.lock().await;
        let path = self.archive_path(kind, record_id)?;
        let (user, blob) = (self.user.clone(), blob.to_string());

        let info = blocking(move || {
            let mut archive = read_archive(&path)?;
            let number = archive.next_number();
            let info = VersionInfo {
                id: Uuid::new_v4().to_string(),
                version_number: number,
                title: kind.title().to_string(),
                created_date: Utc::now(),
                created_by: user,
            };
            archive.versions.push(StoredVersion {
                info: info.clone(),
                blob,
            });
            archive.next_number = number + 1;
            write_archive(&path, &archive)?;
            Ok(info)
        })
        .await?;

        info!(
            "saved {} version {} for {}",
            kind, info.version_number, record_id
        );
        Ok(info)
    }

    async fn autosave(&self, kind: WorksheetKind, record_id: &str, blob: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.archive_path(kind, record_id)?;
        let blob = blob.to_string();
        blocking(move || {
            let mut archive = read_archive(&path)?;
            archive.autosave = Some(StoredBlob {
                blob,
                saved_at: Utc::now(),
            });
            write_archive(&path, &archive)
        })
        .await?;
        debug!("{} written for {}", kind.autosave_title(), record_id);
        Ok(())
    }

    async fn list_versions(
        &self,
        kind: WorksheetKind,
        record_id: &str,
    ) -> Result<Vec<VersionInfo>> {
        let _guard = self.lock.lock().await;
        let path = self.archive_path(kind, record_id)?;
        let archive = blocking(move || read_archive(&path)).await?;
        let mut versions: Vec<VersionInfo> =
            archive.versions.into_iter().map(|v| v.info).collect();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    async fn next_version_number(&self, kind: WorksheetKind, record_id: &str) -> Result<u32> {
        let _guard = self.lock.lock().await;
        let path = self.archive_path(kind, record_id)?;
        let archive = blocking(move || read_archive(&path)).await?;
        Ok(archive.next_number())
    }

    async fn update_external_record(&self, record_id: &str, fields: &FieldMap) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.record_path(record_id)?;
        let fields_written = fields.len();
        let fields = fields.clone();
        blocking(move || {
            let mut record = read_record(&path)?;
            record.extend(fields);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, serde_json::to_string_pretty(&Value::Object(record))?)?;
            Ok(())
        })
        .await?;
        info!("updated {} fields on record {}", fields_written, record_id);
        Ok(())
    }
}
