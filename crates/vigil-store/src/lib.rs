//! vigil-store — SQLite persistence for enrollment records.
//!
//! One row per stored sample. A record is always written as a whole
//! (delete + reinsert inside a transaction) so the on-disk sample set
//! mirrors the bounded in-memory record exactly.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vigil_core::{CoreError, DecisionPolicy, Descriptor, EnrollmentRecord, Gallery, IdentityId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS samples (
    id            TEXT PRIMARY KEY,
    identity      TEXT NOT NULL,
    position      INTEGER NOT NULL,
    quality       REAL NOT NULL,
    model_version TEXT,
    descriptor    BLOB NOT NULL,
    stored_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS samples_identity ON samples (identity, position);
";

/// Default store location: `$XDG_DATA_HOME/vigil/gallery.db`
/// (falling back to `~/.local/share`).
pub fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("vigil")
        .join("gallery.db")
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create store directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("corrupt descriptor blob for {identity}: {len} bytes is not a whole number of f32 values")]
    CorruptDescriptor { identity: String, len: usize },
    #[error("stored sample rejected: {0}")]
    Core(#[from] CoreError),
}

/// Per-identity overview for listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySummary {
    pub identity: String,
    pub samples: usize,
    pub best_quality: f32,
    pub stored_at: String,
}

/// SQLite-backed enrollment store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "enrollment store opened");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Replace everything stored for `record`'s identity with its current samples.
    pub fn save_record(&mut self, record: &EnrollmentRecord) -> Result<(), StoreError> {
        let identity = record.identity().as_str();
        let stored_at = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM samples WHERE identity = ?1", params![identity])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO samples (id, identity, position, quality, model_version, descriptor, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (position, sample) in record.samples().iter().enumerate() {
                insert.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    identity,
                    position as i64,
                    sample.quality as f64,
                    sample.descriptor.model_version,
                    encode_values(&sample.descriptor.values),
                    stored_at,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(identity, samples = record.len(), "enrollment record saved");
        Ok(())
    }

    /// Load one identity's record, if anything usable is stored for it.
    pub fn load_record(
        &self,
        identity: &IdentityId,
        policy: &DecisionPolicy,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM samples WHERE identity = ?1 LIMIT 1",
                params![identity.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut gallery = self.load_where(Some(identity.as_str()), policy)?;
        Ok(gallery.remove(identity))
    }

    /// Rebuild the whole enrolled population in stored sample order.
    ///
    /// Samples that no longer fit `policy` (wrong descriptor length, or a
    /// model version differing from the rest of their record) are skipped
    /// with a warning; an identity left without samples is not loaded.
    pub fn load_gallery(&self, policy: &DecisionPolicy) -> Result<Gallery, StoreError> {
        let gallery = self.load_where(None, policy)?;
        tracing::info!(identities = gallery.len(), "gallery loaded");
        Ok(gallery)
    }

    fn load_where(&self, identity: Option<&str>, policy: &DecisionPolicy) -> Result<Gallery, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT identity, quality, model_version, descriptor FROM samples
             WHERE ?1 IS NULL OR identity = ?1
             ORDER BY identity, position",
        )?;
        let rows = stmt.query_map(params![identity], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let capacity = policy.sample_capacity;
        let mut gallery = Gallery::new();
        let mut current: Option<EnrollmentRecord> = None;

        for row in rows {
            let (id, quality, model_version, blob) = row?;
            let values = decode_values(&id, &blob)?;
            let descriptor = Descriptor {
                values,
                model_version,
            };

            if current.as_ref().map_or(true, |r| r.identity().as_str() != id) {
                if let Some(done) = current.take().filter(|r| !r.is_empty()) {
                    gallery.insert_record(done);
                }
                current = Some(EnrollmentRecord::new(IdentityId::new(id.clone()), capacity));
            }

            if let Err(e) = descriptor.validate(policy.descriptor_len) {
                tracing::warn!(identity = %id, error = %e, "stored sample does not fit policy; skipped");
                continue;
            }
            let Some(record) = current.as_mut() else {
                continue;
            };
            match record.add_sample(descriptor, quality as f32) {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    identity = %id,
                    quality,
                    capacity,
                    "stored sample exceeds sample capacity; dropped"
                ),
                Err(e @ (CoreError::DimensionMismatch { .. } | CoreError::ModelMismatch { .. })) => {
                    tracing::warn!(identity = %id, error = %e, "stored sample incompatible with its record; skipped")
                }
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(done) = current.take().filter(|r| !r.is_empty()) {
            gallery.insert_record(done);
        }
        Ok(gallery)
    }

    /// Delete every sample of `identity`. Returns whether anything was removed.
    pub fn remove_identity(&self, identity: &IdentityId) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM samples WHERE identity = ?1", params![identity.as_str()])?;
        tracing::info!(identity = %identity, removed, "identity removed");
        Ok(removed > 0)
    }

    pub fn list_identities(&self) -> Result<Vec<IdentitySummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT identity, COUNT(*), MAX(quality), MAX(stored_at) FROM samples
             GROUP BY identity ORDER BY identity",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IdentitySummary {
                identity: row.get(0)?,
                samples: row.get::<_, i64>(1)? as usize,
                best_quality: row.get::<_, f64>(2)? as f32,
                stored_at: row.get(3)?,
            })
        })?;
        let summaries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }
}

fn encode_values(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_values(identity: &str, blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::CorruptDescriptor {
            identity: identity.to_string(),
            len: blob.len(),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
