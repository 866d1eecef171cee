//! Durable blob ownership + location records (`blobs` table).

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};

use crate::db::models::{BlobRecord, StorageLocation};
use crate::db::{self, DbError, DbPool};

const BLOB_COLUMNS: &str =
    "id, owner_id, logical_name, declared_size, location_kind, location_key, created_at";

#[derive(Clone)]
pub struct MetadataRegistry {
    db: DbPool,
}

impl MetadataRegistry {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn insert(&self, record: &BlobRecord) -> Result<(), DbError> {
        let conn = db::lock(&self.db)?;
        conn.execute(
            "INSERT INTO blobs (id, owner_id, logical_name, declared_size, location_kind, location_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.id,
                record.owner_id,
                record.logical_name,
                record.declared_size as i64,
                record.location.kind(),
                record.location.key(),
                record.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn find(&self, id: &str) -> Result<Option<BlobRecord>, DbError> {
        let conn = db::lock(&self.db)?;
        let sql = format!("SELECT {BLOB_COLUMNS} FROM blobs WHERE id = ?1");
        let row = conn.query_row(&sql, [id], RawBlob::from_row).optional()?;
        row.map(RawBlob::into_record).transpose()
    }

    /// All records owned by `owner_id`, newest first. Ties on `created_at`
    /// fall back to the (time-ordered) id.
    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<BlobRecord>, DbError> {
        let conn = db::lock(&self.db)?;
        let sql = format!(
            "SELECT {BLOB_COLUMNS} FROM blobs WHERE owner_id = ?1 ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([owner_id], RawBlob::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawBlob::into_record).collect()
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool, DbError> {
        let conn = db::lock(&self.db)?;
        let removed = conn.execute("DELETE FROM blobs WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }
}

/// Row as stored, before the location columns are validated.
struct RawBlob {
    id: String,
    owner_id: String,
    logical_name: String,
    declared_size: i64,
    location_kind: String,
    location_key: String,
    created_at: DateTime<Utc>,
}

impl RawBlob {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            logical_name: row.get(2)?,
            declared_size: row.get(3)?,
            location_kind: row.get(4)?,
            location_key: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<BlobRecord, DbError> {
        let location = StorageLocation::from_columns(&self.location_kind, self.location_key)
            .ok_or_else(|| {
                DbError::Corrupt(format!(
                    "blob {} has unknown location kind {:?}",
                    self.id, self.location_kind
                ))
            })?;
        let declared_size = u64::try_from(self.declared_size)
            .map_err(|_| DbError::Corrupt(format!("blob {} has negative size", self.id)))?;

        Ok(BlobRecord {
            id: self.id,
            owner_id: self.owner_id,
            logical_name: self.logical_name,
            declared_size,
            location,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::CredentialStore;
    use chrono::Duration;

    fn setup() -> (MetadataRegistry, String, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db = db::init_db(tmp.path().to_str().unwrap()).unwrap();
        let owner = CredentialStore::new(db.clone())
            .create("owner@x.com", "Owner", "hash", Utc::now())
            .unwrap();
        (MetadataRegistry::new(db), owner.id, tmp)
    }

    fn record(id: &str, owner: &str, created_at: DateTime<Utc>, location: StorageLocation) -> BlobRecord {
        BlobRecord {
            id: id.into(),
            owner_id: owner.into(),
            logical_name: format!("{id}.pdf"),
            declared_size: 42,
            location,
            created_at,
        }
    }

    #[test]
    fn test_insert_find_preserves_location() {
        let (registry, owner, _tmp) = setup();
        let rec = record("b1", &owner, Utc::now(), StorageLocation::Local("k1.enc".into()));
        registry.insert(&rec).unwrap();

        let found = registry.find("b1").unwrap().unwrap();
        assert_eq!(found.location, StorageLocation::Local("k1.enc".into()));
        assert_eq!(found.owner_id, owner);
        assert_eq!(found.declared_size, 42);
        assert!(registry.find("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_is_newest_first_and_scoped_to_owner() {
        let (registry, owner, _tmp) = setup();
        let t0 = Utc::now();
        registry
            .insert(&record("old", &owner, t0, StorageLocation::Remote("a.enc".into())))
            .unwrap();
        registry
            .insert(&record("new", &owner, t0 + Duration::seconds(5), StorageLocation::Remote("b.enc".into())))
            .unwrap();

        let ids: Vec<_> = registry
            .list_by_owner(&owner)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert!(registry.list_by_owner("someone-else").unwrap().is_empty());
    }

    #[test]
    fn test_insert_for_unknown_owner_fails() {
        let (registry, _owner, _tmp) = setup();
        let rec = record("b1", "ghost", Utc::now(), StorageLocation::Remote("k.enc".into()));
        assert!(matches!(registry.insert(&rec), Err(DbError::Sqlite(_))));
    }

    #[test]
    fn test_delete_reports_whether_removed() {
        let (registry, owner, _tmp) = setup();
        registry
            .insert(&record("b1", &owner, Utc::now(), StorageLocation::Remote("k.enc".into())))
            .unwrap();
        assert!(registry.delete("b1").unwrap());
        assert!(!registry.delete("b1").unwrap());
    }
}
