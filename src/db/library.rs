use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use sea_query::{Asterisk, Expr, Func, OnConflict, Order, Query, SqliteQueryBuilder};
use sea_query_rusqlite::RusqliteBinder;
use webpkeep_core::{AssetId, AssetRecord, AssetRegistry, RegistryError};

use super::iden::{AssetMeta, Assets, AuditLog, LibraryConfig};
use super::schema::LIBRARY_SCHEMA;

pub struct LibraryDb {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct AuditRow {
    pub timestamp: String,
    pub operation: String,
    pub asset_id: Option<AssetId>,
    pub user: Option<String>,
    pub detail: Option<String>,
}

impl LibraryDb {
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to create library db at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .with_context(|| format!("failed to configure library db at {}", path.display()))?;
        conn.execute_batch(LIBRARY_SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("library database not found: {}", path.display());
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open library db at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .with_context(|| format!("failed to configure library db at {}", path.display()))?;
        conn.execute_batch(LIBRARY_SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let (sql, values) = Query::select()
            .column(LibraryConfig::Value)
            .from(LibraryConfig::Table)
            .and_where(Expr::col(LibraryConfig::Key).eq(key))
            .build_rusqlite(SqliteQueryBuilder);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(&*values.as_params(), |row| row.get(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(LibraryConfig::Table)
            .columns([LibraryConfig::Key, LibraryConfig::Value])
            .values_panic([key.into(), value.into()])
            .on_conflict(
                OnConflict::column(LibraryConfig::Key)
                    .update_column(LibraryConfig::Value)
                    .to_owned(),
            )
            .build_rusqlite(SqliteQueryBuilder);
        self.conn.execute(&sql, &*values.as_params())?;
        Ok(())
    }

    pub fn insert_asset(&self, file_path: &Path, mime_type: &str) -> Result<AssetId> {
        let (sql, values) = Query::insert()
            .into_table(Assets::Table)
            .columns([Assets::FilePath, Assets::MimeType, Assets::RegisteredAt])
            .values_panic([
                path_text(file_path).into(),
                mime_type.into(),
                Utc::now().to_rfc3339().into(),
            ])
            .build_rusqlite(SqliteQueryBuilder);
        self.conn
            .execute(&sql, &*values.as_params())
            .with_context(|| format!("failed to register {}", file_path.display()))?;
        Ok(AssetId(self.conn.last_insert_rowid()))
    }

    pub fn get_asset(&self, id: AssetId) -> Result<Option<AssetRecord>> {
        let (sql, values) = Query::select()
            .columns(ASSET_COLUMNS)
            .from(Assets::Table)
            .and_where(Expr::col(Assets::Id).eq(id.0))
            .build_rusqlite(SqliteQueryBuilder);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(&*values.as_params(), row_to_asset)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn get_asset_by_path(&self, file_path: &Path) -> Result<Option<AssetRecord>> {
        let (sql, values) = Query::select()
            .columns(ASSET_COLUMNS)
            .from(Assets::Table)
            .and_where(Expr::col(Assets::FilePath).eq(path_text(file_path)))
            .build_rusqlite(SqliteQueryBuilder);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(&*values.as_params(), row_to_asset)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_assets(&self, mime_filter: Option<&[&str]>) -> Result<Vec<AssetRecord>> {
        let mut query = Query::select();
        query
            .columns(ASSET_COLUMNS)
            .from(Assets::Table)
            .order_by(Assets::Id, Order::Asc);
        if let Some(mimes) = mime_filter {
            query.and_where(Expr::col(Assets::MimeType).is_in(mimes.iter().copied()));
        }
        let (sql, values) = query.build_rusqlite(SqliteQueryBuilder);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(&*values.as_params(), row_to_asset)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_asset(&self, id: AssetId, file_path: &Path, mime_type: &str) -> Result<()> {
        let (sql, values) = Query::update()
            .table(Assets::Table)
            .value(Assets::FilePath, path_text(file_path))
            .value(Assets::MimeType, mime_type)
            .and_where(Expr::col(Assets::Id).eq(id.0))
            .build_rusqlite(SqliteQueryBuilder);
        let count = self.conn.execute(&sql, &*values.as_params())?;
        if count == 0 {
            anyhow::bail!("asset {id} is not registered");
        }
        Ok(())
    }

    pub fn asset_count(&self) -> Result<i64> {
        let (sql, values) = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(Assets::Table)
            .build_rusqlite(SqliteQueryBuilder);
        Ok(self
            .conn
            .query_row(&sql, &*values.as_params(), |row| row.get(0))?)
    }

    pub fn get_meta(&self, id: AssetId, key: &str) -> Result<Option<String>> {
        let (sql, values) = Query::select()
            .column(AssetMeta::Value)
            .from(AssetMeta::Table)
            .and_where(Expr::col(AssetMeta::AssetId).eq(id.0))
            .and_where(Expr::col(AssetMeta::Key).eq(key))
            .build_rusqlite(SqliteQueryBuilder);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(&*values.as_params(), |row| row.get(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn set_meta(&self, id: AssetId, key: &str, value: &str) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(AssetMeta::Table)
            .columns([AssetMeta::AssetId, AssetMeta::Key, AssetMeta::Value])
            .values_panic([id.0.into(), key.into(), value.into()])
            .on_conflict(
                OnConflict::columns([AssetMeta::AssetId, AssetMeta::Key])
                    .update_column(AssetMeta::Value)
                    .to_owned(),
            )
            .build_rusqlite(SqliteQueryBuilder);
        self.conn
            .execute(&sql, &*values.as_params())
            .with_context(|| format!("failed to set '{key}' for asset {id}"))?;
        Ok(())
    }

    pub fn delete_meta(&self, id: AssetId, key: &str) -> Result<()> {
        let (sql, values) = Query::delete()
            .from_table(AssetMeta::Table)
            .and_where(Expr::col(AssetMeta::AssetId).eq(id.0))
            .and_where(Expr::col(AssetMeta::Key).eq(key))
            .build_rusqlite(SqliteQueryBuilder);
        self.conn.execute(&sql, &*values.as_params())?;
        Ok(())
    }

    pub fn insert_audit(
        &self,
        operation: &str,
        asset_id: Option<AssetId>,
        user: Option<&str>,
        detail: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let (sql, values) = Query::insert()
            .into_table(AuditLog::Table)
            .columns([
                AuditLog::Timestamp,
                AuditLog::Operation,
                AuditLog::AssetId,
                AuditLog::User,
                AuditLog::Detail,
            ])
            .values_panic([
                now.into(),
                operation.into(),
                asset_id.map(|id| id.0).into(),
                user.map(String::from).into(),
                detail.map(String::from).into(),
            ])
            .build_rusqlite(SqliteQueryBuilder);
        self.conn.execute(&sql, &*values.as_params())?;
        Ok(())
    }

    pub fn list_audit(&self, asset_id: Option<AssetId>) -> Result<Vec<AuditRow>> {
        let mut query = Query::select();
        query
            .columns([
                AuditLog::Timestamp,
                AuditLog::Operation,
                AuditLog::AssetId,
                AuditLog::User,
                AuditLog::Detail,
            ])
            .from(AuditLog::Table)
            .order_by(AuditLog::Id, Order::Asc);
        if let Some(id) = asset_id {
            query.and_where(Expr::col(AuditLog::AssetId).eq(id.0));
        }
        let (sql, values) = query.build_rusqlite(SqliteQueryBuilder);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(&*values.as_params(), |row| {
            Ok(AuditRow {
                timestamp: row.get(0)?,
                operation: row.get(1)?,
                asset_id: row.get::<_, Option<i64>>(2)?.map(AssetId),
                user: row.get(3)?,
                detail: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn last_audit_time(&self, operation: &str) -> Result<Option<String>> {
        let (sql, values) = Query::select()
            .column(AuditLog::Timestamp)
            .from(AuditLog::Table)
            .and_where(Expr::col(AuditLog::Operation).eq(operation))
            .order_by(AuditLog::Id, Order::Desc)
            .limit(1)
            .build_rusqlite(SqliteQueryBuilder);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(&*values.as_params(), |row| row.get(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

impl AssetRegistry for LibraryDb {
    fn get_asset_record(&self, id: AssetId) -> Result<Option<AssetRecord>, RegistryError> {
        self.get_asset(id).map_err(RegistryError::new)
    }

    fn set_asset_record(
        &self,
        id: AssetId,
        file_path: &Path,
        mime_type: &str,
    ) -> Result<(), RegistryError> {
        self.update_asset(id, file_path, mime_type)
            .map_err(RegistryError::new)
    }

    fn list_all_assets(
        &self,
        mime_filter: Option<&[&str]>,
    ) -> Result<Vec<AssetRecord>, RegistryError> {
        self.list_assets(mime_filter).map_err(RegistryError::new)
    }

    fn get_meta(&self, id: AssetId, key: &str) -> Result<Option<String>, RegistryError> {
        Self::get_meta(self, id, key).map_err(RegistryError::new)
    }

    fn set_meta(&self, id: AssetId, key: &str, value: &str) -> Result<(), RegistryError> {
        Self::set_meta(self, id, key, value).map_err(RegistryError::new)
    }

    fn delete_meta(&self, id: AssetId, key: &str) -> Result<(), RegistryError> {
        Self::delete_meta(self, id, key).map_err(RegistryError::new)
    }
}

const ASSET_COLUMNS: [Assets; 3] = [Assets::Id, Assets::FilePath, Assets::MimeType];

fn row_to_asset(row: &rusqlite::Row) -> rusqlite::Result<AssetRecord> {
    Ok(AssetRecord {
        id: AssetId(row.get(0)?),
        file_path: PathBuf::from(row.get::<_, String>(1)?),
        mime_type: row.get(2)?,
    })
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use webpkeep_core::{AssetStatus, Ledger, BACKUP_PATH_KEY};

    fn setup() -> (TempDir, LibraryDb) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join(".wpk");
        let db = LibraryDb::create(&db_path).unwrap();
        (dir, db)
    }

    #[test]
    fn create_and_open() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join(".wpk");
        LibraryDb::create(&db_path).unwrap();
        LibraryDb::open(&db_path).unwrap();
    }

    #[test]
    fn open_missing_fails() {
        let dir = TempDir::new().unwrap();
        assert!(LibraryDb::open(&dir.path().join(".wpk")).is_err());
    }

    #[test]
    fn config_crud() {
        let (_dir, db) = setup();
        assert!(db.get_config("quality").unwrap().is_none());
        db.set_config("quality", "80").unwrap();
        assert_eq!(db.get_config("quality").unwrap().unwrap(), "80");
        db.set_config("quality", "65").unwrap();
        assert_eq!(db.get_config("quality").unwrap().unwrap(), "65");
    }

    #[test]
    fn asset_crud() {
        let (_dir, db) = setup();
        let a = db.insert_asset(Path::new("/m/a.jpg"), "image/jpeg").unwrap();
        let b = db.insert_asset(Path::new("/m/b.webp"), "image/webp").unwrap();
        db.insert_asset(Path::new("/m/c.pdf"), "application/pdf")
            .unwrap();
        assert_ne!(a, b);

        let found = db.get_asset(a).unwrap().unwrap();
        assert_eq!(found.file_path, PathBuf::from("/m/a.jpg"));
        assert_eq!(
            db.get_asset_by_path(Path::new("/m/b.webp")).unwrap().unwrap().id,
            b
        );

        assert_eq!(db.list_assets(None).unwrap().len(), 3);
        let images = db
            .list_assets(Some(&["image/jpeg", "image/webp"]))
            .unwrap();
        assert_eq!(images.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);

        db.update_asset(a, Path::new("/m/a.webp"), "image/webp")
            .unwrap();
        assert_eq!(db.get_asset(a).unwrap().unwrap().mime_type, "image/webp");
        assert!(db
            .update_asset(AssetId(999), Path::new("/x"), "image/png")
            .is_err());
        assert_eq!(db.asset_count().unwrap(), 3);
    }

    #[test]
    fn duplicate_path_rejected() {
        let (_dir, db) = setup();
        db.insert_asset(Path::new("/m/a.jpg"), "image/jpeg").unwrap();
        assert!(db.insert_asset(Path::new("/m/a.jpg"), "image/jpeg").is_err());
    }

    #[test]
    fn meta_upsert_and_delete() {
        let (_dir, db) = setup();
        let a = db.insert_asset(Path::new("/m/a.jpg"), "image/jpeg").unwrap();
        db.set_meta(a, "bytes_saved", "10").unwrap();
        db.set_meta(a, "bytes_saved", "12").unwrap();
        assert_eq!(db.get_meta(a, "bytes_saved").unwrap().as_deref(), Some("12"));
        db.delete_meta(a, "bytes_saved").unwrap();
        assert!(db.get_meta(a, "bytes_saved").unwrap().is_none());
    }

    #[test]
    fn meta_for_unknown_asset_violates_foreign_key() {
        let (_dir, db) = setup();
        assert!(db.set_meta(AssetId(42), "backup_path", "/b/x.jpg").is_err());
    }

    #[test]
    fn ledger_runs_over_library_db() {
        let (dir, db) = setup();
        let path = dir.path().join("upload.webp");
        std::fs::write(&path, b"RIFF").unwrap();
        let id = db.insert_asset(&path, "image/webp").unwrap();

        let listing = Ledger::new(&db).list_assets().unwrap();
        assert_eq!(listing.other[0].status, AssetStatus::External);
        assert_eq!(
            db.get_meta(id, BACKUP_PATH_KEY).unwrap().as_deref(),
            Some("external")
        );
    }

    #[test]
    fn audit_log() {
        let (_dir, db) = setup();
        let a = db.insert_asset(Path::new("/m/a.jpg"), "image/jpeg").unwrap();
        db.insert_audit("optimize", Some(a), Some("user"), Some("ok"))
            .unwrap();
        db.insert_audit("restore", Some(a), Some("user"), None)
            .unwrap();

        let rows = db.list_audit(Some(a)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].operation, "optimize");
        assert_eq!(rows[0].detail.as_deref(), Some("ok"));
        assert!(db.last_audit_time("restore").unwrap().is_some());
        assert!(db.last_audit_time("scan").unwrap().is_none());
    }
}
