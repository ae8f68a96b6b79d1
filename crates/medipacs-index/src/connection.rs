//! 索引数据库连接管理
//!
//! 嵌入式SQLite，单连接池：索引本身由门面锁串行化，多连接只会带来
//! `database is locked`和内存库丢失的问题。

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use tracing::info;

use medipacs_core::{GlobalPropertyKey, PacsError, Result};

use crate::schema::SchemaTransaction;

/// 当前数据库结构版本，写入全局属性并在每次打开时校验
const SCHEMA_VERSION: &str = "1";

const SCHEMA_DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS global_properties (
        property INTEGER PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resources (
        internal_id INTEGER PRIMARY KEY AUTOINCREMENT,
        public_id TEXT UNIQUE NOT NULL,
        resource_level INTEGER NOT NULL,
        parent_id INTEGER REFERENCES resources(internal_id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS main_dicom_tags (
        internal_id INTEGER NOT NULL REFERENCES resources(internal_id) ON DELETE CASCADE,
        tag TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (internal_id, tag)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metadata (
        internal_id INTEGER NOT NULL REFERENCES resources(internal_id) ON DELETE CASCADE,
        kind INTEGER NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (internal_id, kind)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attached_files (
        internal_id INTEGER NOT NULL REFERENCES resources(internal_id) ON DELETE CASCADE,
        content_kind INTEGER NOT NULL,
        uuid TEXT NOT NULL,
        compressed_size INTEGER NOT NULL,
        uncompressed_size INTEGER NOT NULL,
        PRIMARY KEY (internal_id, content_kind)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS changes (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        change_kind INTEGER NOT NULL,
        internal_id INTEGER NOT NULL REFERENCES resources(internal_id) ON DELETE CASCADE,
        resource_level INTEGER NOT NULL,
        date TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS exported_resources (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        resource_level INTEGER NOT NULL,
        public_id TEXT NOT NULL,
        remote_modality TEXT NOT NULL,
        patient_id TEXT NOT NULL,
        study_instance_uid TEXT NOT NULL,
        series_instance_uid TEXT NOT NULL,
        sop_instance_uid TEXT NOT NULL,
        date TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_resources_parent_id ON resources(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_resources_level ON resources(resource_level)",
    "CREATE INDEX IF NOT EXISTS idx_changes_internal_id ON changes(internal_id)",
];

/// 索引数据库
pub struct IndexDatabase {
    pool: Pool<Sqlite>,
}

impl IndexDatabase {
    /// 在指定目录下打开（或创建）`index`数据库文件
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let file = dir.join("index");

        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite:{}?mode=rwc",
            file.display()
        ))
        .map_err(|e| PacsError::Storage(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

        Self::connect(options).await
    }

    /// 打开非持久化内存库，供测试使用
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| PacsError::Storage(e.to_string()))?
            .foreign_keys(true);

        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // 单连接并禁用回收：池中唯一的连接就是数据库本体
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| PacsError::Storage(e.to_string()))?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// 建表并校验结构版本
    async fn initialize(&self) -> Result<()> {
        for ddl in SCHEMA_DDL {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| PacsError::Storage(e.to_string()))?;
        }

        let mut tx = self.transaction().await?;
        match tx
            .get_global_property(GlobalPropertyKey::DatabaseSchemaVersion)
            .await?
        {
            None => {
                tx.set_global_property(GlobalPropertyKey::DatabaseSchemaVersion, SCHEMA_VERSION)
                    .await?;
                info!("Index database initialized (schema version {})", SCHEMA_VERSION);
            }
            Some(version) if version == SCHEMA_VERSION => {}
            Some(version) => {
                return Err(PacsError::Storage(format!(
                    "数据库结构版本不兼容: 期望{}，实际{}",
                    SCHEMA_VERSION, version
                )));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// 开启一个新事务
    pub async fn transaction(&self) -> Result<SchemaTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PacsError::Storage(e.to_string()))?;
        Ok(SchemaTransaction::new(tx))
    }

    /// 把WAL中缓冲的写入落盘
    pub async fn flush_to_disk(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(|e| PacsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_index_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = IndexDatabase::open(dir.path()).await.unwrap();
        assert!(dir.path().join("index").exists());
        db.close().await;
    }

    #[tokio::test]
    async fn test_schema_version_written_once() {
        let db = IndexDatabase::in_memory().await.unwrap();
        let mut tx = db.transaction().await.unwrap();
        let version = tx
            .get_global_property(GlobalPropertyKey::DatabaseSchemaVersion)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(version.as_deref(), Some(SCHEMA_VERSION));
        db.close().await;
    }

    #[tokio::test]
    async fn test_flush_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = IndexDatabase::open(dir.path()).await.unwrap();
        db.flush_to_disk().await.unwrap();
        db.close().await;
    }
}
