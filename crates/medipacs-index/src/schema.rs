//! 索引数据库的事务级操作
//!
//! 门面的每个操作都对应一个`SchemaTransaction`：提交即生效，
//! 提前drop即回滚。所有SQL都在这里，其他模块不直接接触引擎。

use std::collections::BTreeMap;

use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use medipacs_core::{
    utils, Attachment, ChangeEvent, ChangeKind, ContentKind, ExportedEvent, GlobalPropertyKey,
    MetadataKind, PacsError, ResourceLevel, Result,
};

use crate::models::ResourceRow;

/// 单个索引事务
pub struct SchemaTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl SchemaTransaction {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    /// 提交事务；不调用则在drop时回滚
    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| PacsError::Storage(e.to_string()))
    }

    // ========== 资源 ==========

    /// 创建资源并返回内部ID
    pub async fn create_resource(&mut self, public_id: &str, level: ResourceLevel) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO resources (public_id, resource_level, parent_id) VALUES (?, ?, NULL)",
        )
        .bind(public_id)
        .bind(level.as_code())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// 按公共ID查找资源
    pub async fn lookup_resource(
        &mut self,
        public_id: &str,
    ) -> Result<Option<(i64, ResourceLevel)>> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT internal_id, resource_level FROM resources WHERE public_id = ?",
        )
        .bind(public_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        match row {
            Some((id, code)) => Ok(Some((id, ResourceLevel::from_code(code)?))),
            None => Ok(None),
        }
    }

    /// 按内部ID读取资源行，行不存在视为不变式被破坏
    pub async fn resource_by_internal_id(&mut self, internal_id: i64) -> Result<ResourceRow> {
        let row = sqlx::query_as::<_, (i64, String, i64, Option<i64>)>(
            "SELECT internal_id, public_id, resource_level, parent_id FROM resources WHERE internal_id = ?",
        )
        .bind(internal_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?
        .ok_or_else(|| PacsError::Internal(format!("资源不存在: {}", internal_id)))?;

        Ok(ResourceRow {
            internal_id: row.0,
            public_id: row.1,
            level: ResourceLevel::from_code(row.2)?,
            parent_id: row.3,
        })
    }

    /// 把child挂到parent下
    pub async fn attach_child(&mut self, parent: i64, child: i64) -> Result<()> {
        sqlx::query("UPDATE resources SET parent_id = ? WHERE internal_id = ?")
            .bind(parent)
            .bind(child)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| PacsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// 父资源的内部ID，Patient层返回None
    pub async fn parent_of(&mut self, internal_id: i64) -> Result<Option<i64>> {
        let row = sqlx::query_as::<_, (Option<i64>,)>(
            "SELECT parent_id FROM resources WHERE internal_id = ?",
        )
        .bind(internal_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?
        .ok_or_else(|| PacsError::Internal(format!("资源不存在: {}", internal_id)))?;

        Ok(row.0)
    }

    /// 删除单个资源行；外键级联会带走其子树及标签、元数据、附件和变更记录
    pub async fn delete_resource_row(&mut self, internal_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM resources WHERE internal_id = ?")
            .bind(internal_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| PacsError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn children_public_ids(&mut self, internal_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT public_id FROM resources WHERE parent_id = ? ORDER BY internal_id",
        )
        .bind(internal_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn count_children(&mut self, internal_id: i64) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM resources WHERE parent_id = ?",
        )
        .bind(internal_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(count as u64)
    }

    /// 子树内全部Instance层资源的公共ID
    pub async fn descendant_instance_public_ids(&mut self, internal_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT ?1
                UNION ALL
                SELECT r.internal_id FROM resources r JOIN subtree s ON r.parent_id = s.id
            )
            SELECT r.public_id FROM resources r
            JOIN subtree s ON r.internal_id = s.id
            WHERE r.resource_level = ?2
            ORDER BY r.internal_id
            "#,
        )
        .bind(internal_id)
        .bind(ResourceLevel::Instance.as_code())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn get_all_public_ids(&mut self, level: ResourceLevel) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT public_id FROM resources WHERE resource_level = ? ORDER BY internal_id",
        )
        .bind(level.as_code())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn resource_count(&mut self, level: ResourceLevel) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM resources WHERE resource_level = ?",
        )
        .bind(level.as_code())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(count as u64)
    }

    // ========== 主标签 ==========

    /// 固化资源的主标签，仅在创建时调用一次
    pub async fn set_main_dicom_tags(
        &mut self,
        internal_id: i64,
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        for (tag, value) in tags {
            sqlx::query("INSERT INTO main_dicom_tags (internal_id, tag, value) VALUES (?, ?, ?)")
                .bind(internal_id)
                .bind(tag)
                .bind(value)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| PacsError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn get_main_dicom_tags(
        &mut self,
        internal_id: i64,
    ) -> Result<BTreeMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT tag, value FROM main_dicom_tags WHERE internal_id = ?",
        )
        .bind(internal_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(rows.into_iter().collect())
    }

    // ========== 元数据 ==========

    /// 写入元数据，同键后写覆盖先写
    pub async fn set_metadata(
        &mut self,
        internal_id: i64,
        kind: MetadataKind,
        value: &str,
    ) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (internal_id, kind, value) VALUES (?, ?, ?)")
            .bind(internal_id)
            .bind(kind.as_code())
            .bind(value)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| PacsError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn get_metadata(
        &mut self,
        internal_id: i64,
        kind: MetadataKind,
    ) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT value FROM metadata WHERE internal_id = ? AND kind = ?",
        )
        .bind(internal_id)
        .bind(kind.as_code())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(row.map(|r| r.0))
    }

    /// 元数据按十进制整数解析，缺失或无法解析都返回None
    pub async fn get_metadata_as_integer(
        &mut self,
        internal_id: i64,
        kind: MetadataKind,
    ) -> Result<Option<i64>> {
        Ok(self
            .get_metadata(internal_id, kind)
            .await?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    /// 系列每个子实例的IndexInSeries元数据，缺失的子实例对应None
    pub async fn child_index_metadata(&mut self, series_id: i64) -> Result<Vec<Option<String>>> {
        let rows = sqlx::query_as::<_, (Option<String>,)>(
            r#"
            SELECT m.value FROM resources r
            LEFT JOIN metadata m
                ON m.internal_id = r.internal_id AND m.kind = ?1
            WHERE r.parent_id = ?2
            ORDER BY r.internal_id
            "#,
        )
        .bind(MetadataKind::InstanceIndexInSeries.as_code())
        .bind(series_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    // ========== 附件 ==========

    pub async fn add_attachment(&mut self, internal_id: i64, attachment: &Attachment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attached_files
                (internal_id, content_kind, uuid, compressed_size, uncompressed_size)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(internal_id)
        .bind(attachment.kind.as_code())
        .bind(attachment.uuid.to_string())
        .bind(attachment.compressed_size as i64)
        .bind(attachment.uncompressed_size as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn lookup_attachment(
        &mut self,
        internal_id: i64,
        kind: ContentKind,
    ) -> Result<Option<Attachment>> {
        let row = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT uuid, compressed_size, uncompressed_size
            FROM attached_files WHERE internal_id = ? AND content_kind = ?
            "#,
        )
        .bind(internal_id)
        .bind(kind.as_code())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        match row {
            Some((uuid, compressed, uncompressed)) => Ok(Some(Attachment::new(
                kind,
                parse_uuid(&uuid)?,
                compressed as u64,
                uncompressed as u64,
            ))),
            None => Ok(None),
        }
    }

    /// 单个资源自身的附件UUID
    pub async fn attachment_uuids_of(&mut self, internal_id: i64) -> Result<Vec<Uuid>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT uuid FROM attached_files WHERE internal_id = ? ORDER BY content_kind",
        )
        .bind(internal_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        rows.iter().map(|r| parse_uuid(&r.0)).collect()
    }

    /// 子树内全部附件UUID，按发现顺序（内部ID递增）排列
    pub async fn attachment_uuids_in_subtree(&mut self, internal_id: i64) -> Result<Vec<Uuid>> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT ?1
                UNION ALL
                SELECT r.internal_id FROM resources r JOIN subtree s ON r.parent_id = s.id
            )
            SELECT a.uuid FROM attached_files a
            JOIN subtree s ON a.internal_id = s.id
            ORDER BY a.internal_id, a.content_kind
            "#,
        )
        .bind(internal_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        rows.iter().map(|r| parse_uuid(&r.0)).collect()
    }

    // ========== 变更日志 ==========

    pub async fn log_change(
        &mut self,
        kind: ChangeKind,
        internal_id: i64,
        level: ResourceLevel,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO changes (change_kind, internal_id, resource_level, date) VALUES (?, ?, ?, ?)",
        )
        .bind(kind.as_code())
        .bind(internal_id)
        .bind(level.as_code())
        .bind(utils::now_iso_string())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// seq大于since的变更，升序，最多max条；bool表示是否已读到末尾
    pub async fn get_changes(&mut self, since: i64, max: u32) -> Result<(Vec<ChangeEvent>, bool)> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, String, String)>(
            r#"
            SELECT c.seq, c.change_kind, c.resource_level, r.public_id, c.date
            FROM changes c
            JOIN resources r ON r.internal_id = c.internal_id
            WHERE c.seq > ?
            ORDER BY c.seq
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(max as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        let events = rows
            .into_iter()
            .map(change_event_from_row)
            .collect::<Result<Vec<_>>>()?;

        let max_seq = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(seq) FROM changes")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| PacsError::Storage(e.to_string()))?;

        let done = match events.last() {
            None => true,
            Some(last) => max_seq.map_or(true, |m| last.seq >= m),
        };

        Ok((events, done))
    }

    pub async fn get_last_change(&mut self) -> Result<Option<ChangeEvent>> {
        let row = sqlx::query_as::<_, (i64, i64, i64, String, String)>(
            r#"
            SELECT c.seq, c.change_kind, c.resource_level, r.public_id, c.date
            FROM changes c
            JOIN resources r ON r.internal_id = c.internal_id
            ORDER BY c.seq DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        row.map(change_event_from_row).transpose()
    }

    // ========== 导出日志 ==========

    #[allow(clippy::too_many_arguments)]
    pub async fn log_exported(
        &mut self,
        level: ResourceLevel,
        public_id: &str,
        remote_modality: &str,
        patient_id: &str,
        study_instance_uid: &str,
        series_instance_uid: &str,
        sop_instance_uid: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO exported_resources
                (resource_level, public_id, remote_modality, patient_id,
                 study_instance_uid, series_instance_uid, sop_instance_uid, date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(level.as_code())
        .bind(public_id)
        .bind(remote_modality)
        .bind(patient_id)
        .bind(study_instance_uid)
        .bind(series_instance_uid)
        .bind(sop_instance_uid)
        .bind(utils::now_iso_string())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn get_exported_resources(
        &mut self,
        since: i64,
        max: u32,
    ) -> Result<(Vec<ExportedEvent>, bool)> {
        let rows = sqlx::query_as::<_, ExportedRow>(
            r#"
            SELECT seq, resource_level, public_id, remote_modality, patient_id,
                   study_instance_uid, series_instance_uid, sop_instance_uid, date
            FROM exported_resources
            WHERE seq > ?
            ORDER BY seq
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(max as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        let events = rows
            .into_iter()
            .map(exported_event_from_row)
            .collect::<Result<Vec<_>>>()?;

        let max_seq =
            sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(seq) FROM exported_resources")
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| PacsError::Storage(e.to_string()))?;

        let done = match events.last() {
            None => true,
            Some(last) => max_seq.map_or(true, |m| last.seq >= m),
        };

        Ok((events, done))
    }

    pub async fn get_last_exported_resource(&mut self) -> Result<Option<ExportedEvent>> {
        let row = sqlx::query_as::<_, ExportedRow>(
            r#"
            SELECT seq, resource_level, public_id, remote_modality, patient_id,
                   study_instance_uid, series_instance_uid, sop_instance_uid, date
            FROM exported_resources
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        row.map(exported_event_from_row).transpose()
    }

    // ========== 全局属性 ==========

    pub async fn get_global_property(&mut self, key: GlobalPropertyKey) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT value FROM global_properties WHERE property = ?",
        )
        .bind(key.as_code())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(row.map(|r| r.0))
    }

    pub async fn set_global_property(&mut self, key: GlobalPropertyKey, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO global_properties (property, value) VALUES (?, ?)")
            .bind(key.as_code())
            .bind(value)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| PacsError::Storage(e.to_string()))?;
        Ok(())
    }

    // ========== 统计聚合 ==========

    pub async fn total_compressed_size(&mut self) -> Result<u64> {
        let sum = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(compressed_size), 0) FROM attached_files",
        )
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(sum as u64)
    }

    pub async fn total_uncompressed_size(&mut self) -> Result<u64> {
        let sum = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(uncompressed_size), 0) FROM attached_files",
        )
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| PacsError::Storage(e.to_string()))?;

        Ok(sum as u64)
    }
}

type ExportedRow = (i64, i64, String, String, String, String, String, String, String);

fn change_event_from_row(row: (i64, i64, i64, String, String)) -> Result<ChangeEvent> {
    let (seq, kind, level, public_id, date) = row;
    let level = ResourceLevel::from_code(level)?;
    Ok(ChangeEvent {
        seq,
        kind: ChangeKind::from_code(kind)?,
        level,
        path: level.base_path(&public_id),
        public_id,
        date,
    })
}

fn exported_event_from_row(row: ExportedRow) -> Result<ExportedEvent> {
    let (seq, level, public_id, remote_modality, patient_id, study_uid, series_uid, sop_uid, date) =
        row;
    let level = ResourceLevel::from_code(level)?;
    Ok(ExportedEvent {
        seq,
        level,
        path: level.base_path(&public_id),
        public_id,
        remote_modality,
        patient_id,
        study_instance_uid: study_uid,
        series_instance_uid: series_uid,
        sop_instance_uid: sop_uid,
        date,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| PacsError::Internal(format!("附件UUID损坏: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::IndexDatabase;

    #[tokio::test]
    async fn test_resource_roundtrip() {
        let db = IndexDatabase::in_memory().await.unwrap();
        let mut tx = db.transaction().await.unwrap();

        let patient = tx.create_resource("pat", ResourceLevel::Patient).await.unwrap();
        let study = tx.create_resource("stu", ResourceLevel::Study).await.unwrap();
        tx.attach_child(patient, study).await.unwrap();

        assert_eq!(
            tx.lookup_resource("stu").await.unwrap(),
            Some((study, ResourceLevel::Study))
        );
        assert_eq!(tx.parent_of(study).await.unwrap(), Some(patient));
        assert_eq!(tx.parent_of(patient).await.unwrap(), None);
        assert_eq!(tx.children_public_ids(patient).await.unwrap(), vec!["stu"]);
        assert_eq!(tx.count_children(patient).await.unwrap(), 1);
        assert_eq!(tx.lookup_resource("missing").await.unwrap(), None);

        tx.commit().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_metadata_last_write_wins() {
        let db = IndexDatabase::in_memory().await.unwrap();
        let mut tx = db.transaction().await.unwrap();

        let id = tx.create_resource("res", ResourceLevel::Instance).await.unwrap();
        tx.set_metadata(id, MetadataKind::InstanceRemoteAet, "AET1")
            .await
            .unwrap();
        tx.set_metadata(id, MetadataKind::InstanceRemoteAet, "AET2")
            .await
            .unwrap();

        assert_eq!(
            tx.get_metadata(id, MetadataKind::InstanceRemoteAet)
                .await
                .unwrap()
                .as_deref(),
            Some("AET2")
        );
        assert_eq!(
            tx.get_metadata(id, MetadataKind::ModifiedFrom).await.unwrap(),
            None
        );
        tx.commit().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_metadata_as_integer() {
        let db = IndexDatabase::in_memory().await.unwrap();
        let mut tx = db.transaction().await.unwrap();

        let id = tx.create_resource("res", ResourceLevel::Series).await.unwrap();
        tx.set_metadata(id, MetadataKind::SeriesExpectedNumberOfInstances, "12")
            .await
            .unwrap();
        assert_eq!(
            tx.get_metadata_as_integer(id, MetadataKind::SeriesExpectedNumberOfInstances)
                .await
                .unwrap(),
            Some(12)
        );

        tx.set_metadata(id, MetadataKind::SeriesExpectedNumberOfInstances, "abc")
            .await
            .unwrap();
        assert_eq!(
            tx.get_metadata_as_integer(id, MetadataKind::SeriesExpectedNumberOfInstances)
                .await
                .unwrap(),
            None
        );
        tx.commit().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_change_pagination_and_done_flag() {
        let db = IndexDatabase::in_memory().await.unwrap();
        let mut tx = db.transaction().await.unwrap();

        let series = tx.create_resource("se", ResourceLevel::Series).await.unwrap();
        for _ in 0..3 {
            tx.log_change(ChangeKind::CompletedSeries, series, ResourceLevel::Series)
                .await
                .unwrap();
        }

        let (page, done) = tx.get_changes(0, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(!done);
        assert!(page[0].seq < page[1].seq);

        let (rest, done) = tx.get_changes(page[1].seq, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(done);
        assert_eq!(rest[0].path, "/series/se");

        let last = tx.get_last_change().await.unwrap().unwrap();
        assert_eq!(last.seq, rest[0].seq);

        let (none, done) = tx.get_changes(last.seq, 10).await.unwrap();
        assert!(none.is_empty());
        assert!(done);
        tx.commit().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_subtree_attachment_enumeration() {
        let db = IndexDatabase::in_memory().await.unwrap();
        let mut tx = db.transaction().await.unwrap();

        let series = tx.create_resource("se", ResourceLevel::Series).await.unwrap();
        let a = tx.create_resource("i1", ResourceLevel::Instance).await.unwrap();
        let b = tx.create_resource("i2", ResourceLevel::Instance).await.unwrap();
        tx.attach_child(series, a).await.unwrap();
        tx.attach_child(series, b).await.unwrap();

        let ua = Uuid::new_v4();
        let ub = Uuid::new_v4();
        tx.add_attachment(a, &Attachment::new(ContentKind::Dicom, ua, 10, 20))
            .await
            .unwrap();
        tx.add_attachment(b, &Attachment::new(ContentKind::Dicom, ub, 30, 40))
            .await
            .unwrap();

        assert_eq!(
            tx.attachment_uuids_in_subtree(series).await.unwrap(),
            vec![ua, ub]
        );
        assert_eq!(tx.attachment_uuids_of(series).await.unwrap(), Vec::<Uuid>::new());
        assert_eq!(tx.total_compressed_size().await.unwrap(), 40);
        assert_eq!(tx.total_uncompressed_size().await.unwrap(), 60);
        tx.commit().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_global_properties() {
        let db = IndexDatabase::in_memory().await.unwrap();
        let mut tx = db.transaction().await.unwrap();

        assert_eq!(
            tx.get_global_property(GlobalPropertyKey::FlushSleep).await.unwrap(),
            None
        );
        tx.set_global_property(GlobalPropertyKey::FlushSleep, "30")
            .await
            .unwrap();
        tx.set_global_property(GlobalPropertyKey::FlushSleep, "60")
            .await
            .unwrap();
        assert_eq!(
            tx.get_global_property(GlobalPropertyKey::FlushSleep)
                .await
                .unwrap()
                .as_deref(),
            Some("60")
        );
        tx.commit().await.unwrap();
        db.close().await;
    }
}
