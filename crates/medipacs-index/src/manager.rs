//! 索引门面
//!
//! 所有公开操作先取同一把互斥锁，再开一个事务执行，锁保持到操作
//! 结束，因此事件序列与操作顺序一致。后台落盘任务以`FlushSleep`
//! 秒为周期拿锁做WAL检查点，`shutdown`会通知它退出并等待汇合。

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use medipacs_core::{
    utils, Attachment, ChangeEvent, ChangeKind, ContentKind, ExportedEvent, GlobalPropertyKey,
    MetadataKind, PacsError, ResourceLevel, Result, SeriesStatus, Statistics, StoreStatus,
};
use medipacs_dicom::{tags, DicomSummary, InstanceHasher};

use crate::completeness::evaluate_series_status;
use crate::connection::IndexDatabase;
use crate::schema::SchemaTransaction;
use crate::views::{
    DeletionReport, InstanceView, PatientView, RemainingAncestor, ResourceView, SeriesView,
    StudyView,
};
use crate::walker::{DeletionSink, DeletionWalker};

/// `FlushSleep`全局属性缺失或无法解析时的落盘周期（秒）
const DEFAULT_FLUSH_SLEEP_SECS: u64 = 10;

/// 服务端索引门面
pub struct IndexManager {
    db: Arc<Mutex<IndexDatabase>>,
    sink: Arc<dyn DeletionSink>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl IndexManager {
    /// 打开索引并启动落盘任务
    ///
    /// `":memory:"`选择非持久化内存库，其余值按目录处理，数据库文件
    /// 位于`<path>/index`。
    pub async fn open(path: &str, sink: Arc<dyn DeletionSink>) -> Result<Self> {
        let db = if path == ":memory:" {
            IndexDatabase::in_memory().await?
        } else {
            IndexDatabase::open(Path::new(path)).await?
        };

        let flush_sleep = {
            let mut tx = db.transaction().await?;
            let value = tx.get_global_property(GlobalPropertyKey::FlushSleep).await?;
            tx.commit().await?;
            value
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_FLUSH_SLEEP_SECS)
        };

        let db = Arc::new(Mutex::new(db));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let flusher = tokio::spawn(flush_loop(
            Arc::clone(&db),
            shutdown_rx,
            Duration::from_secs(flush_sleep),
        ));

        Ok(Self {
            db,
            sink,
            closed: AtomicBool::new(false),
            shutdown_tx,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// 停止落盘任务、做最后一次检查点并关闭存储
    ///
    /// 之后的任何操作都返回`BadSequenceOfCalls`。未调用本方法就drop
    /// 门面时，watch发送端随之销毁，落盘任务会在下次唤醒时退出。
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(PacsError::BadSequenceOfCalls("索引已关闭".to_string()));
        }

        info!("Stopping the index flushing task");
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.flusher.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("落盘任务退出异常: {}", e);
            }
        }

        let db = self.db.lock().await;
        db.flush_to_disk().await?;
        db.close().await;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PacsError::BadSequenceOfCalls("索引已关闭".to_string()));
        }
        Ok(())
    }

    // ========== 入库 ==========

    /// 实例入库；域内错误一律回滚并折叠为`Failure`
    pub async fn store(
        &self,
        summary: &DicomSummary,
        attachments: &[Attachment],
        remote_aet: &str,
    ) -> StoreStatus {
        match self.try_store(summary, attachments, remote_aet).await {
            Ok(status) => status,
            Err(e) => {
                error!("实例入库失败: {}", e);
                StoreStatus::Failure
            }
        }
    }

    async fn try_store(
        &self,
        summary: &DicomSummary,
        attachments: &[Attachment],
        remote_aet: &str,
    ) -> Result<StoreStatus> {
        self.ensure_open()?;

        let hasher = InstanceHasher::from_summary(summary)?;
        if !attachments.iter().any(|a| a.kind == ContentKind::Dicom) {
            return Err(PacsError::BadRequest("入库请求缺少Dicom附件".to_string()));
        }

        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;

        // 实例已存在则什么都不提交
        if let Some((_, level)) = tx.lookup_resource(&hasher.hash_instance()).await? {
            if level != ResourceLevel::Instance {
                return Err(PacsError::Internal("实例公共ID与既有资源层级冲突".to_string()));
            }
            return Ok(StoreStatus::AlreadyStored);
        }

        let instance = tx
            .create_resource(&hasher.hash_instance(), ResourceLevel::Instance)
            .await?;
        tx.set_main_dicom_tags(instance, &summary.extract_instance_information())
            .await?;

        // 自下而上补齐缺失的祖先，挂接点是最低的既有祖先
        let mut is_new_series = false;
        let series = match tx.lookup_resource(&hasher.hash_series()).await? {
            Some((series, level)) => {
                if level != ResourceLevel::Series {
                    return Err(PacsError::Internal("系列公共ID与既有资源层级冲突".to_string()));
                }
                tx.attach_child(series, instance).await?;
                series
            }
            None => {
                is_new_series = true;
                let series = tx
                    .create_resource(&hasher.hash_series(), ResourceLevel::Series)
                    .await?;
                tx.set_main_dicom_tags(series, &summary.extract_series_information())
                    .await?;
                tx.attach_child(series, instance).await?;

                match tx.lookup_resource(&hasher.hash_study()).await? {
                    Some((study, level)) => {
                        if level != ResourceLevel::Study {
                            return Err(PacsError::Internal(
                                "检查公共ID与既有资源层级冲突".to_string(),
                            ));
                        }
                        tx.attach_child(study, series).await?;
                    }
                    None => {
                        let study = tx
                            .create_resource(&hasher.hash_study(), ResourceLevel::Study)
                            .await?;
                        tx.set_main_dicom_tags(study, &summary.extract_study_information())
                            .await?;
                        tx.attach_child(study, series).await?;

                        match tx.lookup_resource(&hasher.hash_patient()).await? {
                            Some((patient, level)) => {
                                if level != ResourceLevel::Patient {
                                    return Err(PacsError::Internal(
                                        "患者公共ID与既有资源层级冲突".to_string(),
                                    ));
                                }
                                tx.attach_child(patient, study).await?;
                            }
                            None => {
                                let patient = tx
                                    .create_resource(&hasher.hash_patient(), ResourceLevel::Patient)
                                    .await?;
                                tx.set_main_dicom_tags(
                                    patient,
                                    &summary.extract_patient_information(),
                                )
                                .await?;
                                tx.attach_child(patient, study).await?;
                            }
                        }
                    }
                }
                series
            }
        };

        for attachment in attachments {
            tx.add_attachment(instance, attachment).await?;
        }

        tx.set_metadata(
            instance,
            MetadataKind::InstanceReceptionDate,
            &utils::now_iso_string(),
        )
        .await?;
        tx.set_metadata(instance, MetadataKind::InstanceRemoteAet, remote_aet)
            .await?;

        if let Some(index) = summary
            .value(tags::INSTANCE_NUMBER)
            .or_else(|| summary.value(tags::IMAGE_INDEX))
        {
            tx.set_metadata(instance, MetadataKind::InstanceIndexInSeries, index)
                .await?;
        }

        // 期望数量只在系列创建时确定一次，后续实例不再覆盖
        if is_new_series {
            if let Some(expected) = summary
                .value(tags::NUMBER_OF_SLICES)
                .or_else(|| summary.value(tags::IMAGES_IN_ACQUISITION))
                .or_else(|| summary.value(tags::CARDIAC_NUMBER_OF_IMAGES))
            {
                tx.set_metadata(
                    series,
                    MetadataKind::SeriesExpectedNumberOfInstances,
                    expected,
                )
                .await?;
            }
        }

        // 本次入库使系列转为完整时记录变更
        if evaluate_series_status(&mut tx, series).await? == SeriesStatus::Complete {
            tx.log_change(ChangeKind::CompletedSeries, series, ResourceLevel::Series)
                .await?;
        }

        tx.commit().await?;
        Ok(StoreStatus::Success)
    }

    // ========== 删除 ==========

    /// 级联删除；资源不存在或层级不符返回None
    ///
    /// blob删除通知在事务提交成功之后、本方法返回之前逐个发出。
    pub async fn delete_resource(
        &self,
        public_id: &str,
        expected_level: ResourceLevel,
    ) -> Result<Option<DeletionReport>> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;

        let Some((id, level)) = tx.lookup_resource(public_id).await? else {
            return Ok(None);
        };
        if level != expected_level {
            return Ok(None);
        }

        let mut walker = DeletionWalker::new();
        walker.remove(&mut tx, id).await?;
        tx.commit().await?;

        let (files, remaining) = walker.into_outcome();
        for uuid in files {
            self.sink.remove_blob(uuid);
        }

        Ok(Some(DeletionReport {
            remaining_ancestor: remaining
                .map(|(level, public_id)| RemainingAncestor::new(level, public_id)),
        }))
    }

    // ========== 查询 ==========

    /// 资源视图；资源不存在或层级不符返回None
    pub async fn lookup_resource(
        &self,
        public_id: &str,
        expected_level: ResourceLevel,
    ) -> Result<Option<ResourceView>> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;

        let Some((id, level)) = tx.lookup_resource(public_id).await? else {
            return Ok(None);
        };
        if level != expected_level {
            return Ok(None);
        }

        let main_dicom_tags = tx.get_main_dicom_tags(id).await?;

        let view = match level {
            ResourceLevel::Patient => ResourceView::Patient(PatientView {
                id: public_id.to_string(),
                level,
                studies: tx.children_public_ids(id).await?,
                main_dicom_tags,
            }),
            ResourceLevel::Study => ResourceView::Study(StudyView {
                id: public_id.to_string(),
                level,
                parent_patient: parent_public_id(&mut tx, id).await?,
                series: tx.children_public_ids(id).await?,
                main_dicom_tags,
            }),
            ResourceLevel::Series => ResourceView::Series(SeriesView {
                id: public_id.to_string(),
                level,
                parent_study: parent_public_id(&mut tx, id).await?,
                instances: tx.children_public_ids(id).await?,
                status: evaluate_series_status(&mut tx, id).await?,
                expected_number_of_instances: tx
                    .get_metadata_as_integer(id, MetadataKind::SeriesExpectedNumberOfInstances)
                    .await?,
                main_dicom_tags,
            }),
            ResourceLevel::Instance => {
                let attachment = tx
                    .lookup_attachment(id, ContentKind::Dicom)
                    .await?
                    .ok_or_else(|| {
                        PacsError::Internal(format!("实例缺少Dicom附件: {}", public_id))
                    })?;
                ResourceView::Instance(InstanceView {
                    id: public_id.to_string(),
                    level,
                    parent_series: parent_public_id(&mut tx, id).await?,
                    file_size: attachment.uncompressed_size,
                    file_uuid: attachment.uuid,
                    index_in_series: tx
                        .get_metadata_as_integer(id, MetadataKind::InstanceIndexInSeries)
                        .await?,
                    main_dicom_tags,
                })
            }
        };

        tx.commit().await?;
        Ok(Some(view))
    }

    /// 实例附件；目标不存在或不是实例层都是不变式问题
    pub async fn lookup_attachment(
        &self,
        instance_public_id: &str,
        kind: ContentKind,
    ) -> Result<Option<Attachment>> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;

        match tx.lookup_resource(instance_public_id).await? {
            Some((id, ResourceLevel::Instance)) => {
                let attachment = tx.lookup_attachment(id, kind).await?;
                tx.commit().await?;
                Ok(attachment)
            }
            _ => Err(PacsError::Internal(format!(
                "附件查询的目标不是实例: {}",
                instance_public_id
            ))),
        }
    }

    pub async fn get_all_public_ids(&self, level: ResourceLevel) -> Result<Vec<String>> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;
        let ids = tx.get_all_public_ids(level).await?;
        tx.commit().await?;
        Ok(ids)
    }

    /// 子树内全部实例的公共ID，修改/匿名化流水线按它展开资源
    pub async fn get_child_instances(&self, public_id: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;
        let (id, _) = tx
            .lookup_resource(public_id)
            .await?
            .ok_or_else(|| PacsError::BadRequest(format!("资源不存在: {}", public_id)))?;
        let instances = tx.descendant_instance_public_ids(id).await?;
        tx.commit().await?;
        Ok(instances)
    }

    // ========== 元数据 ==========

    /// 写资源元数据，修改/匿名化流水线用它记录来源
    pub async fn set_metadata(
        &self,
        public_id: &str,
        kind: MetadataKind,
        value: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;
        let (id, _) = tx
            .lookup_resource(public_id)
            .await?
            .ok_or_else(|| PacsError::BadRequest(format!("资源不存在: {}", public_id)))?;
        tx.set_metadata(id, kind, value).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn lookup_metadata(
        &self,
        public_id: &str,
        kind: MetadataKind,
    ) -> Result<Option<String>> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;
        let (id, _) = tx
            .lookup_resource(public_id)
            .await?
            .ok_or_else(|| PacsError::BadRequest(format!("资源不存在: {}", public_id)))?;
        let value = tx.get_metadata(id, kind).await?;
        tx.commit().await?;
        Ok(value)
    }

    // ========== 变更日志 ==========

    /// 代外部修改引擎追加一条变更
    pub async fn log_change(&self, kind: ChangeKind, public_id: &str) -> Result<()> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;
        let (id, level) = tx
            .lookup_resource(public_id)
            .await?
            .ok_or_else(|| PacsError::BadRequest(format!("资源不存在: {}", public_id)))?;
        tx.log_change(kind, id, level).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_changes(
        &self,
        since: i64,
        max_results: u32,
    ) -> Result<(Vec<ChangeEvent>, bool)> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;
        let page = tx.get_changes(since, max_results).await?;
        tx.commit().await?;
        Ok(page)
    }

    pub async fn get_last_change(&self) -> Result<Option<ChangeEvent>> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;
        let last = tx.get_last_change().await?;
        tx.commit().await?;
        Ok(last)
    }

    // ========== 导出日志 ==========

    /// 沿祖先链收集四个DICOM标识后追加一条导出记录
    pub async fn log_exported_resource(
        &self,
        public_id: &str,
        remote_modality: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;

        let (id, level) = tx
            .lookup_resource(public_id)
            .await?
            .ok_or_else(|| PacsError::Internal(format!("导出的资源不存在: {}", public_id)))?;

        let mut patient_id = String::new();
        let mut study_uid = String::new();
        let mut series_uid = String::new();
        let mut sop_uid = String::new();

        let mut current_id = id;
        let mut current_level = level;
        loop {
            let main_tags = tx.get_main_dicom_tags(current_id).await?;
            let take = |tag: &str| -> Result<String> {
                main_tags.get(tag).cloned().ok_or_else(|| {
                    PacsError::Internal(format!("资源缺少主标签{}: {}", tag, public_id))
                })
            };

            match current_level {
                ResourceLevel::Patient => {
                    patient_id = take(tags::PATIENT_ID)?;
                    break;
                }
                ResourceLevel::Study => {
                    study_uid = take(tags::STUDY_INSTANCE_UID)?;
                    current_level = ResourceLevel::Patient;
                }
                ResourceLevel::Series => {
                    series_uid = take(tags::SERIES_INSTANCE_UID)?;
                    current_level = ResourceLevel::Study;
                }
                ResourceLevel::Instance => {
                    sop_uid = take(tags::SOP_INSTANCE_UID)?;
                    current_level = ResourceLevel::Series;
                }
            }

            current_id = tx
                .parent_of(current_id)
                .await?
                .ok_or_else(|| PacsError::Internal(format!("资源缺少父级: {}", public_id)))?;
        }

        tx.log_exported(
            level,
            public_id,
            remote_modality,
            &patient_id,
            &study_uid,
            &series_uid,
            &sop_uid,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_exported_resources(
        &self,
        since: i64,
        max_results: u32,
    ) -> Result<(Vec<ExportedEvent>, bool)> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;
        let page = tx.get_exported_resources(since, max_results).await?;
        tx.commit().await?;
        Ok(page)
    }

    pub async fn get_last_exported_resource(&self) -> Result<Option<ExportedEvent>> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;
        let last = tx.get_last_exported_resource().await?;
        tx.commit().await?;
        Ok(last)
    }

    // ========== 统计与序列 ==========

    pub async fn compute_statistics(&self) -> Result<Statistics> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;

        let stats = Statistics {
            total_disk_size: tx.total_compressed_size().await?,
            total_uncompressed_size: tx.total_uncompressed_size().await?,
            count_patients: tx.resource_count(ResourceLevel::Patient).await?,
            count_studies: tx.resource_count(ResourceLevel::Study).await?,
            count_series: tx.resource_count(ResourceLevel::Series).await?,
            count_instances: tx.resource_count(ResourceLevel::Instance).await?,
        };
        tx.commit().await?;
        Ok(stats)
    }

    /// 全局序列的事务性自增，缺失时从1起
    pub async fn increment_global_sequence(&self, key: GlobalPropertyKey) -> Result<u64> {
        self.ensure_open()?;
        let db = self.db.lock().await;
        let mut tx = db.transaction().await?;

        let next = match tx.get_global_property(key).await? {
            None => 1,
            Some(text) => {
                text.parse::<u64>()
                    .map_err(|_| PacsError::Internal(format!("全局序列值损坏: {}", text)))?
                    + 1
            }
        };
        tx.set_global_property(key, &next.to_string()).await?;
        tx.commit().await?;
        Ok(next)
    }
}

/// 非Patient资源必有父级，缺失说明层级不变式被破坏
async fn parent_public_id(tx: &mut SchemaTransaction, internal_id: i64) -> Result<String> {
    let parent = tx
        .parent_of(internal_id)
        .await?
        .ok_or_else(|| PacsError::Internal(format!("资源缺少父级: {}", internal_id)))?;
    Ok(tx.resource_by_internal_id(parent).await?.public_id)
}

async fn flush_loop(
    db: Arc<Mutex<IndexDatabase>>,
    mut shutdown: watch::Receiver<bool>,
    period: Duration,
) {
    info!("Starting the index flushing task (sleep = {:?})", period);
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                let db = db.lock().await;
                if let Err(e) = db.flush_to_disk().await {
                    warn!("索引落盘失败: {}", e);
                }
            }
            // 收到关闭信号或发送端被drop都退出
            _ = shutdown.changed() => break,
        }
    }
    info!("Index flushing task stopped");
}
