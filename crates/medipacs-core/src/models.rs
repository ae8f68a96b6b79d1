//! 核心数据模型定义
//!
//! 资源层级、状态枚举、附件与日志事件。枚举的整数编码会持久化到
//! 索引数据库中，已分配的编码不可再改动。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PacsError, Result};

/// 资源层级：Patient → Study → Series → Instance 四级结构
///
/// 编码按层级递增，Patient最小，比较运算直接沿用编码顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceLevel {
    Patient,
    Study,
    Series,
    Instance,
}

impl ResourceLevel {
    pub fn as_code(&self) -> i64 {
        match self {
            ResourceLevel::Patient => 1,
            ResourceLevel::Study => 2,
            ResourceLevel::Series => 3,
            ResourceLevel::Instance => 4,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(ResourceLevel::Patient),
            2 => Ok(ResourceLevel::Study),
            3 => Ok(ResourceLevel::Series),
            4 => Ok(ResourceLevel::Instance),
            _ => Err(PacsError::Internal(format!("未知的资源层级编码: {}", code))),
        }
    }

    /// REST资源路径前缀
    pub fn uri_segment(&self) -> &'static str {
        match self {
            ResourceLevel::Patient => "patients",
            ResourceLevel::Study => "studies",
            ResourceLevel::Series => "series",
            ResourceLevel::Instance => "instances",
        }
    }

    /// 资源的REST基础路径，例如`/studies/<id>`
    pub fn base_path(&self, public_id: &str) -> String {
        format!("/{}/{}", self.uri_segment(), public_id)
    }
}

/// 系列完整度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesStatus {
    Complete,
    Missing,
    Inconsistent,
    Unknown,
}

/// 入库操作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Success,
    AlreadyStored,
    Failure,
}

/// 附件内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Dicom,
    DicomAsJson,
}

impl ContentKind {
    pub fn as_code(&self) -> i64 {
        match self {
            ContentKind::Dicom => 1,
            ContentKind::DicomAsJson => 2,
        }
    }
}

/// 资源元数据键，封闭集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataKind {
    InstanceIndexInSeries,
    InstanceReceptionDate,
    InstanceRemoteAet,
    SeriesExpectedNumberOfInstances,
    ModifiedFrom,
    AnonymizedFrom,
}

impl MetadataKind {
    pub fn as_code(&self) -> i64 {
        match self {
            MetadataKind::InstanceIndexInSeries => 1,
            MetadataKind::InstanceReceptionDate => 2,
            MetadataKind::InstanceRemoteAet => 3,
            MetadataKind::SeriesExpectedNumberOfInstances => 4,
            MetadataKind::ModifiedFrom => 5,
            MetadataKind::AnonymizedFrom => 6,
        }
    }
}

/// 进程级全局属性键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalPropertyKey {
    DatabaseSchemaVersion,
    FlushSleep,
    AnonymizationSequence,
    ModificationSequence,
}

impl GlobalPropertyKey {
    pub fn as_code(&self) -> i64 {
        match self {
            GlobalPropertyKey::DatabaseSchemaVersion => 1,
            GlobalPropertyKey::FlushSleep => 2,
            GlobalPropertyKey::AnonymizationSequence => 3,
            GlobalPropertyKey::ModificationSequence => 4,
        }
    }
}

/// 变更事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    CompletedSeries,
    ModifiedInstance,
    ModifiedSeries,
    ModifiedStudy,
    ModifiedPatient,
}

impl ChangeKind {
    pub fn as_code(&self) -> i64 {
        match self {
            ChangeKind::CompletedSeries => 1,
            ChangeKind::ModifiedInstance => 2,
            ChangeKind::ModifiedSeries => 3,
            ChangeKind::ModifiedStudy => 4,
            ChangeKind::ModifiedPatient => 5,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(ChangeKind::CompletedSeries),
            2 => Ok(ChangeKind::ModifiedInstance),
            3 => Ok(ChangeKind::ModifiedSeries),
            4 => Ok(ChangeKind::ModifiedStudy),
            5 => Ok(ChangeKind::ModifiedPatient),
            _ => Err(PacsError::Internal(format!("未知的变更类型编码: {}", code))),
        }
    }
}

/// 外部blob附件引用
///
/// uuid指向blob存储中的文件字节，压缩/未压缩大小用于统计聚合。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: ContentKind,
    pub uuid: Uuid,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl Attachment {
    pub fn new(kind: ContentKind, uuid: Uuid, compressed_size: u64, uncompressed_size: u64) -> Self {
        Self {
            kind,
            uuid,
            compressed_size,
            uncompressed_size,
        }
    }
}

/// 变更日志条目，seq严格递增
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "Seq")]
    pub seq: i64,
    #[serde(rename = "ChangeType")]
    pub kind: ChangeKind,
    #[serde(rename = "ResourceType")]
    pub level: ResourceLevel,
    #[serde(rename = "ID")]
    pub public_id: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Date")]
    pub date: String,
}

/// 导出日志条目，seq严格递增
///
/// 四个DICOM标识在导出时沿祖先链收集，层级高于被导出资源的字段留空。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedEvent {
    #[serde(rename = "Seq")]
    pub seq: i64,
    #[serde(rename = "ResourceType")]
    pub level: ResourceLevel,
    #[serde(rename = "ID")]
    pub public_id: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "RemoteModality")]
    pub remote_modality: String,
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: String,
    #[serde(rename = "SeriesInstanceUID")]
    pub series_instance_uid: String,
    #[serde(rename = "SOPInstanceUID")]
    pub sop_instance_uid: String,
    #[serde(rename = "Date")]
    pub date: String,
}

/// 索引整体统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    pub total_disk_size: u64,
    pub total_uncompressed_size: u64,
    pub count_patients: u64,
    pub count_studies: u64,
    pub count_series: u64,
    pub count_instances: u64,
}
