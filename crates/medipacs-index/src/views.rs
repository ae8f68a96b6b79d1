//! 对外响应结构
//!
//! REST层直接把这些结构序列化成JSON，字段名是稳定的线上契约，
//! 不可改动。字节计数以十进制字符串输出，可能超出32位范围。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use medipacs_core::{ResourceLevel, SeriesStatus, Statistics};

const MEGA_BYTE: u64 = 1024 * 1024;

fn u64_as_string<S>(value: &u64, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&value.to_string())
}

fn u64_from_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    text.parse::<u64>().map_err(serde::de::Error::custom)
}

/// 资源查询结果，按层级取不同的形态
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceView {
    Patient(PatientView),
    Study(StudyView),
    Series(SeriesView),
    Instance(InstanceView),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientView {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Type")]
    pub level: ResourceLevel,
    #[serde(rename = "Studies")]
    pub studies: Vec<String>,
    #[serde(rename = "MainDicomTags")]
    pub main_dicom_tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyView {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Type")]
    pub level: ResourceLevel,
    #[serde(rename = "ParentPatient")]
    pub parent_patient: String,
    #[serde(rename = "Series")]
    pub series: Vec<String>,
    #[serde(rename = "MainDicomTags")]
    pub main_dicom_tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesView {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Type")]
    pub level: ResourceLevel,
    #[serde(rename = "ParentStudy")]
    pub parent_study: String,
    #[serde(rename = "Instances")]
    pub instances: Vec<String>,
    #[serde(rename = "Status")]
    pub status: SeriesStatus,
    #[serde(rename = "ExpectedNumberOfInstances")]
    pub expected_number_of_instances: Option<i64>,
    #[serde(rename = "MainDicomTags")]
    pub main_dicom_tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceView {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Type")]
    pub level: ResourceLevel,
    #[serde(rename = "ParentSeries")]
    pub parent_series: String,
    #[serde(rename = "FileSize")]
    pub file_size: u64,
    #[serde(rename = "FileUuid")]
    pub file_uuid: Uuid,
    #[serde(rename = "IndexInSeries")]
    pub index_in_series: Option<i64>,
    #[serde(rename = "MainDicomTags")]
    pub main_dicom_tags: BTreeMap<String, String>,
}

/// 级联删除后幸存的最近祖先
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingAncestor {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Type")]
    pub level: ResourceLevel,
    #[serde(rename = "ID")]
    pub id: String,
}

impl RemainingAncestor {
    pub fn new(level: ResourceLevel, public_id: String) -> Self {
        Self {
            path: level.base_path(&public_id),
            level,
            id: public_id,
        }
    }
}

/// 删除操作的应答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    #[serde(rename = "RemainingAncestor")]
    pub remaining_ancestor: Option<RemainingAncestor>,
}

/// 统计应答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsView {
    #[serde(
        rename = "TotalDiskSize",
        serialize_with = "u64_as_string",
        deserialize_with = "u64_from_string"
    )]
    pub total_disk_size: u64,
    #[serde(
        rename = "TotalUncompressedSize",
        serialize_with = "u64_as_string",
        deserialize_with = "u64_from_string"
    )]
    pub total_uncompressed_size: u64,
    #[serde(rename = "TotalDiskSizeMB")]
    pub total_disk_size_mb: u64,
    #[serde(rename = "TotalUncompressedSizeMB")]
    pub total_uncompressed_size_mb: u64,
    #[serde(rename = "CountPatients")]
    pub count_patients: u64,
    #[serde(rename = "CountStudies")]
    pub count_studies: u64,
    #[serde(rename = "CountSeries")]
    pub count_series: u64,
    #[serde(rename = "CountInstances")]
    pub count_instances: u64,
}

impl From<Statistics> for StatisticsView {
    fn from(stats: Statistics) -> Self {
        Self {
            total_disk_size: stats.total_disk_size,
            total_uncompressed_size: stats.total_uncompressed_size,
            total_disk_size_mb: stats.total_disk_size / MEGA_BYTE,
            total_uncompressed_size_mb: stats.total_uncompressed_size / MEGA_BYTE,
            count_patients: stats.count_patients,
            count_studies: stats.count_studies,
            count_series: stats.count_series,
            count_instances: stats.count_instances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_view_wire_fields() {
        let view = ResourceView::Series(SeriesView {
            id: "se".to_string(),
            level: ResourceLevel::Series,
            parent_study: "stu".to_string(),
            instances: vec!["i1".to_string()],
            status: SeriesStatus::Missing,
            expected_number_of_instances: Some(3),
            main_dicom_tags: BTreeMap::new(),
        });

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["ID"], "se");
        assert_eq!(json["Type"], "Series");
        assert_eq!(json["ParentStudy"], "stu");
        assert_eq!(json["Instances"][0], "i1");
        assert_eq!(json["Status"], "Missing");
        assert_eq!(json["ExpectedNumberOfInstances"], 3);
    }

    #[test]
    fn test_instance_view_wire_fields() {
        let uuid = Uuid::new_v4();
        let view = InstanceView {
            id: "ins".to_string(),
            level: ResourceLevel::Instance,
            parent_series: "se".to_string(),
            file_size: 42,
            file_uuid: uuid,
            index_in_series: None,
            main_dicom_tags: BTreeMap::new(),
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["FileSize"], 42);
        assert_eq!(json["FileUuid"], uuid.to_string());
        assert!(json["IndexInSeries"].is_null());
    }

    #[test]
    fn test_deletion_report_null_ancestor() {
        let report = DeletionReport {
            remaining_ancestor: None,
        };
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"RemainingAncestor":null}"#
        );

        let report = DeletionReport {
            remaining_ancestor: Some(RemainingAncestor::new(
                ResourceLevel::Study,
                "stu".to_string(),
            )),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["RemainingAncestor"]["Path"], "/studies/stu");
        assert_eq!(json["RemainingAncestor"]["Type"], "Study");
        assert_eq!(json["RemainingAncestor"]["ID"], "stu");
    }

    #[test]
    fn test_statistics_sizes_as_strings() {
        let stats = Statistics {
            total_disk_size: 5 * MEGA_BYTE + 1,
            total_uncompressed_size: u64::MAX,
            count_patients: 1,
            count_studies: 2,
            count_series: 3,
            count_instances: 4,
        };
        let json = serde_json::to_value(StatisticsView::from(stats)).unwrap();
        assert_eq!(json["TotalDiskSize"], (5 * MEGA_BYTE + 1).to_string());
        assert_eq!(json["TotalUncompressedSize"], u64::MAX.to_string());
        assert_eq!(json["TotalDiskSizeMB"], 5);
        assert_eq!(json["CountInstances"], 4);
    }
}
