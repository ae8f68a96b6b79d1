//! DICOM标签摘要
//!
//! 解析器把收到的影像文件归纳成`标签名 → 字符串值`的映射后交给索引，
//! 索引不再接触原始字节。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tags;

/// 单个影像实例的标签摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicomSummary {
    values: BTreeMap<String, String>,
}

impl DicomSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个标签值，同名标签后写覆盖先写
    pub fn insert(&mut self, tag: &str, value: &str) -> &mut Self {
        self.values.insert(tag.to_string(), value.to_string());
        self
    }

    pub fn value(&self, tag: &str) -> Option<&str> {
        self.values.get(tag).map(|v| v.as_str())
    }

    pub fn has(&self, tag: &str) -> bool {
        self.values.contains_key(tag)
    }

    /// 按主标签列表取子集，缺失的标签直接跳过
    fn project(&self, main_tags: &[&str]) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for tag in main_tags {
            if let Some(value) = self.values.get(*tag) {
                out.insert((*tag).to_string(), value.clone());
            }
        }
        out
    }

    /// 患者层主标签投影
    pub fn extract_patient_information(&self) -> BTreeMap<String, String> {
        self.project(tags::PATIENT_MAIN_TAGS)
    }

    /// 检查层主标签投影
    pub fn extract_study_information(&self) -> BTreeMap<String, String> {
        self.project(tags::STUDY_MAIN_TAGS)
    }

    /// 系列层主标签投影
    pub fn extract_series_information(&self) -> BTreeMap<String, String> {
        self.project(tags::SERIES_MAIN_TAGS)
    }

    /// 实例层主标签投影
    pub fn extract_instance_information(&self) -> BTreeMap<String, String> {
        self.project(tags::INSTANCE_MAIN_TAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DicomSummary {
        let mut s = DicomSummary::new();
        s.insert(tags::PATIENT_ID, "P1")
            .insert(tags::PATIENT_NAME, "DOE^JOHN")
            .insert(tags::STUDY_INSTANCE_UID, "1.2.3")
            .insert(tags::STUDY_DESCRIPTION, "CT ABDOMEN")
            .insert(tags::SERIES_INSTANCE_UID, "1.2.3.4")
            .insert(tags::MODALITY, "CT")
            .insert(tags::SOP_INSTANCE_UID, "1.2.3.4.5")
            .insert(tags::INSTANCE_NUMBER, "1");
        s
    }

    #[test]
    fn test_projections_pick_level_tags() {
        let s = sample();

        let patient = s.extract_patient_information();
        assert_eq!(patient.get(tags::PATIENT_ID).unwrap(), "P1");
        assert!(!patient.contains_key(tags::STUDY_INSTANCE_UID));

        let study = s.extract_study_information();
        assert_eq!(study.get(tags::STUDY_DESCRIPTION).unwrap(), "CT ABDOMEN");
        assert!(!study.contains_key(tags::PATIENT_ID));

        let series = s.extract_series_information();
        assert_eq!(series.get(tags::MODALITY).unwrap(), "CT");

        let instance = s.extract_instance_information();
        assert_eq!(instance.get(tags::INSTANCE_NUMBER).unwrap(), "1");
        assert!(!instance.contains_key(tags::MODALITY));
    }

    #[test]
    fn test_missing_tags_skipped() {
        let mut s = DicomSummary::new();
        s.insert(tags::PATIENT_ID, "P1");
        let patient = s.extract_patient_information();
        assert_eq!(patient.len(), 1);
    }

    #[test]
    fn test_last_write_wins() {
        let mut s = DicomSummary::new();
        s.insert(tags::PATIENT_ID, "P1").insert(tags::PATIENT_ID, "P2");
        assert_eq!(s.value(tags::PATIENT_ID).unwrap(), "P2");
    }
}
