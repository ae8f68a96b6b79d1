//! 公共标识符派生
//!
//! 对四级标识元组做SHA-256，得到跨进程稳定的公共ID。重复入库的
//! 实例会再次产生相同的ID，去重逻辑依赖这一点。

use sha2::{Digest, Sha256};

use medipacs_core::{PacsError, Result};

use crate::summary::DicomSummary;
use crate::tags;

/// 从摘要提取的四个标识标签
#[derive(Debug, Clone)]
pub struct InstanceHasher {
    patient_id: String,
    study_uid: String,
    series_uid: String,
    sop_uid: String,
}

impl InstanceHasher {
    /// 缺失任一标识标签时返回`BadRequest`
    pub fn from_summary(summary: &DicomSummary) -> Result<Self> {
        let get = |tag: &str| -> Result<String> {
            summary
                .value(tag)
                .map(|v| v.to_string())
                .ok_or_else(|| PacsError::BadRequest(format!("摘要缺少标识标签: {}", tag)))
        };

        Ok(Self {
            patient_id: get(tags::PATIENT_ID)?,
            study_uid: get(tags::STUDY_INSTANCE_UID)?,
            series_uid: get(tags::SERIES_INSTANCE_UID)?,
            sop_uid: get(tags::SOP_INSTANCE_UID)?,
        })
    }

    pub fn hash_patient(&self) -> String {
        hash_token(&[&self.patient_id])
    }

    pub fn hash_study(&self) -> String {
        hash_token(&[&self.patient_id, &self.study_uid])
    }

    pub fn hash_series(&self) -> String {
        hash_token(&[&self.patient_id, &self.study_uid, &self.series_uid])
    }

    pub fn hash_instance(&self) -> String {
        hash_token(&[&self.patient_id, &self.study_uid, &self.series_uid, &self.sop_uid])
    }
}

/// 各分量以`|`连接后哈希，十六进制每8位插入`-`分组
fn hash_token(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(components.join("|").as_bytes());
    let hex = format!("{:x}", hasher.finalize());

    let mut token = String::with_capacity(hex.len() + hex.len() / 8);
    for (i, c) in hex.chars().enumerate() {
        if i > 0 && i % 8 == 0 {
            token.push('-');
        }
        token.push(c);
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DicomSummary {
        let mut s = DicomSummary::new();
        s.insert(tags::PATIENT_ID, "P1")
            .insert(tags::STUDY_INSTANCE_UID, "S1")
            .insert(tags::SERIES_INSTANCE_UID, "Se1")
            .insert(tags::SOP_INSTANCE_UID, "I1");
        s
    }

    #[test]
    fn test_deterministic_across_instances() {
        let a = InstanceHasher::from_summary(&sample()).unwrap();
        let b = InstanceHasher::from_summary(&sample()).unwrap();
        assert_eq!(a.hash_patient(), b.hash_patient());
        assert_eq!(a.hash_study(), b.hash_study());
        assert_eq!(a.hash_series(), b.hash_series());
        assert_eq!(a.hash_instance(), b.hash_instance());
    }

    #[test]
    fn test_levels_yield_distinct_tokens() {
        let h = InstanceHasher::from_summary(&sample()).unwrap();
        let tokens = [
            h.hash_patient(),
            h.hash_study(),
            h.hash_series(),
            h.hash_instance(),
        ];
        for i in 0..tokens.len() {
            for j in (i + 1)..tokens.len() {
                assert_ne!(tokens[i], tokens[j]);
            }
        }
    }

    #[test]
    fn test_token_shape() {
        let token = InstanceHasher::from_summary(&sample()).unwrap().hash_instance();
        // 64位十六进制，8组，7个分隔符
        assert_eq!(token.len(), 71);
        assert_eq!(token.matches('-').count(), 7);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn test_component_boundaries_matter() {
        // "ab"+"c" 和 "a"+"bc" 不能得到同一个检查ID
        let mut x = DicomSummary::new();
        x.insert(tags::PATIENT_ID, "ab")
            .insert(tags::STUDY_INSTANCE_UID, "c")
            .insert(tags::SERIES_INSTANCE_UID, "s")
            .insert(tags::SOP_INSTANCE_UID, "i");
        let mut y = DicomSummary::new();
        y.insert(tags::PATIENT_ID, "a")
            .insert(tags::STUDY_INSTANCE_UID, "bc")
            .insert(tags::SERIES_INSTANCE_UID, "s")
            .insert(tags::SOP_INSTANCE_UID, "i");

        let hx = InstanceHasher::from_summary(&x).unwrap();
        let hy = InstanceHasher::from_summary(&y).unwrap();
        assert_ne!(hx.hash_study(), hy.hash_study());
    }

    #[test]
    fn test_missing_identifier_is_bad_request() {
        let mut s = DicomSummary::new();
        s.insert(tags::PATIENT_ID, "P1")
            .insert(tags::STUDY_INSTANCE_UID, "S1")
            .insert(tags::SERIES_INSTANCE_UID, "Se1");
        match InstanceHasher::from_summary(&s) {
            Err(PacsError::BadRequest(_)) => {}
            other => panic!("预期BadRequest，得到 {:?}", other.map(|_| ())),
        }
    }
}
