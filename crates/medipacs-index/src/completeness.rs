//! 系列完整度计算
//!
//! 期望数量来自系列元数据，实例序号来自各子实例元数据。序号按1起算；
//! 只维护已见序号集合，不随期望数量分配存储。

use std::collections::HashSet;

use medipacs_core::{MetadataKind, Result, SeriesStatus};

use crate::schema::SchemaTransaction;

/// 计算一个系列的完整度状态
pub async fn evaluate_series_status(
    tx: &mut SchemaTransaction,
    series_id: i64,
) -> Result<SeriesStatus> {
    // 无符号解析：负数文本同样视为不可解析
    let expected = match tx
        .get_metadata(series_id, MetadataKind::SeriesExpectedNumberOfInstances)
        .await?
    {
        None => return Ok(SeriesStatus::Unknown),
        Some(text) => match text.parse::<u64>() {
            Ok(value) => value,
            Err(_) => return Ok(SeriesStatus::Unknown),
        },
    };

    let mut seen = HashSet::new();
    for value in tx.child_index_metadata(series_id).await? {
        let Some(text) = value else {
            return Ok(SeriesStatus::Unknown);
        };
        let Ok(index) = text.parse::<u64>() else {
            return Ok(SeriesStatus::Unknown);
        };

        if index == 0 || index > expected {
            // 序号越界
            return Ok(SeriesStatus::Inconsistent);
        }
        if !seen.insert(index) {
            // 同一序号出现两次
            return Ok(SeriesStatus::Inconsistent);
        }
    }

    if seen.len() as u64 == expected {
        Ok(SeriesStatus::Complete)
    } else {
        Ok(SeriesStatus::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::IndexDatabase;
    use medipacs_core::ResourceLevel;

    async fn series_with_indices(
        tx: &mut SchemaTransaction,
        expected: Option<&str>,
        indices: &[Option<&str>],
    ) -> i64 {
        let series = tx.create_resource("se", ResourceLevel::Series).await.unwrap();
        if let Some(value) = expected {
            tx.set_metadata(series, MetadataKind::SeriesExpectedNumberOfInstances, value)
                .await
                .unwrap();
        }
        for (i, index) in indices.iter().enumerate() {
            let id = tx
                .create_resource(&format!("ins{}", i), ResourceLevel::Instance)
                .await
                .unwrap();
            tx.attach_child(series, id).await.unwrap();
            if let Some(value) = index {
                tx.set_metadata(id, MetadataKind::InstanceIndexInSeries, value)
                    .await
                    .unwrap();
            }
        }
        series
    }

    async fn check(expected: Option<&str>, indices: &[Option<&str>], status: SeriesStatus) {
        let db = IndexDatabase::in_memory().await.unwrap();
        let mut tx = db.transaction().await.unwrap();
        let series = series_with_indices(&mut tx, expected, indices).await;
        assert_eq!(evaluate_series_status(&mut tx, series).await.unwrap(), status);
        tx.commit().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_unknown_without_expected_count() {
        check(None, &[Some("1")], SeriesStatus::Unknown).await;
    }

    #[tokio::test]
    async fn test_unknown_with_unparseable_expected() {
        check(Some("abc"), &[Some("1")], SeriesStatus::Unknown).await;
        // 负数按无符号解析失败
        check(Some("-3"), &[Some("1")], SeriesStatus::Unknown).await;
    }

    #[tokio::test]
    async fn test_unknown_when_child_lacks_index() {
        check(Some("2"), &[Some("1"), None], SeriesStatus::Unknown).await;
        check(Some("2"), &[Some("1"), Some("x")], SeriesStatus::Unknown).await;
    }

    #[tokio::test]
    async fn test_missing_until_all_indices_present() {
        check(Some("3"), &[Some("1"), Some("2")], SeriesStatus::Missing).await;
    }

    #[tokio::test]
    async fn test_complete_when_distinct_count_matches() {
        check(
            Some("3"),
            &[Some("2"), Some("1"), Some("3")],
            SeriesStatus::Complete,
        )
        .await;
    }

    #[tokio::test]
    async fn test_inconsistent_on_duplicate_index() {
        check(Some("2"), &[Some("1"), Some("1")], SeriesStatus::Inconsistent).await;
    }

    #[tokio::test]
    async fn test_inconsistent_on_out_of_range_index() {
        check(Some("2"), &[Some("3")], SeriesStatus::Inconsistent).await;
        check(Some("2"), &[Some("0")], SeriesStatus::Inconsistent).await;
    }
}
