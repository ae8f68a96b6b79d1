//! 通用工具函数

use chrono::Utc;

/// 当前UTC时间的紧凑ISO-8601形式，例如`20260801T143000`
///
/// 该格式会持久化到变更/导出日志中，不可改动。
pub fn now_iso_string() -> String {
    Utc::now().format("%Y%m%dT%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_iso_string_shape() {
        let s = now_iso_string();
        assert_eq!(s.len(), 15);
        assert_eq!(s.as_bytes()[8], b'T');
        assert!(s[..8].chars().all(|c| c.is_ascii_digit()));
        assert!(s[9..].chars().all(|c| c.is_ascii_digit()));
    }
}
