//! 索引内部的行模型
//!
//! 内部整数ID只在本crate内流转，绝不跨越门面暴露给调用方。

use medipacs_core::ResourceLevel;

/// resources表的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRow {
    pub internal_id: i64,
    pub public_id: String,
    pub level: ResourceLevel,
    pub parent_id: Option<i64>,
}
