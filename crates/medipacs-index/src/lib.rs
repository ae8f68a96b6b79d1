//! # medipacs索引模块
//!
//! 服务端权威目录：维护Patient → Study → Series → Instance四级层级，
//! 承载入库去重、级联删除、完整度计算、变更/导出日志与统计聚合。
//! 所有操作经由单一互斥锁串行化，每个操作对应一个存储事务。

pub mod completeness;
pub mod connection;
pub mod manager;
pub mod models;
pub mod schema;
pub mod views;
pub mod walker;

// 重新导出主要类型
pub use connection::IndexDatabase;
pub use manager::IndexManager;
pub use schema::SchemaTransaction;
pub use views::{DeletionReport, RemainingAncestor, ResourceView, StatisticsView};
pub use walker::{DeletionSink, DeletionWalker};
