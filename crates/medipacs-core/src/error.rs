//! 错误定义模块

use thiserror::Error;

/// 索引统一错误类型
#[derive(Error, Debug)]
pub enum PacsError {
    #[error("参数错误: {0}")]
    BadRequest(String),

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("调用顺序错误: {0}")]
    BadSequenceOfCalls(String),

    #[error("存储引擎错误: {0}")]
    Storage(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 索引统一结果类型
pub type Result<T> = std::result::Result<T, PacsError>;
