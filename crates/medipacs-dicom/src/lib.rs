//! # medipacs DICOM
//!
//! 解析器与索引之间的交接层：DICOM标签摘要、各层级主标签投影，
//! 以及从标识标签派生四级公共ID的哈希器。

pub mod hasher;
pub mod summary;
pub mod tags;

pub use hasher::InstanceHasher;
pub use summary::DicomSummary;
