//! 级联删除
//!
//! 删除一个资源会带走整棵子树；若父资源因此失去最后一个子级，
//! 继续向上删除。遍历期间发现的附件UUID与幸存祖先都先缓存在
//! walker内部，调用方在事务提交后才把UUID交给blob存储。

use tracing::debug;
use uuid::Uuid;

use medipacs_core::{ResourceLevel, Result};

use crate::schema::SchemaTransaction;

/// blob存储的删除回调
///
/// 幂等；每个被删除的附件恰好收到一次通知，且在删除操作返回之前。
pub trait DeletionSink: Send + Sync {
    fn remove_blob(&self, uuid: Uuid);
}

/// 级联删除的遍历器与信号缓冲
pub struct DeletionWalker {
    deleted_files: Vec<Uuid>,
    remaining: Option<(ResourceLevel, String)>,
}

impl DeletionWalker {
    pub fn new() -> Self {
        Self {
            deleted_files: Vec::new(),
            remaining: None,
        }
    }

    fn signal_file_deleted(&mut self, uuid: Uuid) {
        self.deleted_files.push(uuid);
    }

    /// 多个候选祖先时保留层级值更小的那个（更靠近Patient）
    fn signal_remaining_ancestor(&mut self, level: ResourceLevel, public_id: String) {
        debug!("Remaining ancestor \"{}\" ({:?})", public_id, level);
        match &self.remaining {
            Some((kept, _)) if *kept <= level => {}
            _ => self.remaining = Some((level, public_id)),
        }
    }

    /// 删除internal_id及其整棵子树，然后向上清理失去全部子级的祖先
    pub async fn remove(&mut self, tx: &mut SchemaTransaction, internal_id: i64) -> Result<()> {
        for uuid in tx.attachment_uuids_in_subtree(internal_id).await? {
            self.signal_file_deleted(uuid);
        }

        let mut current = tx.parent_of(internal_id).await?;
        tx.delete_resource_row(internal_id).await?;

        while let Some(ancestor) = current {
            if tx.count_children(ancestor).await? > 0 {
                let row = tx.resource_by_internal_id(ancestor).await?;
                self.signal_remaining_ancestor(row.level, row.public_id);
                break;
            }

            for uuid in tx.attachment_uuids_of(ancestor).await? {
                self.signal_file_deleted(uuid);
            }

            current = tx.parent_of(ancestor).await?;
            tx.delete_resource_row(ancestor).await?;
        }

        Ok(())
    }

    /// 取出缓冲的结果：按发现顺序的附件UUID，以及幸存祖先（若有）
    pub fn into_outcome(self) -> (Vec<Uuid>, Option<(ResourceLevel, String)>) {
        (self.deleted_files, self.remaining)
    }
}

impl Default for DeletionWalker {
    fn default() -> Self {
        Self::new()
    }
}
