//! CorrelationRegistry - correlation id → 応答待ちスロット
//!
//! # 学習ポイント
//! - DashMap の `remove` が「取り出し」と「存在確認」を 1 ステップで行う
//! - Listener と TimeoutSupervisor のどちらが勝つかは remove の成否だけで決まる
//! - スロットの完了は shard lock を離してから行う（lock を跨いで何もしない）
//!
//! # 不変条件
//! - 同じ id が同時に 2 件登録されることはない（DuplicateCorrelation）
//! - `resolve_and_remove` と `evict_and_fail` が同じ id で両方成功することはない
//! - 2 回目の呼び出しは常に no-op（false）

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::AbortHandle;

use super::pending::PendingRequest;
use crate::domain::{CorrelationId, InboundEnvelope, ReplyError};

/// Concurrency-safe store of outstanding requests, scoped to one service instance.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    entries: DashMap<CorrelationId, PendingRequest>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert if absent.
    pub fn register(&self, id: CorrelationId, pending: PendingRequest) -> Result<(), ReplyError> {
        match self.entries.entry(id) {
            Entry::Occupied(occupied) => {
                Err(ReplyError::DuplicateCorrelation(occupied.key().clone()))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(pending);
                Ok(())
            }
        }
    }

    /// Remove and complete with a reply. Returns whether this call acted.
    pub fn resolve_and_remove(&self, id: &str, reply: InboundEnvelope) -> bool {
        match self.entries.remove(id) {
            Some((_, pending)) => {
                if !pending.complete(Ok(reply)) {
                    tracing::debug!(correlation_id = %id, "caller stopped waiting before the reply arrived");
                }
                true
            }
            None => false,
        }
    }

    /// Remove and fail. Returns whether this call acted.
    pub fn evict_and_fail(&self, id: &str, error: ReplyError) -> bool {
        match self.entries.remove(id) {
            Some((_, pending)) => {
                pending.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Remove without completing; the caller's receiver observes a closed slot.
    pub fn discard(&self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Attach the deadline timer so resolution can cancel it.
    /// Returns false if the entry is already gone.
    pub fn attach_timer(&self, id: &str, timer: AbortHandle) -> bool {
        match self.entries.get_mut(id) {
            Some(mut pending) => {
                pending.set_timer(timer);
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding entry. Returns how many this call failed.
    pub fn fail_all<F>(&self, make_error: F) -> usize
    where
        F: Fn(&CorrelationId) -> ReplyError,
    {
        let ids: Vec<CorrelationId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.evict_and_fail(id.as_str(), make_error(id)))
            .count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
