//! Per-chat serialization of turns.

use dashmap::DashMap;
use di::{inject, injectable};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// One async mutex per chat code; different chats never wait on each other.
///
/// Entries only live while a turn holds or awaits them, so codes that never
/// matched a chat leave nothing behind.
#[derive(Default)]
pub struct ChatLocks {
    locks: Arc<LockTable>,
}

/// Exclusive hold on one chat, released on drop.
pub struct ChatGuard {
    code: String,
    table: Arc<LockTable>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChatGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // the table's own Arc is the last one when nobody else is queued
        self.table
            .remove_if(&self.code, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[injectable]
impl ChatLocks {
    #[inject]
    pub fn create() -> ChatLocks {
        ChatLocks::default()
    }

    /// Waits until no other turn holds `code`, then holds it until the guard drops.
    pub async fn acquire(&self, code: &str) -> ChatGuard {
        let lock = self
            .locks
            .entry(code.to_owned())
            .or_default()
            .value()
            .clone();
        let guard = lock.lock_owned().await;

        ChatGuard {
            code: code.to_owned(),
            table: self.locks.clone(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
