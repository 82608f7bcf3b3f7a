use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::quiz::QuestionRecord;

/// Bounded FIFO of ready-to-serve questions shared by the refill worker and
/// every chat handler.
pub struct QuestionCache {
    items: Mutex<VecDeque<QuestionRecord>>,
    capacity: usize,
    available: Notify,
}

impl QuestionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued questions. Only a hint: it can change as soon as the
    /// lock is released.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `record` unless the cache is full, in which case it is handed back.
    pub fn try_enqueue(&self, record: QuestionRecord) -> Result<(), QuestionRecord> {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            return Err(record);
        }
        items.push_back(record);
        drop(items);

        self.available.notify_one();
        Ok(())
    }

    /// Pop the oldest question, waiting at most `timeout` for one to arrive.
    /// `None` means the cache stayed empty for the whole wait.
    pub async fn dequeue(&self, timeout: Duration) -> Option<QuestionRecord> {
        tokio::time::timeout(timeout, async {
            loop {
                let next = self.lock().pop_front();
                if let Some(record) = next {
                    return record;
                }
                // notify_one stores a permit when nobody is waiting, so a push
                // between the pop above and this await is not lost.
                self.available.notified().await;
            }
        })
        .await
        .ok()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QuestionRecord>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
