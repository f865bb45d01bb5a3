use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Per-page mutual exclusion for version-creating sequences.
///
/// Entries exist only while some task holds or waits for the page's lock.
#[derive(Clone, Default)]
pub struct PageLocks {
    table: LockTable,
}

/// Held for the duration of one read-check-append-advance sequence.
pub struct PageGuard {
    page_id: String,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, page_id: &str) -> PageGuard {
        let entry = {
            let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            table
                .entry(page_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = entry.lock_owned().await;

        PageGuard {
            page_id: page_id.to_string(),
            table: self.table.clone(),
            guard: Some(guard),
        }
    }

    /// Number of pages with a live lock entry.
    pub fn active(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl PageGuard {
    pub fn page_id(&self) -> &str {
        &self.page_id
    }
}

impl std::fmt::Debug for PageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id)
            .field("held", &self.guard.is_some())
            .finish()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the table's reference left: nobody holds or waits for the page.
        let idle = table
            .get(&self.page_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1);
        if idle {
            table.remove(&self.page_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_same_page_is_exclusive() {
        let locks = PageLocks::new();
        let first = locks.lock("p1").await;

        let mut second = task::spawn(locks.lock("p1"));
        assert_pending!(second.poll());

        drop(first);
        assert!(second.is_woken());
        let guard = assert_ready!(second.poll());
        assert_eq!(guard.page_id(), "p1");
        assert_eq!(
            format!("{:?}", guard),
            "PageGuard { page_id: \"p1\", held: true }"
        );
    }

    #[tokio::test]
    async fn test_different_pages_do_not_block() {
        let locks = PageLocks::new();
        let _a = locks.lock("p1").await;

        let mut other = task::spawn(locks.lock("p2"));
        assert_ready!(other.poll());
    }

    #[tokio::test]
    async fn test_entries_are_released() {
        let locks = PageLocks::new();
        {
            let _a = locks.lock("p1").await;
            let _b = locks.lock("p2").await;
            assert_eq!(locks.active(), 2);
        }
        assert_eq!(locks.active(), 0);
    }
}
