use crate::models::DownloadHistoryItem;
use std::collections::VecDeque;

pub const HISTORY_LIMIT: usize = 10;

/// Most recent downloads, newest first. Oldest entries are evicted past the limit.
#[derive(Debug, Clone)]
pub struct DownloadHistory {
    items: VecDeque<DownloadHistoryItem>,
    limit: usize,
}

impl Default for DownloadHistory {
    fn default() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }
}

impl DownloadHistory {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    /// Returns the evicted item, if any.
    pub fn push(&mut self, item: DownloadHistoryItem) -> Option<DownloadHistoryItem> {
        self.items.push_front(item);
        if self.items.len() > self.limit {
            self.items.pop_back()
        } else {
            None
        }
    }

    pub fn items(&self) -> Vec<DownloadHistoryItem> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
