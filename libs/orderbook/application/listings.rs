//! Change notifications for listing views
//!
//! The store stays the only copy of order state. Views subscribe to a revision
//! counter and re-query whenever it moves.

use tokio::sync::watch;

#[derive(Debug)]
pub struct ListingsFeed {
    revision: watch::Sender<u64>,
}

impl ListingsFeed {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self { revision }
    }

    /// Signal that stored orders changed
    pub fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}

impl Default for ListingsFeed {
    fn default() -> Self {
        Self::new()
    }
}
