//! Cart count broadcaster.
//!
//! Screens that only need the item count (a navigation badge, say) subscribe
//! here instead of holding the cart. The count always comes from the backend,
//! never from optimistic local state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, instrument};

use super::backend::CartBackend;
use crate::error::{ApiError, Result};

/// Publishes the authoritative cart item count to any number of subscribers.
#[derive(Clone)]
pub struct CartCountBroadcaster {
    backend: Arc<dyn CartBackend>,
    sender: Arc<watch::Sender<u32>>,
}

impl CartCountBroadcaster {
    #[must_use]
    pub fn new(backend: Arc<dyn CartBackend>) -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            backend,
            sender: Arc::new(sender),
        }
    }

    /// Last published count.
    #[must_use]
    pub fn current(&self) -> u32 {
        *self.sender.borrow()
    }

    /// Start observing the count. Dropping the subscription unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> CountSubscription {
        CountSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Fetch the count from the backend and publish it.
    ///
    /// A session without a cart publishes 0. Any other failure keeps the last
    /// published value.
    ///
    /// # Errors
    ///
    /// Returns the backend error for failures other than a missing cart or
    /// an expired session.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<u32> {
        let count = match self.backend.item_count().await {
            Ok(count) => count,
            Err(ApiError::NoActiveCart | ApiError::MustReauthenticate) => 0,
            Err(e) => {
                debug!(error = %e, "Keeping last cart count");
                return Err(e);
            }
        };

        self.sender.send_replace(count);
        debug!(count, "Published cart count");
        Ok(count)
    }
}

impl std::fmt::Debug for CartCountBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartCountBroadcaster")
            .field("current", &self.current())
            .field("subscribers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

/// Handle on the published count.
#[derive(Debug, Clone)]
pub struct CountSubscription {
    receiver: watch::Receiver<u32>,
}

impl CountSubscription {
    /// Latest count, marking it seen.
    pub fn latest(&mut self) -> u32 {
        *self.receiver.borrow_and_update()
    }

    /// Wait for the next published count.
    ///
    /// Returns `None` once the broadcaster is gone.
    pub async fn changed(&mut self) -> Option<u32> {
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }
}
