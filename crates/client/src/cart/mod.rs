//! Cart model, backend seam, sync engine and count broadcaster.

pub mod backend;
pub mod count;
pub mod model;
pub mod sync;
pub mod wire;

pub use backend::{ApiCartBackend, CartBackend};
pub use count::{CartCountBroadcaster, CountSubscription};
pub use model::{Cart, CartError, CartLine, LineReconciliation, LineState, ProductRef, VariantRef};
pub use sync::{CartSnapshot, CartSyncEngine, SyncError};
