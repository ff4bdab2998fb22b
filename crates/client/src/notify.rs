//! User-facing notification and confirmation seams.
//!
//! The client never renders anything. It hands messages to a [`Notifier`] and
//! asks a [`Confirmer`] before destructive actions; front ends plug in their
//! own toast and dialog implementations.

use async_trait::async_trait;
use tracing::{error, info};

/// Kind of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// Sink for `(kind, message)` notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NoticeKind, message: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Info | NoticeKind::Success => info!(?kind, "{message}"),
            NoticeKind::Error => error!("{message}"),
        }
    }
}

/// Blocking yes/no prompt shown before an irreversible action.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Ask the user; `true` means go ahead.
    async fn confirm(&self, title: &str, detail: &str) -> bool;
}

/// Confirms everything. For non-interactive callers that already asked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

#[async_trait]
impl Confirmer for AlwaysConfirm {
    async fn confirm(&self, _title: &str, _detail: &str) -> bool {
        true
    }
}
