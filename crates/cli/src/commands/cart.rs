//! Cart commands.
//!
//! Edits go through the same sync engine the storefront uses, so a `set`
//! waits out the debounce window and exits once the line is confirmed.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mely_client::Storefront;
use mely_client::cart::{CartSnapshot, CartSyncEngine};
use mely_client::notify::{AlwaysConfirm, Confirmer, NoticeKind, Notifier, TracingNotifier};
use mely_core::{LineId, Price, Quantity};
use serde_json::json;

use super::{CliError, Output, PromptConfirmer};

/// Forwards notices to the log and remembers the last error.
#[derive(Default)]
struct CommandNotifier {
    last_error: Mutex<Option<String>>,
}

impl CommandNotifier {
    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        if kind == NoticeKind::Error {
            *self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
        }
        TracingNotifier.notify(kind, message);
    }
}

fn engine(
    storefront: &Storefront,
    confirmer: Arc<dyn Confirmer>,
) -> (CartSyncEngine, Arc<CommandNotifier>) {
    let notifier = Arc::new(CommandNotifier::default());
    let engine = storefront.cart_engine(notifier.clone(), confirmer);
    (engine, notifier)
}

fn render(snapshot: &CartSnapshot) -> String {
    if snapshot.lines.is_empty() {
        return "Your cart is empty".to_string();
    }

    let mut out = String::new();
    for line in &snapshot.lines {
        let _ = writeln!(
            out,
            "#{:<6} {} ({})  x{}  {} = {}",
            line.id,
            line.product.name,
            line.variant.name,
            line.quantity(),
            Price::store(line.unit_price()),
            Price::store(line.subtotal()),
        );
    }
    let _ = write!(out, "Total: {}", Price::store(snapshot.total));
    out
}

/// Print the cart.
pub async fn show(storefront: &Storefront, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _) = engine(storefront, Arc::new(AlwaysConfirm));
    let snapshot = engine.load().await?;
    output.emit(&snapshot, || render(&snapshot));
    Ok(())
}

/// Set a line's quantity and wait until the backend confirmed it.
pub async fn set(
    storefront: &Storefront,
    line: LineId,
    quantity: i64,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let (engine, notifier) = engine(storefront, Arc::new(AlwaysConfirm));
    engine.load().await?;

    if !engine.on_quantity_edit(line, quantity).await? {
        return Err(CliError::InvalidArgument(format!(
            "quantity must be between {} and {} (got {quantity})",
            Quantity::MIN,
            Quantity::MAX
        ))
        .into());
    }
    settle(storefront, &engine, &notifier, line, output).await
}

/// Add or remove one unit.
pub async fn step(
    storefront: &Storefront,
    line: LineId,
    delta: i64,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let (engine, notifier) = engine(storefront, Arc::new(AlwaysConfirm));
    engine.load().await?;

    if !engine.step(line, delta).await? {
        return Err(CliError::InvalidArgument(format!(
            "quantity must stay between {} and {}",
            Quantity::MIN,
            Quantity::MAX
        ))
        .into());
    }
    settle(storefront, &engine, &notifier, line, output).await
}

async fn settle(
    storefront: &Storefront,
    engine: &CartSyncEngine,
    notifier: &CommandNotifier,
    line: LineId,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = storefront.config();
    let bound = config.cart_debounce + config.request_timeout * 3 + Duration::from_secs(1);

    let mut gate = engine.subscribe_checkout();
    let settled = matches!(
        tokio::time::timeout(bound, gate.wait_for(|open| *open)).await,
        Ok(Ok(_))
    );

    if let Some(error) = notifier.last_error() {
        return Err(CliError::NotApplied(error).into());
    }
    if !settled {
        return Err(CliError::NotApplied(format!("line {line} was not confirmed in time")).into());
    }

    let snapshot = engine.snapshot().await;
    output.emit(&snapshot, || render(&snapshot));
    Ok(())
}

/// Remove a line, asking first unless `yes` is set.
pub async fn remove(
    storefront: &Storefront,
    line: LineId,
    yes: bool,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let confirmer: Arc<dyn Confirmer> = if yes {
        Arc::new(AlwaysConfirm)
    } else {
        Arc::new(PromptConfirmer)
    };
    let (engine, _) = engine(storefront, confirmer);
    engine.load().await?;

    let removed = engine.remove_line(line).await?;
    let snapshot = engine.snapshot().await;
    output.emit(&json!({ "removed": removed, "cart": snapshot }), || {
        if removed {
            render(&snapshot)
        } else {
            "Kept the item".to_string()
        }
    });
    Ok(())
}

/// Print the authoritative item count.
pub async fn count(storefront: &Storefront, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    let count = storefront.counts().refresh().await?;
    output.emit(&json!({ "total_items": count }), || {
        format!("{count} item(s) in cart")
    });
    Ok(())
}

/// Check the checkout gate and print what would be ordered.
pub async fn checkout(
    storefront: &Storefront,
    output: Output,
) -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _) = engine(storefront, Arc::new(AlwaysConfirm));
    engine.load().await?;

    let snapshot = engine.finalize_purchase().await?;
    output.emit(&snapshot, || {
        format!("{}\nReady to check out", render(&snapshot))
    });
    Ok(())
}
