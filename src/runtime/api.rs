//! In-process API surface: submission, status and health.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{AdmissionError, AuditAction, KitchenContext, KitchenStatus, Order};
use crate::util::serde::OrderId;

/// Outcome of a batch submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    /// Orders accepted into the queue.
    pub accepted: Vec<OrderId>,
    /// Orders refused, with the reason.
    pub rejected: Vec<(OrderId, String)>,
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Whether shutdown has begun.
    pub shutting_down: bool,
    /// Busy workers.
    pub busy_workers: usize,
    /// Orders waiting.
    pub queue_len: usize,
}

fn accept(ctx: &KitchenContext, order: Order) -> Result<OrderId, AdmissionError> {
    let order_id = order.id;
    match ctx.queue().enqueue(order) {
        Ok(()) => {
            ctx.audit(order_id, None, AuditAction::Submitted, None);
            Ok(order_id)
        }
        Err(err) => {
            ctx.audit(order_id, None, AuditAction::Rejected, Some(err.to_string()));
            Err(err)
        }
    }
}

/// Submit one order and reorder the queue.
///
/// # Errors
///
/// `Malformed` for an order without a dish or workspace need, `QueueClosed`
/// after shutdown. Rejected orders are dropped.
pub fn submit(ctx: &KitchenContext, order: Order) -> Result<(), AdmissionError> {
    accept(ctx, order)?;
    ctx.queue().reorder();
    Ok(())
}

/// Submit many orders with a single reorder at the end.
pub fn submit_batch(ctx: &KitchenContext, orders: impl IntoIterator<Item = Order>) -> BatchReceipt {
    let mut receipt = BatchReceipt::default();
    for order in orders {
        let order_id = order.id;
        match accept(ctx, order) {
            Ok(id) => receipt.accepted.push(id),
            Err(err) => receipt.rejected.push((order_id, err.to_string())),
        }
    }
    ctx.queue().reorder();
    if receipt.rejected.is_empty() {
        info!(accepted = receipt.accepted.len(), "batch submitted");
    } else {
        warn!(
            accepted = receipt.accepted.len(),
            rejected = receipt.rejected.len(),
            "batch submitted with rejections"
        );
    }
    receipt
}

/// Point-in-time view of tools, workers, workspace and queue.
#[must_use]
pub fn snapshot_status(ctx: &KitchenContext) -> KitchenStatus {
    ctx.status()
}

/// Return a health payload.
#[must_use]
pub fn health(ctx: &KitchenContext) -> Health {
    let shutting_down = ctx.is_shutting_down();
    Health {
        ok: !shutting_down,
        shutting_down,
        busy_workers: ctx.workers().busy_count(),
        queue_len: ctx.queue().len(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::KitchenConfig;
    use crate::core::{AdmissionQueue, AuditSink, Dish, EmptyCatalog, InMemoryAuditSink};

    fn ctx_with_audit() -> (KitchenContext, Arc<InMemoryAuditSink>) {
        let sink = Arc::new(InMemoryAuditSink::new(64));
        let audit: Arc<dyn AuditSink> = sink.clone();
        let ctx = KitchenContext::new(
            KitchenConfig::default(),
            AdmissionQueue::new(),
            Arc::new(EmptyCatalog),
            None,
            Some(audit),
        );
        (ctx, sink)
    }

    #[test]
    fn test_submit_batch_splits_accepted_and_rejected() {
        let (ctx, sink) = ctx_with_audit();
        let dish = Arc::new(Dish::standard_menu().remove(0));
        let receipt = submit_batch(
            &ctx,
            [
                Order::new(1, Arc::clone(&dish), 1),
                Order::without_dish(2, 9),
                Order::new(3, dish, 5),
            ],
        );
        assert_eq!(receipt.accepted, vec![1, 3]);
        assert_eq!(receipt.rejected.len(), 1);
        assert_eq!(ctx.queue().pending().first().map(|o| o.id), Some(3));
        assert_eq!(sink.actions_for(2), vec![AuditAction::Rejected]);
    }

    #[test]
    fn test_health_reflects_queue() {
        let (ctx, _) = ctx_with_audit();
        let dish = Arc::new(Dish::standard_menu().remove(1));
        submit(&ctx, Order::new(1, dish, 0)).unwrap();
        let report = health(&ctx);
        assert!(report.ok);
        assert_eq!(report.queue_len, 1);
        assert_eq!(snapshot_status(&ctx).queue_len, 1);
    }
}
