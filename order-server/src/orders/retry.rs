//! Retrying store decorator
//!
//! Wraps any [`OrderStore`] with a per-attempt timeout and exponential
//! backoff for transient failures. Logical outcomes (not found, conflict,
//! duplicate, bad data) are returned immediately.
//!
//! A write whose acknowledgement was lost (timeout after commit) shows up
//! on the next attempt as `Conflict`/`Duplicate`. Before surfacing those,
//! the decorator re-reads the order and reports success if the write it
//! was retrying is already there.

use async_trait::async_trait;
use shared::order::{Order, OrderFilter};
use std::future::Future;
use std::time::Duration;

use super::traits::{OrderStore, StoreError, StoreResult, TimelineAppend};

/// Retry configuration
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: delay = base * 2^retry, capped at max
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

pub struct RetryingOrderStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: OrderStore> RetryingOrderStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    ///
    /// Returns the result plus whether any earlier attempt failed transiently.
    async fn run<T, F, Fut>(&self, name: &'static str, op: F) -> (StoreResult<T>, bool)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut retried = false;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.policy.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(name)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.policy.delay_for(attempt - 1);
                    tracing::warn!(
                        operation = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    retried = true;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(operation = name, attempt, error = %e, "Store retries exhausted");
                    }
                    return (Err(e), retried);
                }
                Ok(value) => return (Ok(value), retried),
            }
        }
    }
}

#[async_trait]
impl<S: OrderStore> OrderStore for RetryingOrderStore<S> {
    async fn next_order_number(&self) -> StoreResult<String> {
        // A lost acknowledgement skips a number; numbers are never reused
        self.run("next_order_number", || self.inner.next_order_number())
            .await
            .0
    }

    async fn insert(&self, order: &Order) -> StoreResult<()> {
        match self.run("insert", || self.inner.insert(order)).await {
            (Err(StoreError::Duplicate(key)), true) => {
                match self.inner.get_by_id(&order.id).await? {
                    Some(existing) if existing == *order => {
                        tracing::info!(order_id = %order.id, "Insert landed before a lost acknowledgement");
                        Ok(())
                    }
                    _ => Err(StoreError::Duplicate(key)),
                }
            }
            (result, _) => result,
        }
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<Order>> {
        self.run("get_by_id", || self.inner.get_by_id(id)).await.0
    }

    async fn get_by_order_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
        self.run("get_by_order_number", || {
            self.inner.get_by_order_number(order_number)
        })
        .await
        .0
    }

    async fn get_by_tracking_number(&self, tracking_number: &str) -> StoreResult<Option<Order>> {
        self.run("get_by_tracking_number", || {
            self.inner.get_by_tracking_number(tracking_number)
        })
        .await
        .0
    }

    async fn list_by_customer(&self, customer_id: &str) -> StoreResult<Vec<Order>> {
        self.run("list_by_customer", || self.inner.list_by_customer(customer_id))
            .await
            .0
    }

    async fn list_all(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        self.run("list_all", || self.inner.list_all(filter)).await.0
    }

    async fn append_timeline_event(
        &self,
        order_id: &str,
        append: TimelineAppend,
    ) -> StoreResult<Order> {
        let result = self
            .run("append_timeline_event", || {
                self.inner.append_timeline_event(order_id, append.clone())
            })
            .await;

        match result {
            (Err(StoreError::Conflict { order_id: id, expected, actual }), true) => {
                let landed = self.inner.get_by_id(order_id).await?.filter(|order| {
                    order.version == append.expected_version + 1
                        && order.last_event().is_some_and(|e| {
                            e.status == append.event.status
                                && e.description == append.event.description
                                && e.timestamp == append.event.timestamp
                        })
                });
                match landed {
                    Some(order) => {
                        tracing::info!(order_id, "Append landed before a lost acknowledgement");
                        Ok(order)
                    }
                    None => Err(StoreError::Conflict {
                        order_id: id,
                        expected,
                        actual,
                    }),
                }
            }
            (result, _) => result,
        }
    }
}
