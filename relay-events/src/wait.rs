//! Waiting for the next emission of an event with a deadline

use crate::bus::EventBus;
use crate::error::EventBusError;
use crate::handler::Handler;
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Removes a pending one-shot subscription when the wait ends or is dropped.
///
/// Removal is by subscription id, so it is a no-op once the subscription
/// has already been pruned after firing.
struct PendingWait {
    registry: Arc<SubscriptionRegistry>,
    event: String,
    id: SubscriptionId,
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        self.registry.remove(&self.event, &[self.id]);
    }
}

impl EventBus {
    /// Wait for the next emission of `event` using the configured default
    /// deadline (5000 ms unless configured otherwise).
    pub fn wait_for(
        &self,
        event: &str,
    ) -> impl Future<Output = Result<Vec<Value>, EventBusError>> + Send + use<> {
        self.wait_for_timeout(event, self.config.default_wait_timeout())
    }

    /// Wait for the next emission of `event`, failing with
    /// [`EventBusError::Timeout`] if none arrives within `timeout`.
    ///
    /// The subscription is registered and the deadline starts when this is
    /// called, not when the returned future is first polled, so an emission
    /// that happens in between is still observed. Resolves with the emitted
    /// arguments. Dropping the future removes the subscription.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let ready = bus.wait_for_timeout("ready", Duration::from_secs(1));
    /// bus.emit("ready", vec![json!(42)]).await?;
    /// assert_eq!(ready.await?, vec![json!(42)]);
    /// ```
    pub fn wait_for_timeout(
        &self,
        event: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Value>, EventBusError>> + Send + use<> {
        // `None` when the deadline overflows the clock: wait without one.
        let deadline = Instant::now().checked_add(timeout);
        let (tx, rx) = oneshot::channel::<Vec<Value>>();
        let tx = Mutex::new(Some(tx));

        // A snapshot taken by an interleaved emission may still invoke the
        // handler after it fired; only the first call resolves.
        let handler = Handler::sync(move |args| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(args.to_vec());
            }
            Ok(())
        });

        let handle = self.once(event, handler);
        let pending = PendingWait {
            registry: Arc::clone(&self.registry),
            event: event.to_string(),
            id: handle.id(),
        };
        let enable_logging = self.config.enable_logging;

        async move {
            let received = async {
                match rx.await {
                    Ok(args) => args,
                    // Subscription removed from outside: keep waiting so the
                    // deadline decides the outcome.
                    Err(_) => std::future::pending().await,
                }
            };

            let outcome = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, received).await,
                None => Ok(received.await),
            };

            match outcome {
                Ok(args) => {
                    if enable_logging {
                        debug!(event = %pending.event, "Wait resolved");
                    }
                    Ok(args)
                }
                Err(_) => {
                    if enable_logging {
                        warn!(
                            event = %pending.event,
                            timeout_ms =
                                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                            "Wait timed out"
                        );
                    }
                    Err(EventBusError::Timeout {
                        event: pending.event.clone(),
                        timeout,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_resolves_with_args() {
        let bus = EventBus::new();
        let wait = bus.wait_for_timeout("done", Duration::from_millis(1000));

        let emitter = bus.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            emitter.emit("done", vec![json!(1), json!("ok")]).await
        });

        let args = wait.await.unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(args, vec![json!(1), json!("ok")]);
        assert_eq!(bus.handler_count("done"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_with_empty_args() {
        let bus = EventBus::new();
        let wait = bus.wait_for("done");

        bus.emit("done", vec![]).await.unwrap();
        assert!(wait.await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let bus = EventBus::new();
        let start = Instant::now();

        let err = bus
            .wait_for_timeout("done", Duration::from_millis(1000))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(
            err.to_string()
                .contains("waitFor(\"done\") timed out after 1000ms")
        );
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(bus.handler_count("done"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout() {
        let bus = EventBus::new();
        let start = Instant::now();

        let err = bus.wait_for("never").await.unwrap_err();

        assert_eq!(err.to_string(), "waitFor(\"never\") timed out after 5000ms");
        assert!(start.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_waits() {
        let bus = EventBus::new();
        let first = bus.wait_for_timeout("tick", Duration::from_millis(100));
        let second = bus.wait_for_timeout("tick", Duration::from_millis(100));
        assert_eq!(bus.handler_count("tick"), 2);

        bus.emit("tick", vec![json!("a")]).await.unwrap();
        let third = bus.wait_for_timeout("tick", Duration::from_millis(100));
        bus.emit("tick", vec![json!("b")]).await.unwrap();

        assert_eq!(first.await.unwrap(), vec![json!("a")]);
        assert_eq!(second.await.unwrap(), vec![json!("a")]);
        assert_eq!(third.await.unwrap(), vec![json!("b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_wait_removes_subscription() {
        let bus = EventBus::new();
        let wait = bus.wait_for_timeout("tick", Duration::from_millis(100));
        assert_eq!(bus.handler_count("tick"), 1);

        drop(wait);
        assert_eq!(bus.handler_count("tick"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_subscription_times_out() {
        let bus = EventBus::new();
        let wait = bus.wait_for_timeout("tick", Duration::from_millis(50));

        bus.clear();
        bus.emit("tick", vec![]).await.unwrap();

        assert!(wait.await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_unbounded_timeout_still_resolves() {
        let bus = EventBus::new();
        let wait = bus.wait_for_timeout("late", Duration::MAX);

        bus.emit("late", vec![json!(7)]).await.unwrap();
        assert_eq!(wait.await.unwrap(), vec![json!(7)]);
    }
}
