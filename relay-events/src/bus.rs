//! Event Bus implementation

use crate::config::EventBusConfig;
use crate::error::{EventBusError, HandlerError};
use crate::handler::{EventArgs, Handler};
use crate::registry::{SubscriberList, SubscriptionId, SubscriptionRegistry};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Event bus for in-process event publishing and handling
#[derive(Clone)]
pub struct EventBus {
    /// Subscriber lists for every event name and the wildcard
    pub(crate) registry: Arc<SubscriptionRegistry>,

    /// Configuration
    pub(crate) config: Arc<EventBusConfig>,
}

/// Options for [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Higher runs earlier
    pub priority: i32,

    /// Remove after the first invocation attempt
    pub once: bool,
}

impl SubscribeOptions {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

impl EventBus {
    /// Create new event bus
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create event bus with custom config
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::new(config.wildcard.clone())),
            config: Arc::new(config),
        }
    }

    /// Create event bus configured from `RELAY_EVENTS_*` environment variables
    pub fn from_env() -> Self {
        Self::with_config(EventBusConfig::from_env())
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Reserved event name for wildcard subscribers
    pub fn wildcard(&self) -> &str {
        self.registry.wildcard_name()
    }

    /// Subscribe a handler to an event, or to every event via the wildcard
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let bus = EventBus::new();
    /// let handle = bus.subscribe("user_created", handler, SubscribeOptions::default().priority(10));
    /// handle.unsubscribe();
    /// ```
    pub fn subscribe(
        &self,
        event: &str,
        handler: Handler,
        options: SubscribeOptions,
    ) -> SubscriptionHandle {
        let id = self
            .registry
            .register(event, handler.clone(), options.priority, options.once);

        if self.config.enable_logging {
            debug!(
                event = %event,
                priority = options.priority,
                once = options.once,
                "Subscribed handler"
            );
        }

        SubscriptionHandle {
            registry: Arc::downgrade(&self.registry),
            event: event.to_string(),
            handler,
            id,
        }
    }

    /// Subscribe a handler at priority 0
    pub fn on(&self, event: &str, handler: Handler) -> SubscriptionHandle {
        self.subscribe(event, handler, SubscribeOptions::default())
    }

    /// Subscribe a handler at the given priority
    pub fn on_with_priority(
        &self,
        event: &str,
        handler: Handler,
        priority: i32,
    ) -> SubscriptionHandle {
        self.subscribe(event, handler, SubscribeOptions::default().priority(priority))
    }

    /// Subscribe a handler that is removed after its first invocation,
    /// whether it succeeded or not
    pub fn once(&self, event: &str, handler: Handler) -> SubscriptionHandle {
        self.subscribe(event, handler, SubscribeOptions::default().once())
    }

    /// Subscribe a once handler at the given priority
    pub fn once_with_priority(
        &self,
        event: &str,
        handler: Handler,
        priority: i32,
    ) -> SubscriptionHandle {
        self.subscribe(
            event,
            handler,
            SubscribeOptions::default().priority(priority).once(),
        )
    }

    /// Unsubscribe every registration of `handler` on `event`
    ///
    /// Unknown events and handlers are ignored. Returns the number of removed
    /// subscriptions.
    pub fn off(&self, event: &str, handler: &Handler) -> usize {
        let removed = self.registry.unregister(event, handler);

        if self.config.enable_logging && removed > 0 {
            debug!(event = %event, removed, "Unsubscribed handler");
        }

        removed
    }

    /// Publish an event
    ///
    /// Handlers for `event` run one after another in priority order, then
    /// wildcard handlers run with the event name prepended to `args`. A failing
    /// handler never stops the others; all failures are reported together once
    /// every handler has run.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let bus = EventBus::new();
    /// bus.emit("user_created", vec![json!({"id": 1})]).await?;
    /// ```
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), EventBusError> {
        // Emitting the wildcard name reaches wildcard subscribers once, as a
        // wildcard delivery.
        let specific = if self.registry.is_wildcard(event) {
            SubscriberList::default()
        } else {
            self.registry.snapshot(event)
        };
        if self.config.enable_logging {
            trace!(event = %event, handlers = specific.len(), "Publishing event");
        }

        if specific.is_empty() && self.registry.wildcard_snapshot().is_empty() {
            return Ok(());
        }

        let args: EventArgs = args.into();
        let mut errors = Vec::new();

        self.dispatch(event, event, specific, Arc::clone(&args), &mut errors)
            .await;

        // Taken after the specific pass, so wildcard subscribers added by
        // those handlers receive this emission too.
        let wildcard = self.registry.wildcard_snapshot();
        if !wildcard.is_empty() {
            let mut prefixed = Vec::with_capacity(args.len() + 1);
            prefixed.push(Value::String(event.to_string()));
            prefixed.extend(args.iter().cloned());

            let wildcard_name = self.registry.wildcard_name().to_string();
            self.dispatch(event, &wildcard_name, wildcard, prefixed.into(), &mut errors)
                .await;
        }

        if errors.is_empty() {
            return Ok(());
        }

        let err = EventBusError::HandlersFailed {
            event: event.to_string(),
            errors,
        };
        if self.config.enable_logging {
            error!(event = %event, failures = err.failures().len(), "{}", err);
        }
        Err(err)
    }

    /// Run one pass over a snapshot, then unregister the handlers of its fired
    /// `once` entries.
    async fn dispatch(
        &self,
        event: &str,
        list_name: &str,
        subscribers: SubscriberList,
        args: EventArgs,
        errors: &mut Vec<HandlerError>,
    ) {
        let mut fired_once: Vec<Handler> = Vec::new();

        for subscription in subscribers.iter() {
            if let Err(e) = subscription.handler().invoke(Arc::clone(&args)).await {
                if self.config.enable_logging {
                    warn!(
                        event = %event,
                        priority = subscription.priority(),
                        error = %e,
                        "Handler failed"
                    );
                }
                errors.push(e);
            }

            if subscription.is_once() {
                fired_once.push(subscription.handler().clone());
            }
        }

        let pruned: usize = fired_once
            .iter()
            .map(|handler| self.registry.unregister(list_name, handler))
            .sum();
        if self.config.enable_logging && pruned > 0 {
            debug!(event = %event, pruned, "Removed once handlers");
        }
    }

    /// Clear handlers for one event name
    ///
    /// Passing the wildcard name clears only the wildcard subscribers.
    pub fn clear_event(&self, event: &str) {
        self.registry.clear(Some(event));

        if self.config.enable_logging {
            debug!(event = %event, "Cleared event handlers");
        }
    }

    /// Clear all handlers, including wildcard subscribers
    pub fn clear(&self) {
        self.registry.clear(None);

        if self.config.enable_logging {
            info!("Cleared all event handlers");
        }
    }

    /// Get handler count for an event name (or the wildcard)
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry.count(event)
    }

    /// Whether emitting `event` would invoke any handler
    pub fn has_handlers(&self, event: &str) -> bool {
        self.registry.count(event) > 0 || !self.registry.wildcard_snapshot().is_empty()
    }

    /// Event names with at least one specific subscriber, sorted
    pub fn event_names(&self) -> Vec<String> {
        self.registry.event_names()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("events", &self.registry.event_names())
            .finish()
    }
}

/// Returned by every subscribe call
///
/// Dropping the handle keeps the subscription; call
/// [`unsubscribe`](SubscriptionHandle::unsubscribe) to remove it.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    registry: Weak<SubscriptionRegistry>,
    event: String,
    handler: Handler,
    id: SubscriptionId,
}

impl SubscriptionHandle {
    /// Remove every subscription of this handler on this event
    ///
    /// Matches by handler reference, so registering the same handler twice
    /// and unsubscribing once removes both. Returns the number removed; 0 if
    /// the bus is gone or nothing matched.
    pub fn unsubscribe(&self) -> usize {
        self.registry
            .upgrade()
            .map(|registry| registry.unregister(&self.event, &self.handler))
            .unwrap_or(0)
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Event bus builder
pub struct EventBusBuilder {
    config: EventBusConfig,
}

impl EventBusBuilder {
    /// Create new event bus builder
    pub fn new() -> Self {
        Self {
            config: EventBusConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: EventBusConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable/disable logging
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Set the wildcard event name
    pub fn wildcard(mut self, name: impl Into<String>) -> Self {
        self.config.wildcard = name.into();
        self
    }

    /// Set the default `wait_for` deadline
    pub fn default_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_wait_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Build the event bus
    pub fn build(self) -> EventBus {
        EventBus::with_config(self.config)
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
