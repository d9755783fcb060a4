//! In-process async event bus
//!
//! Components register interest in named events; publishers notify every
//! interested party and get back a single report of whatever failed.
//!
//! ## Features
//!
//! - **Priorities** - Higher-priority handlers run first, ties keep registration order
//! - **Once handlers** - Removed automatically after their first invocation
//! - **Wildcard** - Subscribe to every event, receiving the event name first
//! - **Failure isolation** - A failing or panicking handler never stops the others
//! - **Deadline waits** - Await the next emission of an event with a timeout
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relay_events::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::new();
//!
//!     let welcome = Handler::new(|args| async move {
//!         let email: String = arg(&args, 0)?;
//!         println!("Sending welcome email to {}", email);
//!         Ok(())
//!     });
//!
//!     let handle = bus.on("user_created", welcome);
//!     bus.emit("user_created", vec![json!("alice@example.com")]).await?;
//!
//!     handle.unsubscribe();
//!     Ok(())
//! }
//! ```
//!
//! ## Priorities and Once Handlers
//!
//! ```rust,ignore
//! bus.on_with_priority("order_placed", audit, 100);
//! bus.on("order_placed", notify);
//! bus.once("order_placed", first_order_bonus);
//! ```
//!
//! ## Wildcard
//!
//! ```rust,ignore
//! // Receives ("order_placed", ...original args) for every emission
//! bus.on("*", Handler::sync(|args| {
//!     println!("event: {}", args[0]);
//!     Ok(())
//! }));
//! ```
//!
//! ## Error Handling
//!
//! ```rust,ignore
//! match bus.emit("order_placed", vec![json!(42)]).await {
//!     Ok(()) => println!("All handlers succeeded"),
//!     Err(EventBusError::HandlersFailed { errors, .. }) => {
//!         eprintln!("Some handlers failed: {:?}", errors);
//!     }
//!     Err(e) => eprintln!("Publish error: {}", e),
//! }
//! ```
//!
//! ## Waiting for an Event
//!
//! ```rust,ignore
//! let ready = bus.wait_for_timeout("ready", Duration::from_secs(2));
//! // ... something emits "ready" ...
//! let args = ready.await?;
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! let bus = EventBusBuilder::new()
//!     .enable_logging(false)
//!     .wildcard("*")
//!     .default_wait_timeout(Duration::from_secs(10))
//!     .build();
//!
//! // Or from RELAY_EVENTS_* environment variables
//! let bus = EventBus::from_env();
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod handler;
pub mod registry;
mod wait;

pub use bus::{EventBus, EventBusBuilder, SubscribeOptions, SubscriptionHandle};
pub use config::{DEFAULT_WAIT_TIMEOUT, DEFAULT_WILDCARD, EventBusConfig};
pub use error::{EventBusError, HandlerError};
pub use handler::{EventArgs, EventHandler, Handler, HandlerResult, arg};
pub use registry::SubscriptionId;
