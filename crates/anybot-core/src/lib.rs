//! # anybot core
//!
//! The protocol gateway at the heart of anybot.
//!
//! Chat platform adapters report events to the gateway and receive
//! correlated actions back. This crate holds the state those exchanges need:
//!
//! - **Events**: validated inbound payloads ([`Event`])
//! - **Actions**: request/result wire types and sequence numbers ([`ActionRequest`], [`ActionResult`])
//! - **Correlation**: pending calls awaiting their result ([`ResultStore`])
//! - **Connections**: live adapter connections by adapter id ([`ConnectionRegistry`])
//! - **Event bus**: named publish/subscribe dispatch ([`EventBus`])
//! - **Gateway**: the context object tying them together ([`Gateway`])
//!
//! ```text
//! ┌─────────────┐  event   ┌─────────┐  emit   ┌───────────┐
//! │   Adapter   │─────────▶│ Gateway │────────▶│  Handler  │
//! │ (HTTP / WS) │◀─────────│         │◀────────│           │
//! └─────────────┘  action  └─────────┘  call   └───────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use anybot_core::{FnHandler, Gateway, GatewayConfig};
//! use serde_json::json;
//!
//! let gateway = Arc::new(Gateway::new(GatewayConfig::default()));
//! let handle = Arc::clone(&gateway);
//! gateway.bus().subscribe(
//!     "message.private",
//!     Arc::new(FnHandler::new(move |event| {
//!         let gateway = Arc::clone(&handle);
//!         async move {
//!             let _ = gateway.send(&event, json!("pong"), Default::default()).await;
//!             None
//!         }
//!     })),
//! );
//! ```

pub mod action;
pub mod bus;
pub mod context;
pub mod error;
pub mod event;
pub mod gateway;
pub mod registry;
pub mod store;

pub use action::{ActionRequest, ActionResult, Echo, MAX_SEQ, SequenceGenerator};
pub use bus::{EventBus, EventHandler, FnHandler, SubscriptionId};
pub use context::{current_adapter, spawn_in_context};
pub use error::{ApiError, ApiResult, AuthError, EventError, EventResult};
pub use event::Event;
pub use gateway::{Gateway, GatewayConfig, QUICK_OPERATION_ACTION, SyncApi};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use store::{PendingCall, ResultStore};

// Re-export async_trait for handler implementations
pub use async_trait::async_trait;
