//! # anybot transport
//!
//! Inbound transports for the anybot gateway, built on axum.
//!
//! | Path | Method | Purpose |
//! |------|--------|---------|
//! | `/` | `POST` | Signed webhook event reports |
//! | `/ws`, `/ws/event`, `/ws/api` | `GET` | Reverse WebSocket connections |
//!
//! Webhook bodies are checked against the configured secret, handshakes
//! against the configured access token. Both feed the [`Gateway`] event bus;
//! reverse connections are also registered as action routes.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use anybot_core::{Gateway, GatewayConfig};
//! use anybot_transport::{DEFAULT_WS_PATHS, build_router, serve};
//! use tokio_util::sync::CancellationToken;
//!
//! let gateway = Arc::new(Gateway::new(GatewayConfig::default()));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! serve(listener, build_router(gateway, &DEFAULT_WS_PATHS), CancellationToken::new()).await?;
//! ```
//!
//! [`Gateway`]: anybot_core::Gateway

pub mod auth;
mod http;
mod server;
mod ws;

pub use server::{DEFAULT_WS_PATHS, build_router, serve};
