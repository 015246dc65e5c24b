//! Real-time connection layer for the RoadCall roadside-assistance platform.
//!
//! One [`client::RealtimeClient`] owns one WebSocket connection for one user
//! role, reconnects with exponential backoff after failures, buffers outbound
//! messages while offline, and dispatches inbound messages to interest-based
//! subscribers.

// Core connection management
pub mod backoff;
pub mod client;
pub mod dispatch;
pub mod queue;

// Wire protocol and external seams
pub mod credentials;
pub mod protocol;
pub mod transport;

// Supporting modules
pub mod config;
pub mod error;

pub use client::{RealtimeClient, ReadyState};
pub use dispatch::Subscription;
pub use error::{RealtimeError, Result};
pub use protocol::{Frame, Role};
