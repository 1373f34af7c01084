//! Buffered device connection.
//!
//! This module provides the public [`Connection`] handle and the shared state
//! machine its transports report into.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent construction of built-in transports |
//! | `core` | State machine, buffers and generation gate |
//! | `handle` | Public [`Connection`] API |
//! | `listeners` | Ordered observer registries |
//! | `payload` | Wire payload and outbound value encoding |
//! | `state` | [`ConnectionState`] and [`Health`] |

// ============================================================================
// Submodules
// ============================================================================

/// Connection builder.
pub mod builder;

/// State machine and buffers.
mod core;

/// Public connection handle.
pub mod handle;

/// Observer registries.
mod listeners;

/// Payload types.
pub mod payload;

/// Connection states.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionBuilder;
pub use handle::Connection;
pub use payload::{OutboundValue, Payload};
pub use state::{ConnectionState, Health};

pub(crate) use self::core::ConnectionCore;
