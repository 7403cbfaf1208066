//! Server entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SerialServer`] | Configured server, ready to start |
//! | [`SerialServerBuilder`] | Fluent configuration builder |
//! | [`ServerConfig`] | Bind address and behavior settings |
//! | [`RunningServer`] | Handle to a listening server |
//!
//! # Example
//!
//! ```no_run
//! use serial_bridge::{Result, SerialServer};
//!
//! # async fn example() -> Result<()> {
//! let running = SerialServer::builder().build()?.start().await?;
//! tokio::signal::ctrl_c().await?;
//! running.stop().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for server configuration.
pub mod builder;

/// Settings.
pub mod config;

/// Server coordinator.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SerialServerBuilder;
pub use config::{DEFAULT_HOST, DEFAULT_PORT, ServerConfig};
pub use core::{RunningServer, SerialServer};
