//! # Observability
//!
//! Structured logging via `tracing`. Library code only emits events; the
//! embedding application decides where they go.
//!
//! ```rust,ignore
//! use r4w_phy::observe::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production());
//! tracing::info!("PHY pipeline started");
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
