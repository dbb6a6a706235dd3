//! Domain inventory dashboard with TLS certificate probing
//!
//! - `store` - JSON flat-file list of domain records
//! - `tls` - certificate prober with one port fallback
//! - `server` - HTTP API, `/metrics` and the UI shell
//! - `sweep` - periodic probe of every tracked domain
//! - `cli` - command line parsing and startup

pub mod cli;
pub mod metrics;
pub mod server;
pub mod store;
pub mod sweep;
pub mod tls;
