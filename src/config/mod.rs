//! Configuration management
//!
//! Node settings come from defaults, an optional TOML file and environment
//! overrides, in that order. The resulting `Config` is an ordinary value
//! passed to the node; there is no process-wide configuration.

pub mod settings;

pub use settings::Config;
