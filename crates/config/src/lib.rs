//! # EBFT Configuration
//!
//! Configuration parsing and validation for EBFT validator nodes.
//!
//! All node settings live in one `ebft.toml` file. Every section has defaults,
//! so an empty file is a valid configuration for a local devnet.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ebft_config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("ebft.toml"))?;
//! println!("Revolt timeout: {}ms", config.revolt.timeout_ms);
//! ```
//!
//! ## Configuration Sections
//!
//! - `[chain]` - Validator set and this node's identity
//! - `[revolt]` - Revolt deadline and fast-revolt settings
//! - `[heartbeat]` - Heartbeat gate settings
//! - `[sync]` - Round-progress loop timing
//! - `[packet_cache]` - Inbound packet cache bounds
//! - `[logging]` - Logging settings (level, format)
//! - `[devnet]` - In-process test network settings

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod config;
mod error;

pub use config::*;
pub use error::*;
