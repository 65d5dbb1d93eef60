//! # EBFT Node
//!
//! Runs the EBFT round-progress loop for a validator.
//!
//! This crate wires configuration, transport, block engine and heartbeat source
//! into a [`SyncManager`](ebft_consensus::SyncManager) and drives it on a
//! dedicated thread. It also ships an in-process devnet for trying the
//! protocol end to end.
//!
//! ## Components
//!
//! - [`ValidatorWorker`] - thread ticking one round-progress loop
//! - [`Devnet`] - a whole network in one process
//! - [`node`] - configuration to loop wiring
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use ebft::Devnet;
//! use ebft_config::Config;
//!
//! let mut config = Config::default();
//! config.devnet.validators = 4;
//!
//! let devnet = Devnet::start(&config)?;
//! devnet.wait_for_blocks(5, Duration::from_secs(30));
//! devnet.stop()?;
//! # Ok::<(), ebft::NodeError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod devnet;
pub mod error;
pub mod node;
pub mod worker;

pub use devnet::{ChainRegistry, Devnet, LocalEngine, LocalHub, LocalTransport};
pub use error::{NodeError, NodeResult};
pub use worker::ValidatorWorker;

/// Version of the node
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "ebft.toml";
