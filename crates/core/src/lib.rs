//! # EBFT Core - Collaborator Contracts
//!
//! This crate defines the interfaces between the EBFT round-progress loop and
//! the systems around it:
//!
//! - **Transport**: delivery of already-authenticated peer packets
//! - **Block engine**: block production, validation and commit
//! - **Clock**: the time source behind status serials and deadlines
//!
//! # Design Philosophy
//!
//! 1. **Non-blocking calls**: the round-progress loop never waits on a
//!    collaborator. Engine requests are fire-and-forget; their outcomes come
//!    back as [`EngineEvent`]s drained on the next tick.
//!
//! 2. **Injected time**: nothing in the consensus crates calls the system clock
//!    directly, so every decision can be replayed with a [`ManualClock`].
//!
//! 3. **Minimal dependencies**: only the shared types crate and `bytes`.
//!
//! # Swappable Components
//!
//! | Component | Trait | Provided |
//! |-----------|-------|----------|
//! | Network | `StatusTransport` | in-process hub (devnet) |
//! | Blocks | `BlockEngine` | simulated chain (devnet) |
//! | Time | `Clock` | `SystemClock`, `ManualClock` |

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod traits;

pub use traits::{
    // Clock
    Clock, ManualClock, SystemClock,
    // Block engine
    BlockEngine, EngineError, EngineEvent, EngineResult,
    // Transport
    InboundPacket, StatusTransport, TransportError, TransportResult,
};
