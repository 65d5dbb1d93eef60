//! Collaborator traits for the EBFT round-progress loop.
//!
//! The consensus crate depends on these traits rather than on concrete
//! network or block implementations, which keeps it testable with scripted
//! collaborators.
//!
//! ```ignore
//! use ebft_core::{BlockEngine, Clock, StatusTransport};
//!
//! fn drive<T: StatusTransport, E: BlockEngine>(transport: T, engine: E, clock: &dyn Clock) {
//!     // any transport, any engine, any time source
//! }
//! ```

mod clock;
mod engine;
mod transport;

pub use clock::*;
pub use engine::*;
pub use transport::*;
