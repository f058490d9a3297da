//! Storage abstractions for the chat gateway
//!
//! ## Available Backends
//!
//! - `memory`: In-memory storage using `parking_lot` locks (default)

mod memory;
mod traits;

pub use memory::*;
pub use traits::*;
