//! # Provlane Types
//!
//! Canonical provenance event model shared by the graph builder, the
//! timeline projector and the live distribution server.
//!
//! Events arrive as untyped JSON records. [`EventRecord::parse`] validates
//! the required fields for each recognized kind, normalizes tool calls and
//! keeps every other field so records stay forward-compatible on the wire.

pub mod constants;
pub mod error;
pub mod event;
pub mod session;

pub use error::*;
pub use event::*;
pub use session::*;
