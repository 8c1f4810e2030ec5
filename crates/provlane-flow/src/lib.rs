//! # Provlane Flow
//!
//! Derived views over an ordered provenance event stream:
//! 1. [`graph::ProvenanceGraph`], the agent/step/tool-call/observation graph
//! 2. [`timeline::TimelineProjector`], per-agent swimlanes of range and point items
//! 3. [`trace::SessionTrace`], one session's metadata, event log and both views
//!
//! Both views are pure state machines driven by event order, so replaying a
//! [`proof_of_work::ProofOfWork`] from empty state rebuilds them exactly.

pub mod error;
pub mod export;
pub mod graph;
pub mod proof_of_work;
pub mod renderer;
pub mod timeline;
pub mod trace;
pub mod utils;

pub use error::*;
pub use export::GraphFormat;
pub use graph::*;
pub use proof_of_work::*;
pub use timeline::*;
pub use trace::*;
