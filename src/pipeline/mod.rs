//! Decision Pipeline
//!
//! ## Cycle Architecture
//!
//! ```text
//! STAGE 1: Validation (synchronous, every observation)
//! STAGE 2: Baseline Lookup (ONLY if aggregate confidence ≥ threshold)
//! STAGE 3: Reasoning Cascade (ONLY if a baseline was obtained and budget remains)
//! STAGE 4: Emission (exactly once per non-superseded cycle)
//! ```
//!
//! Every stage shares one deadline measured from the observation's capture
//! time. A newer observation supersedes the in-flight cycle at any point
//! after validation; superseded cycles emit nothing.

mod orchestrator;
mod stats;
pub mod processing_loop;
pub mod source;

pub use orchestrator::{
    Collaborators, CycleStart, CycleState, CycleTicket, DecisionOrchestrator, PendingCycle,
    StageOutcome,
};
pub use processing_loop::ProcessingLoop;
pub use source::{ObservationEvent, ObservationSource, ReplaySource, StdinSource};
pub use stats::PipelineStats;
