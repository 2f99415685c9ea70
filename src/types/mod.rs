//! Data model shared by the validator, cascade, and orchestrator.
//!
//! ```text
//! Observation → ValidatedObservation → ReasoningRequest → ReasoningResult
//!                                    ↘ DecisionEvent (Decision | Uncertain | Degraded)
//! ```

mod decision;
mod observation;

pub use decision::*;
pub use observation::*;
