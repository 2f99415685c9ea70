//! Pipeline Configuration Module
//!
//! Every threshold, timeout, and provider of the decision pipeline comes from
//! a TOML file; nothing is read from globals at decision time.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `CASCADE_CONFIG` environment variable (path to TOML file)
//! 3. `pipeline.toml` in the current working directory
//! 4. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! let config = PipelineConfig::load();
//! let orchestrator_config = config.orchestrator_config();
//! orchestrator_config.validate()?;
//! ```

mod pipeline_config;
pub mod defaults;
pub mod validation;

pub use pipeline_config::*;
