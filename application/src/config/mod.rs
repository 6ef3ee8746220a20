//! Application configuration
//!
//! - [`ExecutionParams`]: tool-loop limits and retry policy

pub mod execution_params;

pub use execution_params::ExecutionParams;
