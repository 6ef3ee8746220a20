//! Core domain concepts shared across all subdomains.
//!
//! - [`error::DomainError`]: history invariant violations
//! - [`error::ArgumentParseError`]: tool-call arguments that are not a JSON object

pub mod error;
