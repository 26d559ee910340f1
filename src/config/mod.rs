//! Configuration parsing and types.
//!
//! - `types` - Core config structure (`Config` and its sections)
//! - `duration` - Human duration strings (`"500ms"`, `"5s"`, `"1m"`)
//! - `parser` - YAML config loading
//! - `validation` - Config validation

pub mod duration;
mod parser;
mod types;
mod validation;

pub use duration::{format_duration, parse_duration_string};
pub use parser::*;
pub use types::*;
