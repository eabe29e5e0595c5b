#![forbid(unsafe_code)]

//! Domain model and unlock rule evaluator for course progression.
//!
//! Everything here is pure: the evaluator reads a loaded course graph and
//! a progress map and derives accessibility, never touching storage.

pub mod error;
pub mod model;
pub mod time;
pub mod unlock;

pub use error::Error;
pub use time::{Clock, fixed_now};
