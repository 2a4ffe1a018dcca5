//! Common utilities for the junction toolkit

pub mod error;

pub use error::{suggest_correction, Error, Result};
