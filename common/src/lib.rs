//! Adlock Common Types
//!
//! This crate contains shared types used across the adlock workers,
//! including identifiers, the shared record, the error taxonomy and
//! the warm-up validity window.

pub mod identifiers;
pub mod record;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use record::*;
pub use error::*;
pub use time::*;
