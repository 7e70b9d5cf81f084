//! Portable, exact scaled dot-product attention.
//!
//! This path favours clarity over performance and provides the numeric
//! result the generated hardware is checked against.

pub mod exact;

pub use exact::ExactAttention;
