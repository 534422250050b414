//! Shared foundational types used across the Ripple incremental build engine.
//!
//! This crate provides content hashing, compilation unit identifiers, and the
//! common internal result type.

#![warn(missing_docs)]

pub mod hash;
pub mod result;
pub mod unit;

pub use hash::{ContentHash, ContentHasher};
pub use result::{InternalError, RippleResult};
pub use unit::UnitId;
