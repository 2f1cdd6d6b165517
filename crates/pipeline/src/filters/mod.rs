//! Filter implementations for the candidate pipeline.
//!
//! This module contains all the concrete filter implementations
//! that can be composed into a FilterPipeline.

pub mod already_rated;
pub mod dedup;
pub mod known_item;

pub use already_rated::AlreadyRatedFilter;
pub use dedup::DedupFilter;
pub use known_item::KnownItemFilter;
