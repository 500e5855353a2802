//! Port traits. API boundaries for the hexagon.
//!
//! Outbound only: the library is called into directly and calls out to a store.

pub mod outbound;

pub use outbound::{Filter, ModelStore, ModelStoreExt};
