//! Asset graph access
//!
//! The engine only ever sees a [`Subgraph`] retrieved through the
//! [`GraphAccessor`] trait. [`InMemoryGraphStore`] is the bundled backend,
//! loaded from a JSON snapshot.

pub mod algo;
pub mod store;
pub mod subgraph;
pub mod traits;

pub use store::{GraphSnapshot, InMemoryGraphStore};
pub use subgraph::Subgraph;
pub use traits::GraphAccessor;
