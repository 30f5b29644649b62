//! Candidate path generation and ranking

pub mod enumerator;
pub mod ranker;

pub use enumerator::{PathEnumerator, DEFAULT_CANDIDATE_CAP};
pub use ranker::{Ranker, DEFAULT_TOP_K};
