//! Daedalos Core - Shared functionality for all Daedalos tools
//!
//! Standard filesystem locations and display formatting.

pub mod format;
pub mod paths;

pub use paths::Paths;
