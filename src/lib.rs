//! Keeps a local application state in sync with one remote JSON document
//! per data domain.

pub mod storage;
pub mod sync;
