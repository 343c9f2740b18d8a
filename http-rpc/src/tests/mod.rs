//! Test module for http-rpc
//!
//! Unit and property-based tests (proptest) covering the route builder,
//! router tree, dispatch pipeline, streaming and the error model.

#[cfg(test)]
pub mod fixtures;





#[cfg(test)]
pub mod error_tests;
