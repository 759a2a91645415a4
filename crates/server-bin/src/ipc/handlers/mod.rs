//! Gateway handler implementations.
//!
//! Handlers are thin: extract params, call the registry, map the result.

pub mod doc;
pub mod health;
pub mod user;
