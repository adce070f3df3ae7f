//! ytm4a shared core: job models, registry, fetch worker, progress feed and
//! artifact handoff used by the API server and the fetch engine.
pub mod engine;
pub mod errors;
pub mod feed;
pub mod handoff;
pub mod models;
pub mod progress;
pub mod registry;
pub mod sanitize;
pub mod worker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
