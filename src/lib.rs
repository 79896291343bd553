//! Read-through cache gateway for a small Kubernetes demo service.
//!
//! Datasets are read from a document store, cached in a Redis-compatible
//! store for a fixed lifetime, and served over HTTP together with a probe of
//! both backends.

pub mod cache;
pub mod command;
pub mod config;
pub mod dataset;
pub mod document;
pub mod error;
pub mod gateway;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod probe;
pub mod redis;
pub mod resp_value;
pub mod server;
pub mod state;
pub mod store;

pub use config::Config;
pub use gateway::{Fetched, Gateway, Source};
pub use state::State;
