//! Client-side core of the devhub community site: a TTL read-through cache,
//! a like toggle that keeps a counter consistent with its existence rows, a
//! best-effort aggregator over remote feeds, and the facades built on them.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod globe;
pub mod services;
pub mod store;
pub mod toggle;

pub use error::{Error, Result};
