pub mod cluster;
pub mod config;
mod error;
pub mod host;
pub mod host_set;
pub mod metrics;
pub mod policy;
pub mod runtime;
pub mod subset;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
