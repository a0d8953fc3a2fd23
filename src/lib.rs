//! Search a folder of photos for faces matching age and gender criteria,
//! optionally restricted to one trained reference person, using remote
//! face and vision services.

pub mod config;
pub mod error;
pub mod faces;
pub mod logging;
pub mod pipeline;
pub mod scanner;
pub mod services;
pub mod tasks;

pub use error::{FinderError, Result};
