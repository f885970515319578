#![allow(clippy::cargo_common_metadata)]

pub mod config;
pub mod endpoint;
pub mod error;

pub use config::Config;
pub use endpoint::{AddressingMode, Endpoint};
pub use error::{Error, Result};
