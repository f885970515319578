#![feature(unix_socket_peek)]

pub mod admin;
pub mod response;
mod transport;

pub use admin::AdminConnection;
pub use serde_yaml::Value;
