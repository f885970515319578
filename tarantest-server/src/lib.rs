pub mod controller;
pub mod port;

pub use controller::TarantoolServer;
