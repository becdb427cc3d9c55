pub mod error;
pub mod filter;
pub mod gateway;
pub mod handlers;
pub mod server;
pub mod store;
pub mod types;
pub mod value;
pub mod wire;
