pub mod chat_stream;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod seed;
pub mod session;
