//! Dramatis is a terminal chat client for conversing with configurable AI
//! characters through the OpenRouter gateway.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the wire payloads for the `/models` and
//!   `/chat/completions` endpoints.
//! - [`core`] owns the HTTP client, the streaming decoder, credential
//!   storage, configuration, the session state machine, and the default
//!   character seeder.
//! - [`store`] persists characters, conversations, and ordered messages to a
//!   local JSON file with cascading deletes.
//! - [`cli`] is the thin terminal frontend.
//!
//! The runtime entrypoint lives in the binary crate (`src/main.rs`) and
//! routes through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod store;
pub mod utils;
