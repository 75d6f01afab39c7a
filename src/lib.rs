pub mod agent;
pub mod config;
pub mod error;
pub mod server;
pub mod shutdown;
pub mod webhook;
pub mod workflow;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;
