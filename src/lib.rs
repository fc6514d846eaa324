pub mod bundle;
pub mod commands;
pub mod config;
pub mod connector;
pub mod connectors;
pub mod error;
pub mod facade;
pub mod logging;
pub mod pool;
pub mod protocol;
pub mod remote;
pub mod script;
pub mod security;
pub mod server;

#[cfg(test)]
pub mod test_utils;
