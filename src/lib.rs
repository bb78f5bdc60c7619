//! Offline-first client core for the PowerBack incident-reporting platform.

pub mod assets;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod realtime;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;
