//! Library exports for todotron, shared between the binary and tests.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod gate;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod routes;
pub mod session;
pub mod startup;
pub mod state;
pub mod utils;
pub mod workspace;
