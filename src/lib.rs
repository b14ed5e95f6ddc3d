//! Folio - portfolio and blog backend with a guarded admin area
//!
//! This library provides the identity service, document and blob stores,
//! the client-side admin session guard and the HTTP API built on them.

pub mod api;
pub mod blob;
pub mod client;
pub mod config;
pub mod db;
pub mod identity;
pub mod models;
pub mod services;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;
