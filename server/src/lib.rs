pub extern crate actix_web;

pub mod connection;
mod connection_tx_storage;
pub mod edit;
pub mod handlers;
pub mod options;
pub mod query;
pub mod registry;
pub mod server;
pub mod store;
pub mod watcher;
