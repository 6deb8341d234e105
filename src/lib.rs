pub mod access;
pub mod auth;
pub mod build_info;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod output;
pub mod procedures;
pub mod rpc;
pub mod server;
pub mod store;
pub mod token;
