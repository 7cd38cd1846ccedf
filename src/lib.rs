pub mod auth;
pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod iot;
pub mod model;
pub mod server;
pub mod weather;
