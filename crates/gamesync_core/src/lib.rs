pub mod collections;
pub mod config;
pub mod dates;
pub mod error;
pub mod game;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod workspace;
