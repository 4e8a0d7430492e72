pub mod actor;
pub mod config;
pub mod error;
pub mod io;
