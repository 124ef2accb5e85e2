pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod import;
pub mod output;
pub mod registry;
pub mod riot;
pub mod store;
