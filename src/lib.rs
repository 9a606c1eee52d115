pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod grapher;
pub mod output;
pub mod table;
