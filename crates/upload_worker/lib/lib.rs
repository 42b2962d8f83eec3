pub mod build_info;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod logging;
pub mod server;
pub mod staging;
pub mod state;
pub mod store;
pub mod upload_service;
pub mod workspace_client;
