pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod providers;
pub mod services;
pub mod tracker;
pub mod workers;
