pub mod app;
pub mod cache;
pub mod config;
pub mod feed;
pub mod models;
pub mod pipeline;
pub mod state;
pub mod tmdb;
