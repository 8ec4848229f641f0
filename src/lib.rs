pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod graphql;
pub mod state;
pub mod users;
