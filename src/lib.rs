pub mod bot;
pub mod config;
pub mod error;
pub mod media;
pub mod messages;
pub mod requests;
pub mod ui;
