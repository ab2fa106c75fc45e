// Library exports for the inbox-digest crate
// This allows tests and the binary to use the modules

pub mod classifier;
pub mod config;
pub mod database;
pub mod email;
pub mod error;
pub mod feed;
pub mod html;
pub mod imap_client;
pub mod ollama_client;
pub mod server;
pub mod watermark;
