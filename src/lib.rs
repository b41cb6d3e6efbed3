//! Static file server that serves a fixed document root over HTTP/1.x and
//! stamps permissive cross-origin headers on every response.

pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;

pub use config::Config;
pub use server::{Server, ServerHandle, Shutdown};
