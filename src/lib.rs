pub mod adapter;
pub mod config;
pub mod devices;
pub mod geometry;
pub mod guide;
pub mod platform;
pub mod settings;
pub mod web;

pub use adapter::{Adapter, AdapterOptions, Session};
pub use config::Config;
