// src/lib.rs

pub mod api;
pub mod cache;
pub mod characters;
pub mod chats;
pub mod completion;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod settings;
pub mod worldinfo;

pub use errors::{ParleyError, ParleyResult};
