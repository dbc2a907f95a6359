//! Shelf-facing IPMI command handlers.

pub mod handler;

pub use handler::PicmgHandler;
