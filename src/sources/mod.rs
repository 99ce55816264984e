//! Built-in explorer sources

pub mod buffer;
