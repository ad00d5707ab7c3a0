#![forbid(unsafe_code)]

pub mod config;
pub mod objects;

#[cfg(feature = "client")]
pub mod client;
