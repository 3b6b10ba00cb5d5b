//! The relay: registry, history and broadcast wired together

pub mod facade;

pub use facade::Relay;
