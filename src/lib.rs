//! Ovograde grades physical egg measurements (height, width, weight) into
//! quality classes with a small feed-forward network, and searches for a good
//! hidden-layer configuration with a genetic algorithm.
//!
//! The evolution engine in [`evolution`] is the heart of the crate; the
//! [`network`] and [`data`] modules are the collaborators it scores against.

pub mod config;
pub mod data;
pub mod evolution;
pub mod export;
pub mod network;
