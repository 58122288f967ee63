#![deny(unreachable_pub)]
pub mod config;
pub mod grid;
pub mod market;
pub mod runner;
pub mod strategy;

pub use grid::{GridConfig, GridError, GridResult, GridStrategy};
