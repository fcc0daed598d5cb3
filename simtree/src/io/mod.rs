//! Side-effecting collaborators: storage, configuration, model backend, prompts.

pub mod config;
pub mod file_store;
pub mod memory_store;
pub mod model;
pub mod process;
pub mod prompt;
pub mod store;
