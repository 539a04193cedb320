//! Concrete implementations of the AIProvider trait

pub mod workers_ai;

pub use workers_ai::WorkersAiProvider;
