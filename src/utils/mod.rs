// Utility functions for opflow

pub mod date;

pub use date::*;
