//! Shared setup code for the sedge binaries.

pub mod common;
