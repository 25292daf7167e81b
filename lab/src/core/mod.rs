//! Deterministic, pure logic shared by the lab.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod blocks;
pub mod naming;
pub mod repair;
pub mod types;
pub mod verdict;
