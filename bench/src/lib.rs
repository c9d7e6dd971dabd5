//! Benchmark utilities for the block store.
//!
//! Microbenchmarks measure individual store operations in isolation: entity creation and
//! destruction, column iteration (sequential, fragmented and parallel), and structural moves.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench -p rusty_bench
//!
//! # Run specific benchmark group
//! cargo bench -p rusty_bench -- create
//! ```
//!
//! Results are written to `target/criterion/` with HTML reports for visualization.

pub mod components;
