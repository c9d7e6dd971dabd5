//! A chunked, archetype based entity component store.
//!
//! Entities with the same set of components (and the same shared component values) live in
//! fixed capacity memory blocks, one column per component kind. See [`ecs`] for the full API.

// Allow the derive macros to refer to `::rusty_blocks` from inside this crate.
extern crate self as rusty_blocks;

pub mod ecs;
pub mod log;
