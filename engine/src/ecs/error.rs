//! Error types for the ECS store.
//!
//! Every failure here is local and synchronous: the operation that reports it has not modified
//! any storage. The only soft failure in the crate (a duplicate component registration) is
//! logged rather than returned.

use std::fmt;

use thiserror::Error;

use crate::ecs::entity::Entity;

/// The kind of column access requested from a block accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::Write => write!(f, "write"),
        }
    }
}

/// Errors raised while building the process wide component registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// More kinds were registered than a [`BitSet256`](crate::ecs::BitSet256) can represent.
    #[error("cannot register {kind}: registry is full ({capacity} kinds)")]
    Overflow {
        kind: &'static str,
        capacity: usize,
    },

    /// Block buffers are 32 byte aligned, so no column can require more than that.
    #[error("component {component} requires alignment {align}, blocks only guarantee 32")]
    UnsupportedAlignment {
        component: &'static str,
        align: usize,
    },
}

/// Errors returned by entity, component and query operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The entity is not live: destroyed, never created or a stale handle.
    #[error("entity {0} is not live")]
    InvalidEntity(Entity),

    /// The entity's archetype does not contain the requested plain component.
    #[error("component {0} not found")]
    ComponentNotFound(&'static str),

    /// The entity's archetype does not contain the requested shared component.
    #[error("shared component {0} not found")]
    SharedComponentNotFound(&'static str),

    /// A block accessor was asked for a column its query never declared.
    #[error("illegal {mode} access to {component}: not declared by the query")]
    IllegalAccess {
        component: &'static str,
        mode: AccessMode,
    },

    /// A structural operation was called off the world's mutator thread.
    #[error("structural change attempted off the mutator thread")]
    ThreadAccess,

    /// Adding a kind the archetype already has, or removing one it lacks.
    #[error("invalid archetype edit for {component}: {reason}")]
    InvalidArchetypeEdit {
        component: &'static str,
        reason: &'static str,
    },

    /// The component type was never registered.
    #[error("component kind {0} was never registered")]
    UnknownComponentKind(&'static str),

    /// A single entity of this archetype does not fit into the largest block size class.
    #[error("archetype needs {bytes_per_entity} bytes per entity, larger than any block")]
    ArchetypeTooLarge { bytes_per_entity: usize },

    /// A recorded byte payload does not match the registered component size.
    #[error("payload for {component} is {actual} bytes, expected {expected}")]
    ComponentSizeMismatch {
        component: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Convenience result type for ECS operations.
pub type Result<T> = std::result::Result<T, Error>;
