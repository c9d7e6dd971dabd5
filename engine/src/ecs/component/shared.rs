use std::{
    any::Any,
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};

use crate::ecs::{
    bitset::mix64,
    component::{Index, SharedComponent, shared_index_of},
    error::Result,
};

/// Object safe view of a shared component value.
trait ErasedShared: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn ErasedShared) -> bool;
    fn content_hash(&self) -> u64;
    fn debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<S: SharedComponent> ErasedShared for S {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn ErasedShared) -> bool {
        other
            .as_any()
            .downcast_ref::<S>()
            .is_some_and(|other| other == self)
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A type erased, reference counted shared component value.
///
/// Equality and hashing are by content, not by identity: two separately constructed but equal
/// values place entities in the same archetype. Cloning only bumps the reference count, so
/// every block of an archetype shares one instance.
#[derive(Clone)]
pub struct SharedValue {
    index: Index,
    name: &'static str,
    hash: u64,
    value: Arc<dyn ErasedShared>,
}

impl SharedValue {
    /// Wrap a shared component value. Fails if `S` was never registered.
    pub fn new<S: SharedComponent>(value: S) -> Result<Self> {
        let index = shared_index_of::<S>()?;
        let hash = value.content_hash();
        Ok(Self {
            index,
            name: std::any::type_name::<S>(),
            hash,
            value: Arc::new(value),
        })
    }

    /// The shared registry index of the value's kind.
    #[inline]
    pub fn index(&self) -> Index {
        self.index
    }

    /// The type name of the value's kind.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Hash of the value's content.
    #[inline]
    pub fn content_hash(&self) -> u64 {
        self.hash
    }

    /// Hash folded into an archetype's hash: the kind and the content together.
    #[inline]
    pub(crate) fn archetype_hash(&self) -> u64 {
        mix64(0x5348_4152_4544 ^ self.index.index() as u64) ^ mix64(self.hash)
    }

    /// Borrow the value as `S`, if it is one.
    #[inline]
    pub fn downcast_ref<S: SharedComponent>(&self) -> Option<&S> {
        self.value.as_any().downcast_ref::<S>()
    }

    /// True if both handles point at the same instance.
    #[inline]
    pub fn ptr_eq(&self, other: &SharedValue) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl PartialEq for SharedValue {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.hash == other.hash
            && (self.ptr_eq(other) || self.value.dyn_eq(other.value.as_ref()))
    }
}

impl Eq for SharedValue {}

impl Hash for SharedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.debug(f)
    }
}

#[cfg(test)]
mod tests {
    use rusty_macros::SharedComponent;

    use super::*;
    use crate::ecs::component::register_shared;

    #[derive(SharedComponent, Debug, Hash, PartialEq, Eq)]
    struct Material {
        name: String,
    }

    #[derive(SharedComponent, Debug, Hash, PartialEq, Eq)]
    struct Layer(u8);

    #[test]
    fn equality_is_by_content() {
        // Given
        register_shared::<Material>().unwrap();
        let stone = SharedValue::new(Material { name: "stone".into() }).unwrap();
        let stone_again = SharedValue::new(Material { name: "stone".into() }).unwrap();
        let wood = SharedValue::new(Material { name: "wood".into() }).unwrap();

        // Then
        assert!(!stone.ptr_eq(&stone_again));
        assert_eq!(stone, stone_again);
        assert_eq!(stone.content_hash(), stone_again.content_hash());
        assert_ne!(stone, wood);
        assert!(stone.ptr_eq(&stone.clone()));
    }

    #[test]
    fn downcast() {
        // Given
        register_shared::<Material>().unwrap();
        register_shared::<Layer>().unwrap();
        let layer = SharedValue::new(Layer(3)).unwrap();

        // Then
        assert_eq!(layer.downcast_ref::<Layer>(), Some(&Layer(3)));
        assert!(layer.downcast_ref::<Material>().is_none());
        assert_eq!(format!("{layer:?}"), "Layer(3)");
    }

    #[test]
    fn unregistered_kind_is_rejected() {
        // Given
        #[derive(SharedComponent, Debug, Hash, PartialEq, Eq)]
        struct Never;

        // Then
        assert!(matches!(
            SharedValue::new(Never),
            Err(crate::ecs::Error::UnknownComponentKind(_))
        ));
    }
}
