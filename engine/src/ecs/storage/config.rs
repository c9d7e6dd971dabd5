use crate::ecs::storage::alloc::SizeClass;

/// Tuning knobs for a world's storage.
///
/// ```rust,ignore
/// let config = Config::default()
///     .with_growth_block(SizeClass::Kb128)
///     .with_check_thread(true);
/// let world = World::with_config(config);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    first_block: SizeClass,
    growth_block: SizeClass,
    units_per_slab: usize,
    check_thread: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first_block: SizeClass::Kb16,
            growth_block: SizeClass::Kb64,
            units_per_slab: 16,
            check_thread: cfg!(debug_assertions),
        }
    }
}

impl Config {
    /// Size class of the first block of every archetype.
    #[inline]
    pub fn first_block(&self) -> SizeClass {
        self.first_block
    }

    /// Size class of every later block of an archetype.
    #[inline]
    pub fn growth_block(&self) -> SizeClass {
        self.growth_block
    }

    /// Units per allocator slab.
    #[inline]
    pub fn units_per_slab(&self) -> usize {
        self.units_per_slab
    }

    /// Whether structural operations verify they run on the world's mutator thread.
    #[inline]
    pub fn check_thread(&self) -> bool {
        self.check_thread
    }

    pub fn with_first_block(mut self, class: SizeClass) -> Self {
        self.first_block = class;
        self
    }

    pub fn with_growth_block(mut self, class: SizeClass) -> Self {
        self.growth_block = class;
        self
    }

    pub fn with_units_per_slab(mut self, units: usize) -> Self {
        self.units_per_slab = units.max(1);
        self
    }

    pub fn with_check_thread(mut self, check: bool) -> Self {
        self.check_thread = check;
        self
    }
}
