//! Pooled, fixed size block buffers.
//!
//! Block buffers are carved out of large slabs instead of being heap allocated one by one.
//! Each [`SizeClass`] has its own list of slabs; a slab holds `units_per_slab` units of that
//! class and tracks which are rented in a `FixedBitSet`.
//!
//! ```text
//! Kb16 slabs:  [ unit | unit | unit | ... ]   in_use: 1 1 0 ...
//!              [ unit | unit | unit | ... ]   in_use: 0 0 0 ...
//! Kb64 slabs:  [    unit    |    unit    | ... ]
//! ```
//!
//! A [`Rented`] unit hands its memory back when dropped. Returning a unit is O(1) and does not
//! zero it; blocks zero the memory they hand out themselves.

use std::{
    alloc::{self, Layout},
    fmt,
    ptr::NonNull,
    slice,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use fixedbitset::FixedBitSet;
use log::debug;

/// Alignment of every rented buffer.
pub const BLOCK_ALIGN: usize = 32;

/// The fixed set of block buffer sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeClass {
    Kb16,
    Kb32,
    Kb64,
    Kb128,
}

impl SizeClass {
    /// Every size class, smallest first.
    pub const ALL: [SizeClass; 4] = [
        SizeClass::Kb16,
        SizeClass::Kb32,
        SizeClass::Kb64,
        SizeClass::Kb128,
    ];

    /// The largest size class.
    pub const LARGEST: SizeClass = SizeClass::Kb128;

    /// Buffer length in bytes.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            SizeClass::Kb16 => 16 * 1024,
            SizeClass::Kb32 => 32 * 1024,
            SizeClass::Kb64 => 64 * 1024,
            SizeClass::Kb128 => 128 * 1024,
        }
    }

    #[inline]
    const fn slot(self) -> usize {
        self as usize
    }

    /// This class and every larger one, smallest first.
    pub fn and_larger(self) -> impl Iterator<Item = SizeClass> {
        SizeClass::ALL.into_iter().filter(move |class| *class >= self)
    }
}

/// One large allocation sliced into equally sized units.
struct Slab {
    ptr: NonNull<u8>,
    layout: Layout,
    in_use: FixedBitSet,
    rented: usize,
}

impl Slab {
    fn new(class: SizeClass, units: usize) -> Self {
        let layout = match Layout::from_size_align(class.bytes() * units, BLOCK_ALIGN) {
            Ok(layout) => layout,
            Err(_) => panic!("slab of {units} x {class:?} overflows the address space"),
        };
        // SAFETY: layout has a non zero size since units > 0.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        Self {
            ptr,
            layout,
            in_use: FixedBitSet::with_capacity(units),
            rented: 0,
        }
    }

    fn has_free(&self) -> bool {
        self.rented < self.in_use.len()
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        // SAFETY: allocated in `Slab::new` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

struct Inner {
    units_per_slab: usize,
    slabs: [Vec<Slab>; SizeClass::ALL.len()],
}

// SAFETY: slab memory is only reached through `Rented` handles, each of which owns its unit
// exclusively. The bookkeeping itself sits behind the allocator mutex.
unsafe impl Send for Inner {}

/// A pooling allocator of 32 byte aligned block buffers.
///
/// Cloning shares the pool. Rent and return may come from any thread; both take a short lock.
#[derive(Clone)]
pub struct BlockAllocator {
    inner: Arc<Mutex<Inner>>,
}

impl BlockAllocator {
    /// Create an empty pool whose slabs hold `units_per_slab` units each.
    pub fn new(units_per_slab: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                units_per_slab: units_per_slab.max(1),
                slabs: Default::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rent a buffer of exactly `class.bytes()` bytes.
    ///
    /// A new slab is allocated when every existing slab of the class is full. The unit is not
    /// zeroed: it holds whatever its previous renter left.
    pub fn rent(&self, class: SizeClass) -> Rented {
        let mut inner = self.lock();
        let units_per_slab = inner.units_per_slab;
        let slabs = &mut inner.slabs[class.slot()];

        let slab_index = match slabs.iter().position(Slab::has_free) {
            Some(index) => index,
            None => {
                slabs.push(Slab::new(class, units_per_slab));
                debug!(
                    "block allocator: new {class:?} slab #{} ({} units)",
                    slabs.len() - 1,
                    units_per_slab
                );
                slabs.len() - 1
            }
        };

        let slab = &mut slabs[slab_index];
        let Some(unit) = slab.in_use.zeroes().next() else {
            unreachable!("slab reported a free unit but has none");
        };
        slab.in_use.insert(unit);
        slab.rented += 1;

        // SAFETY: unit < units_per_slab, so the offset stays inside the slab allocation.
        let ptr = unsafe { NonNull::new_unchecked(slab.ptr.as_ptr().add(unit * class.bytes())) };

        Rented {
            ptr,
            class,
            slab: slab_index,
            unit,
            owner: Arc::clone(&self.inner),
        }
    }

    /// Number of slabs allocated for a class.
    pub fn slab_count(&self, class: SizeClass) -> usize {
        self.lock().slabs[class.slot()].len()
    }

    /// Number of units of a class currently rented.
    pub fn rented_count(&self, class: SizeClass) -> usize {
        self.lock().slabs[class.slot()]
            .iter()
            .map(|slab| slab.rented)
            .sum()
    }

    /// Units per slab.
    pub fn units_per_slab(&self) -> usize {
        self.lock().units_per_slab
    }
}

impl Default for BlockAllocator {
    fn default() -> Self {
        Self::new(super::Config::default().units_per_slab())
    }
}

impl fmt::Debug for BlockAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("BlockAllocator");
        for class in SizeClass::ALL {
            debug.field(
                &format!("{class:?}"),
                &(self.rented_count(class), self.slab_count(class)),
            );
        }
        debug.finish()
    }
}

/// An exclusively owned, 32 byte aligned buffer rented from a [`BlockAllocator`].
///
/// Dropping the handle returns the unit to its slab. The slab outlives the handle because the
/// handle keeps the pool alive.
pub struct Rented {
    ptr: NonNull<u8>,
    class: SizeClass,
    slab: usize,
    unit: usize,
    owner: Arc<Mutex<Inner>>,
}

// SAFETY: a rented unit is owned by exactly one handle, like a `Box<[u8]>`.
unsafe impl Send for Rented {}
// SAFETY: shared access only reads through `as_slice`.
unsafe impl Sync for Rented {}

impl Rented {
    /// The size class of this buffer.
    #[inline]
    pub fn class(&self) -> SizeClass {
        self.class
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.class.bytes()
    }

    /// Always false, a rented buffer is never empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Start of the buffer.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: slabs are zero initialised and only ever written with plain bytes, so the
        // whole unit is initialised. The unit is owned by this handle.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_slice`, and `&mut self` guarantees exclusivity.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }
}

impl Drop for Rented {
    fn drop(&mut self) {
        let mut inner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        let slab = &mut inner.slabs[self.class.slot()][self.slab];
        debug_assert!(slab.in_use.contains(self.unit), "double return of a block unit");
        slab.in_use.set(self.unit, false);
        slab.rented -= 1;
    }
}

impl fmt::Debug for Rented {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rented")
            .field("class", &self.class)
            .field("slab", &self.slab)
            .field("unit", &self.unit)
            .finish()
    }
}
