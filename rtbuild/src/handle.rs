//! Opaque, generation-stamped resource handles.
//!
//! Every live builder and parallel operation occupies a slot in a
//! [`HandleRegistry`]. A handle stores the slot index plus the slot's generation
//! at creation time; destroying the resource bumps the generation, so a stale
//! handle (double destroy, use after destroy) is reported as an invalid
//! argument instead of touching freed state. Generation `0` is reserved for the
//! null handle.

use crate::error::{Result, RtasError};
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    const NULL: Self = Self {
        index: 0,
        generation: 0,
    };

    fn is_null(&self) -> bool {
        self.generation == 0
    }
}

pub(crate) trait TypedHandle: Copy + std::fmt::Display {
    fn raw(self) -> RawHandle;
    fn from_raw(raw: RawHandle) -> Self;
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name(RawHandle);

        impl $name {
            /// The null handle; rejected by every entry point with `InvalidNullHandle`.
            pub const fn null() -> Self {
                Self(RawHandle::NULL)
            }

            pub fn is_null(&self) -> bool {
                self.0.is_null()
            }
        }

        impl TypedHandle for $name {
            fn raw(self) -> RawHandle {
                self.0
            }

            fn from_raw(raw: RawHandle) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    "{}({}v{})",
                    stringify!($name),
                    self.0.index,
                    self.0.generation
                )
            }
        }
    };
}

define_handle!(
    /// Handle to a builder, the capability token every build requires.
    BuilderHandle
);

define_handle!(
    /// Handle to one asynchronous build and its eventual result.
    ParallelOperationHandle
);

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    free: Vec<u32>,
}

/// Arena of live resources addressed by typed handles.
pub(crate) struct HandleRegistry<H, T> {
    slots: RwLock<Slots<T>>,
    _handle: PhantomData<fn() -> H>,
}

impl<H: TypedHandle, T> HandleRegistry<H, T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
            }),
            _handle: PhantomData,
        }
    }

    /// Stores `value` and returns a fresh handle to it.
    pub fn insert(&self, value: T) -> H {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let value = Some(Arc::new(value));

        if let Some(index) = slots.free.pop() {
            let slot = &mut slots.entries[index as usize];
            slot.value = value;
            return H::from_raw(RawHandle {
                index,
                generation: slot.generation,
            });
        }

        let index = slots.entries.len() as u32;
        slots.entries.push(Slot {
            generation: 1,
            value,
        });
        H::from_raw(RawHandle {
            index,
            generation: 1,
        })
    }

    /// Resolves a handle to its resource.
    ///
    /// Null handles report `InvalidNullHandle`; stale or foreign handles report
    /// `InvalidArgument`.
    pub fn get(&self, handle: H) -> Result<Arc<T>> {
        let raw = handle.raw();
        if raw.is_null() {
            return Err(RtasError::InvalidNullHandle);
        }

        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .entries
            .get(raw.index as usize)
            .filter(|slot| slot.generation == raw.generation)
            .and_then(|slot| slot.value.clone())
            .ok_or_else(|| RtasError::argument(format!("{handle} is not a live handle")))
    }

    /// Releases the resource behind `handle` and invalidates the handle.
    pub fn remove(&self, handle: H) -> Result<Arc<T>> {
        let raw = handle.raw();
        if raw.is_null() {
            return Err(RtasError::InvalidNullHandle);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let slot = slots
            .entries
            .get_mut(raw.index as usize)
            .filter(|slot| slot.generation == raw.generation && slot.value.is_some())
            .ok_or_else(|| RtasError::argument(format!("{handle} is not a live handle")))?;

        let value = slot.value.take();
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        slots.free.push(raw.index);

        value.ok_or_else(|| RtasError::argument(format!("{handle} is not a live handle")))
    }

    /// Number of live resources.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.entries.len() - slots.free.len()
    }
}
