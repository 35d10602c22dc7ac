//! Fixed-capacity generational slot arena.
//!
//! Pipelines and meshes live in [`SlotArena`]s owned by the
//! [`Context`](crate::context::Context). Handing out an id never allocates
//! beyond the configured capacity and a released slot is recycled through a
//! free list, so both allocation and release are O(1).
//!
//! - fresh slots are handed out in ascending order (0, 1, 2, ...)
//! - every id carries the generation of its slot; releasing a slot bumps the
//!   generation so that stale ids are rejected by every lookup
//! - a slot can be reserved before its value exists and filled (or released)
//!   once the fallible construction of that value has finished

use std::fmt;

use crate::error::EngineError;

/// Handle into a [`SlotArena`]: slot index plus the slot generation at the
/// time the id was handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// What a [`SlotArena`] stores. Only used to make errors and logs readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Pipeline,
    Mesh,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Pipeline => write!(f, "pipeline"),
            SlotKind::Mesh => write!(f, "mesh"),
        }
    }
}

/// Typed id of a pipeline slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub(crate) SlotId);

/// Typed id of a mesh slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) SlotId);

impl PipelineId {
    pub fn slot(&self) -> SlotId {
        self.0
    }
}

impl MeshId {
    pub fn slot(&self) -> SlotId {
        self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline {}", self.0)
    }
}

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh {}", self.0)
    }
}

#[derive(Debug)]
enum SlotState<T> {
    Vacant,
    Reserved,
    Occupied(T),
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

#[derive(Debug)]
pub struct SlotArena<T> {
    kind: SlotKind,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    capacity: usize,
    live: usize,
}

impl<T> SlotArena<T> {
    pub fn with_capacity(kind: SlotKind, capacity: usize) -> Self {
        Self {
            kind,
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            live: 0,
        }
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of reserved or occupied slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn is_full(&self) -> bool {
        self.live >= self.capacity
    }

    /// Marks the next unused slot as taken without storing a value yet.
    ///
    /// Recycled slots are preferred over fresh ones. The slot has to be
    /// [`fill`](Self::fill)ed or [`release`](Self::release)d afterwards; until
    /// then lookups treat it as absent.
    pub fn reserve(&mut self) -> Result<SlotId, EngineError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.state = SlotState::Reserved;
            self.live += 1;
            return Ok(SlotId {
                index,
                generation: slot.generation,
            });
        }
        if self.slots.len() >= self.capacity {
            return Err(EngineError::SlotsExhausted {
                kind: self.kind,
                capacity: self.capacity,
            });
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            state: SlotState::Reserved,
        });
        self.live += 1;
        Ok(SlotId {
            index,
            generation: 0,
        })
    }

    /// Stores `value` in a slot previously handed out by [`reserve`](Self::reserve).
    ///
    /// Returns `false` and drops the value if `id` does not name a reserved slot.
    pub fn fill(&mut self, id: SlotId, value: T) -> bool {
        match self.slot_mut(id) {
            Some(slot) if matches!(slot.state, SlotState::Reserved) => {
                slot.state = SlotState::Occupied(value);
                true
            }
            _ => false,
        }
    }

    /// Allocates a slot and stores `value` in it.
    pub fn insert(&mut self, value: T) -> Result<SlotId, EngineError> {
        let id = self.reserve()?;
        self.fill(id, value);
        Ok(id)
    }

    /// Frees a reserved or occupied slot and returns its value, if any.
    ///
    /// The slot generation is bumped so `id` and all copies of it go stale.
    pub fn release(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slot_mut(id)?;
        let previous = std::mem::replace(&mut slot.state, SlotState::Vacant);
        let value = match previous {
            SlotState::Vacant => return None,
            SlotState::Reserved => None,
            SlotState::Occupied(value) => Some(value),
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        value
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        match &slot.state {
            SlotState::Occupied(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        match &mut self.slot_mut(id)?.state {
            SlotState::Occupied(value) => Some(value),
            _ => None,
        }
    }

    /// Occupied slots in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.state {
                SlotState::Occupied(value) => Some((
                    SlotId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )),
                _ => None,
            })
    }

    pub fn ids(&self) -> Vec<SlotId> {
        self.iter().map(|(id, _)| id).collect()
    }

    fn slot_mut(&mut self, id: SlotId) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
    }
}
