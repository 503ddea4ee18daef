use crate::core::models::Frame;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use thiserror::Error;

/// Lower bound of the cache memory budget.
pub const MIN_CACHE_BUDGET_BYTES: u64 = 4 * 1024 * 1024;

/// Number of cache frames for a trajectory, derived from the configured
/// memory budget.
///
/// The budget is clamped to `[4 MiB, physical_ram / 4]` (the upper clamp is
/// skipped when the physical RAM is unknown), divided by the per-frame
/// coordinate footprint, and capped by the trajectory's actual frame count.
/// At least one frame is always granted.
pub fn frame_capacity(
    budget_bytes: u64,
    physical_ram_bytes: Option<u64>,
    atom_count: usize,
    trajectory_frames: usize,
) -> usize {
    let ceiling = physical_ram_bytes
        .map(|ram| (ram / 4).max(MIN_CACHE_BUDGET_BYTES))
        .unwrap_or(u64::MAX);
    let budget = budget_bytes.clamp(MIN_CACHE_BUDGET_BYTES, ceiling);
    let frame_bytes = (atom_count.max(1) * 3 * size_of::<f32>()) as u64;
    let by_budget = (budget / frame_bytes).max(1) as usize;
    by_budget.min(trajectory_frames.max(1))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("All {capacity} cache slots are pinned or being decoded")]
    Saturated { capacity: usize },
}

enum SlotEntry {
    /// Reserved; the decode is in flight. Requests for this frame wait.
    Pending,
    Ready(Arc<Frame>),
}

struct Slot {
    entry: SlotEntry,
    /// Number of outstanding locks (including a pending reservation).
    pins: usize,
    last_use: u64,
    /// Configuration generation the entry was decoded under.
    generation: u64,
}

struct CacheState {
    slots: HashMap<usize, Slot>,
    tick: u64,
    generation: u64,
}

struct CacheShared {
    capacity: usize,
    state: Mutex<CacheState>,
    ready: Condvar,
}

impl CacheShared {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded store of decoded frames, keyed by frame index.
///
/// Safe for concurrent use: lookups pin entries via RAII [`FrameLock`]
/// guards, misses hand out a [`FrameReservation`] that the caller populates,
/// and concurrent requests for a frame whose decode is in flight wait for
/// the result instead of decoding again. Eviction picks the least recently
/// used unpinned entry; when every slot is pinned or pending, reservation
/// fails with [`CacheError::Saturated`] rather than exceeding capacity.
///
/// Invalidation is generation-based: [`FrameCache::invalidate`] bumps the
/// generation, dropping unpinned entries immediately while pinned entries
/// survive until their last lock is released.
pub struct FrameCache {
    shared: Arc<CacheShared>,
}

/// Outcome of a cache lookup.
pub enum CacheQuery {
    /// The frame is resident; no decode is needed.
    Hit(FrameLock),
    /// The slot is reserved for the caller, which must `publish` a decoded
    /// frame (or drop the reservation on decode failure).
    Miss(FrameReservation),
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                capacity: capacity.max(1),
                state: Mutex::new(CacheState {
                    slots: HashMap::new(),
                    tick: 0,
                    generation: 0,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Live capacity in frames; not necessarily the trajectory length.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of occupied slots (resident or in-flight).
    pub fn len(&self) -> usize {
        self.shared.lock_state().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up `index`, pinning the entry on a hit or reserving a slot on a
    /// miss. Blocks while another caller is decoding the same frame.
    pub fn find_or_reserve(&self, index: usize) -> Result<CacheQuery, CacheError> {
        let shared = &self.shared;
        let mut state = shared.lock_state();

        loop {
            state.tick += 1;
            let tick = state.tick;
            let generation = state.generation;

            enum Found {
                Hit(Arc<Frame>),
                InFlight,
                StaleFree,
                Absent,
            }

            let found = match state.slots.get_mut(&index) {
                Some(slot) if slot.generation == generation => match &slot.entry {
                    SlotEntry::Ready(frame) => {
                        slot.pins += 1;
                        slot.last_use = tick;
                        Found::Hit(frame.clone())
                    }
                    SlotEntry::Pending => Found::InFlight,
                },
                // A stale entry that is still pinned occupies the key; wait
                // for its release just like an in-flight decode.
                Some(slot) if slot.pins > 0 => Found::InFlight,
                Some(_) => Found::StaleFree,
                None => Found::Absent,
            };

            match found {
                Found::Hit(frame) => {
                    return Ok(CacheQuery::Hit(FrameLock {
                        shared: shared.clone(),
                        index,
                        frame,
                    }));
                }
                Found::InFlight => {
                    state = shared
                        .ready
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                    continue;
                }
                Found::StaleFree => {
                    state.slots.remove(&index);
                }
                Found::Absent => {}
            }

            if state.slots.len() >= shared.capacity && !evict_one(&mut state) {
                return Err(CacheError::Saturated {
                    capacity: shared.capacity,
                });
            }

            state.slots.insert(
                index,
                Slot {
                    entry: SlotEntry::Pending,
                    pins: 1,
                    last_use: tick,
                    generation,
                },
            );
            return Ok(CacheQuery::Miss(FrameReservation {
                shared: shared.clone(),
                index,
                published: false,
            }));
        }
    }

    /// Invalidates every entry. Unpinned entries drop immediately; pinned
    /// entries are dropped when their last lock is released.
    pub fn invalidate(&self) {
        let mut state = self.shared.lock_state();
        state.generation += 1;
        state.slots.retain(|_, slot| slot.pins > 0);
        self.shared.ready.notify_all();
    }
}

/// Drops the least recently used unpinned resident entry. Pending or pinned
/// slots are never evicted.
fn evict_one(state: &mut CacheState) -> bool {
    let victim = state
        .slots
        .iter()
        .filter(|(_, slot)| slot.pins == 0 && matches!(slot.entry, SlotEntry::Ready(_)))
        .min_by_key(|(_, slot)| slot.last_use)
        .map(|(&index, _)| index);
    match victim {
        Some(index) => {
            state.slots.remove(&index);
            true
        }
        None => false,
    }
}

fn release_pin(shared: &CacheShared, index: usize) {
    let mut state = shared.lock_state();
    let current_generation = state.generation;
    if let Some(slot) = state.slots.get_mut(&index) {
        slot.pins = slot.pins.saturating_sub(1);
        if slot.pins == 0 && slot.generation != current_generation {
            state.slots.remove(&index);
        }
    }
    shared.ready.notify_all();
}

/// Shared read access to a resident frame. The entry cannot be evicted while
/// any lock for it is alive.
pub struct FrameLock {
    shared: Arc<CacheShared>,
    index: usize,
    frame: Arc<Frame>,
}

impl FrameLock {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl Deref for FrameLock {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameLock {
    fn drop(&mut self) {
        release_pin(&self.shared, self.index);
    }
}

/// Exclusive right to populate a reserved slot.
///
/// Dropping an unpublished reservation aborts the reservation: the slot is
/// vacated and waiting readers retry (one of them becomes the new
/// reserver), so a failed decode never wedges the cache.
pub struct FrameReservation {
    shared: Arc<CacheShared>,
    index: usize,
    published: bool,
}

impl FrameReservation {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Stores the decoded frame and converts the reservation into a lock on
    /// it. Readers waiting for this frame observe the result.
    pub fn publish(mut self, frame: Frame) -> FrameLock {
        self.published = true;
        let frame = Arc::new(frame);
        let mut state = self.shared.lock_state();
        if let Some(slot) = state.slots.get_mut(&self.index) {
            slot.entry = SlotEntry::Ready(frame.clone());
        }
        self.shared.ready.notify_all();
        drop(state);

        FrameLock {
            shared: self.shared.clone(),
            index: self.index,
            frame,
        }
    }
}

impl Drop for FrameReservation {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        let mut state = self.shared.lock_state();
        if let Some(slot) = state.slots.get(&self.index) {
            if matches!(slot.entry, SlotEntry::Pending) {
                state.slots.remove(&self.index);
            }
        }
        self.shared.ready.notify_all();
    }
}
