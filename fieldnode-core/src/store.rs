//! Bookmarked Ring Store for Records, Log Entries and Topic Lists
//!
//! ## Overview
//!
//! `RecordStore<T>` is the one sequential container the firmware uses for
//! everything it keeps in order: averaged sensor records, the recent-log
//! buffer and the MQTT topic list. It owns its items by value in a single
//! `VecDeque`, appends at the tail and evicts at the head.
//!
//! ## Capacity Modes
//!
//! - **Fixed(n)**: storage for `n` items is reserved up front. Appending to a
//!   full store evicts the oldest item first, so the store always holds the
//!   `n` most recent items.
//! - **Adaptive**: the store grows as long as the allocator can satisfy it.
//!   When a reservation fails the oldest item is evicted instead, so a
//!   memory-starved device degrades to ring behaviour rather than aborting.
//!
//! ## Cursors
//!
//! Readers traverse the store with [`Cursor`] values they own. A cursor holds
//! the *sequence number* of the item it points at, not a slot index:
//!
//! ```text
//! sequence:   17   18   19   20          first_seq = 17
//! slot:      [ 0 ][ 1 ][ 2 ][ 3 ]
//!                   ↑
//!            cursor(seq = 18)
//!
//! after one eviction:
//! sequence:        18   19   20   21     first_seq = 18
//! slot:           [ 0 ][ 1 ][ 2 ][ 3 ]
//!                   ↑
//!            cursor(seq = 18) still names the same item
//! ```
//!
//! Eviction therefore never moves a cursor to a different item. A cursor
//! whose item has been evicted simply stops resolving and reads as "no
//! data". Because cursors live outside the store, any number of readers can
//! traverse concurrently (a live view and a CSV dump, two HTTP pulls) without
//! disturbing each other.
//!
//! ## Example
//!
//! ```
//! use fieldnode_core::store::{Capacity, Cursor, RecordStore};
//!
//! let mut store = RecordStore::new(Capacity::fixed(3).unwrap());
//! for t in [10, 20, 30, 40] {
//!     store.append(t);
//! }
//! assert_eq!(store.iter().copied().collect::<Vec<_>>(), vec![20, 30, 40]);
//!
//! let mut cursor = Cursor::oldest_first();
//! store.reset_cursor(&mut cursor);
//! let mut seen = Vec::new();
//! while let Some(item) = store.current(&cursor) {
//!     seen.push(*item);
//!     store.advance(&mut cursor);
//! }
//! assert_eq!(seen, vec![20, 30, 40]);
//! ```

use alloc::collections::VecDeque;
use core::num::NonZeroUsize;

/// Capacity policy of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Capacity {
    /// At most `n` items, oldest evicted first
    Fixed(NonZeroUsize),
    /// Grow until memory runs out
    Adaptive,
}

impl Capacity {
    /// Fixed capacity, `None` for zero
    pub const fn fixed(n: usize) -> Option<Self> {
        match NonZeroUsize::new(n) {
            Some(n) => Some(Self::Fixed(n)),
            None => None,
        }
    }
}

/// Resumable traversal position into a [`RecordStore`]
///
/// Cheap to copy. Holds either a sequence number or nothing ("unset").
/// `pin_latest` decides where [`RecordStore::reset_cursor`] puts it: on the
/// newest item for live views, on the oldest for full exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    position: Option<u64>,
    pin_latest: bool,
}

impl Cursor {
    /// Unset cursor that resets to the newest item
    pub const fn latest() -> Self {
        Self { position: None, pin_latest: true }
    }

    /// Unset cursor that resets to the oldest item
    pub const fn oldest_first() -> Self {
        Self { position: None, pin_latest: false }
    }

    /// Whether the cursor currently names an item
    ///
    /// A set cursor can still fail to resolve if its item was evicted.
    pub fn is_set(&self) -> bool {
        self.position.is_some()
    }

    /// Whether resets go to the newest item
    pub fn pins_latest(&self) -> bool {
        self.pin_latest
    }

    /// Drop the position
    pub fn unset(&mut self) {
        self.position = None;
    }
}

/// Sequential store with head eviction and sequence-numbered cursors
///
/// ## Internal Invariants
///
/// - `items[i]` has sequence number `first_seq + i`
/// - sequence numbers are never reused, so a stale cursor cannot alias a
///   newer item
/// - in `Fixed(n)` mode `items.len() <= n`
#[derive(Debug, Clone)]
pub struct RecordStore<T> {
    items: VecDeque<T>,
    capacity: Capacity,
    first_seq: u64,
}

impl<T> RecordStore<T> {
    /// Create an empty store
    ///
    /// Fixed stores reserve their full capacity immediately so steady-state
    /// appends never allocate.
    pub fn new(capacity: Capacity) -> Self {
        let items = match capacity {
            Capacity::Fixed(n) => VecDeque::with_capacity(n.get()),
            Capacity::Adaptive => VecDeque::new(),
        };
        Self { items, capacity, first_seq: 0 }
    }

    /// Append at the tail, returning the evicted item if one had to go
    ///
    /// O(1) amortized. Any cursor pointing at the evicted item stops
    /// resolving; all other cursors keep naming the same item.
    pub fn append(&mut self, item: T) -> Option<T> {
        let evicted = match self.capacity {
            Capacity::Fixed(n) if self.items.len() >= n.get() => self.evict_oldest(),
            Capacity::Fixed(_) => None,
            Capacity::Adaptive => {
                if self.items.try_reserve(1).is_err() {
                    log_warn!("store allocation failed at {} items, evicting oldest", self.items.len());
                    self.evict_oldest()
                } else {
                    None
                }
            }
        };
        self.items.push_back(item);
        evicted
    }

    fn evict_oldest(&mut self) -> Option<T> {
        let evicted = self.items.pop_front();
        if evicted.is_some() {
            self.first_seq += 1;
        }
        evicted
    }

    /// Number of stored items
    pub fn size(&self) -> usize {
        self.items.len()
    }

    /// Whether the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum items for fixed stores, current allocation for adaptive ones
    pub fn capacity(&self) -> usize {
        match self.capacity {
            Capacity::Fixed(n) => n.get(),
            Capacity::Adaptive => self.items.capacity(),
        }
    }

    /// Whether the store grows on demand
    pub fn is_adaptive(&self) -> bool {
        matches!(self.capacity, Capacity::Adaptive)
    }

    /// Capacity policy
    pub fn capacity_mode(&self) -> Capacity {
        self.capacity
    }

    /// Most recently appended item
    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest retained item
    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Item by logical index, 0 = oldest
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Mutable iteration oldest to newest
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> + ExactSizeIterator {
        self.items.iter_mut()
    }

    /// First item matching `predicate`, oldest first
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| predicate(item))
    }

    /// Drop every item; all cursors stop resolving
    pub fn clear(&mut self) {
        self.first_seq += self.items.len() as u64;
        self.items.clear();
    }

    fn end_seq(&self) -> u64 {
        self.first_seq + self.items.len() as u64
    }

    fn slot(&self, seq: u64) -> Option<usize> {
        if seq >= self.first_seq && seq < self.end_seq() {
            Some((seq - self.first_seq) as usize)
        } else {
            None
        }
    }

    /// Position `cursor` at `offset_from_end` items in from the chosen end
    ///
    /// With `pin_latest` the offset counts back from the newest item,
    /// otherwise forward from the oldest. The choice is remembered for later
    /// resets. An empty store or an offset past the other end leaves the
    /// cursor unset.
    pub fn set_cursor(&self, cursor: &mut Cursor, offset_from_end: usize, pin_latest: bool) {
        cursor.pin_latest = pin_latest;
        cursor.position = if offset_from_end >= self.items.len() {
            None
        } else if pin_latest {
            Some(self.end_seq() - 1 - offset_from_end as u64)
        } else {
            Some(self.first_seq + offset_from_end as u64)
        };
    }

    /// Put `cursor` back on its preferred end
    pub fn reset_cursor(&self, cursor: &mut Cursor) {
        self.set_cursor(cursor, 0, cursor.pin_latest);
    }

    /// New cursor already positioned
    pub fn cursor_at(&self, offset_from_end: usize, pin_latest: bool) -> Cursor {
        let mut cursor = Cursor { position: None, pin_latest };
        self.set_cursor(&mut cursor, offset_from_end, pin_latest);
        cursor
    }

    /// Item under the cursor, `None` if unset or evicted
    pub fn current(&self, cursor: &Cursor) -> Option<&T> {
        cursor
            .position
            .and_then(|seq| self.slot(seq))
            .and_then(|slot| self.items.get(slot))
    }

    /// Move one item toward the newest
    ///
    /// Returns whether the cursor now names an item. Stepping past the
    /// newest item, or advancing a cursor whose item was evicted, unsets it:
    /// the traversal has ended.
    pub fn advance(&self, cursor: &mut Cursor) -> bool {
        match cursor.position {
            Some(seq) if self.slot(seq).is_some() && seq + 1 < self.end_seq() => {
                cursor.position = Some(seq + 1);
                true
            }
            _ => {
                cursor.position = None;
                false
            }
        }
    }

    /// Move one item toward the oldest
    ///
    /// Same end-of-traversal rules as [`advance`](Self::advance).
    pub fn retreat(&self, cursor: &mut Cursor) -> bool {
        match cursor.position {
            Some(seq) if self.slot(seq).is_some() && seq > self.first_seq => {
                cursor.position = Some(seq - 1);
                true
            }
            _ => {
                cursor.position = None;
                false
            }
        }
    }
}
