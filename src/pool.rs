//! Order Pool - fixed-capacity slot allocator for resting orders.
//!
//! The pool pre-allocates every order slot at startup, so steady-state
//! operation never touches the heap. Free slots are kept on a stack of
//! handles for O(1) acquire and release.

use std::fmt;

use crate::command::Owner;
use crate::error::SimError;

/// Sentinel value representing a null/invalid handle (like nullptr)
pub const NULL_HANDLE: u32 = u32::MAX;

/// Index of a slot in the pool - our "compressed pointer".
pub type OrderHandle = u32;

/// Expiration sentinel for orders that never expire (user orders).
pub const NEVER: u64 = u64::MAX;

/// Expiration sentinel for withdrawn orders; any sweep removes them.
pub const WITHDRAWN: u64 = 0;

/// A single resting order - 32 bytes, two per cache line.
///
/// # Memory Layout
///
/// | Field      | Type  | Offset | Size |
/// |------------|-------|--------|------|
/// | expires_at | u64   | 0      | 8    |
/// | price      | u32   | 8      | 4    |
/// | qty        | u32   | 12     | 4    |
/// | next       | u32   | 16     | 4    |
/// | owner      | u8    | 20     | 1    |
/// | live       | bool  | 21     | 1    |
/// | (padding)  | -     | 22     | 10   |
/// | **Total**  |       |        | 32   |
#[repr(C)]
#[repr(align(32))]
#[derive(Clone, Copy)]
pub struct OrderNode {
    /// Time (ns) at or after which the next sweep removes this order
    pub expires_at: u64,

    /// Price tick the order rests at
    pub price: u32,

    /// Remaining quantity to fill
    pub qty: u32,

    /// Next order at the same price (singly-linked, head-to-tail fill order)
    pub next: OrderHandle,

    pub owner: Owner,

    /// Set while the slot is off the free stack
    live: bool,
}

const _: () = assert!(
    std::mem::size_of::<OrderNode>() == 32,
    "OrderNode must be exactly 32 bytes (half a cache line)"
);

impl OrderNode {
    #[inline]
    pub const fn empty() -> Self {
        Self {
            expires_at: 0,
            price: 0,
            qty: 0,
            next: NULL_HANDLE,
            owner: Owner::System,
            live: false,
        }
    }

    /// True once `now` has reached the expiration time.
    #[inline]
    pub const fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }

    #[inline]
    pub const fn is_live(&self) -> bool {
        self.live
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("price", &self.price)
            .field("qty", &self.qty)
            .field("expires_at", &self.expires_at)
            .field("owner", &self.owner)
            .field("next", &self.next)
            .finish()
    }
}

/// Pre-allocated order storage with a stack of free handles.
pub struct OrderPool {
    /// Contiguous block of pre-allocated slots
    nodes: Vec<OrderNode>,

    /// Handles of unused slots; the top is handed out next
    free: Vec<OrderHandle>,
}

impl OrderPool {
    /// Create a pool with `capacity` slots, all free.
    ///
    /// # Panics
    /// Panics if capacity is `u32::MAX` (reserved for [`NULL_HANDLE`]).
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_HANDLE, "Capacity must be less than NULL_HANDLE");

        let nodes = vec![OrderNode::empty(); capacity as usize];
        // Reversed so slot 0 is acquired first
        let free = (0..capacity).rev().collect();

        Self { nodes, free }
    }

    /// Take a free slot and populate it.
    ///
    /// # Complexity
    /// O(1) - pops from the free stack
    #[inline]
    pub fn acquire(
        &mut self,
        price: u32,
        qty: u32,
        expires_at: u64,
        owner: Owner,
    ) -> Result<OrderHandle, SimError> {
        let handle = self.free.pop().ok_or(SimError::PoolExhausted {
            capacity: self.capacity(),
        })?;

        self.nodes[handle as usize] = OrderNode {
            expires_at,
            price,
            qty,
            next: NULL_HANDLE,
            owner,
            live: true,
        };

        Ok(handle)
    }

    /// Return a slot to the free stack.
    ///
    /// The handle must not be used again until it is re-acquired.
    ///
    /// # Complexity
    /// O(1) - pushes onto the free stack
    #[inline]
    pub fn release(&mut self, handle: OrderHandle) {
        debug_assert!(self.nodes[handle as usize].live, "Double release of slot {}", handle);

        self.nodes[handle as usize] = OrderNode::empty();
        self.free.push(handle);
    }

    #[inline]
    pub fn get(&self, handle: OrderHandle) -> &OrderNode {
        debug_assert!(handle < self.capacity(), "Handle out of bounds");
        &self.nodes[handle as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, handle: OrderHandle) -> &mut OrderNode {
        debug_assert!(handle < self.capacity(), "Handle out of bounds");
        &mut self.nodes[handle as usize]
    }

    /// True if the handle refers to an acquired slot.
    #[inline]
    pub fn is_live(&self, handle: OrderHandle) -> bool {
        self.nodes
            .get(handle as usize)
            .map_or(false, OrderNode::is_live)
    }

    /// Number of slots currently acquired.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.capacity() - self.free.len() as u32
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.nodes.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free.len() == self.nodes.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Handles currently on the free stack, top last.
    pub fn free_handles(&self) -> &[OrderHandle] {
        &self.free
    }

    /// Pre-fault all memory pages (warm-up routine).
    ///
    /// Touches every slot so the first steps do not take page faults.
    pub fn warm_up(&mut self) {
        for node in &mut self.nodes {
            // Volatile write to prevent optimization
            unsafe {
                std::ptr::write_volatile(&mut node.qty, node.qty);
            }
        }
    }
}

impl fmt::Debug for OrderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderPool")
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_node_size() {
        assert_eq!(std::mem::size_of::<OrderNode>(), 32);
        assert_eq!(std::mem::align_of::<OrderNode>(), 32);
    }

    #[test]
    fn test_pool_creation() {
        let pool = OrderPool::new(100);
        assert_eq!(pool.capacity(), 100);
        assert_eq!(pool.allocated(), 0);
        assert!(!pool.is_full());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_acquire_release() {
        let mut pool = OrderPool::new(3);

        let h0 = pool.acquire(100, 5, NEVER, Owner::System).unwrap();
        let h1 = pool.acquire(101, 6, NEVER, Owner::System).unwrap();
        let h2 = pool.acquire(102, 7, NEVER, Owner::User).unwrap();
        assert_eq!((h0, h1, h2), (0, 1, 2));

        assert_eq!(pool.allocated(), 3);
        assert!(pool.is_full());
        assert_eq!(
            pool.acquire(103, 1, NEVER, Owner::System),
            Err(SimError::PoolExhausted { capacity: 3 })
        );

        pool.release(h1);
        assert_eq!(pool.allocated(), 2);
        assert!(!pool.is_live(h1));

        // Reuses the slot just released
        let h3 = pool.acquire(104, 8, 50, Owner::System).unwrap();
        assert_eq!(h3, h1);
        assert_eq!(pool.get(h3).price, 104);
        assert_eq!(pool.get(h3).qty, 8);

        pool.release(h0);
        pool.release(h2);
        pool.release(h3);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_release_resets_slot() {
        let mut pool = OrderPool::new(2);
        let h = pool.acquire(100, 5, 77, Owner::User).unwrap();
        pool.get_mut(h).next = 1;
        pool.release(h);

        let node = pool.get(h);
        assert_eq!(node.qty, 0);
        assert_eq!(node.next, NULL_HANDLE);
        assert_eq!(node.owner, Owner::System);
        assert!(!node.is_live());
    }

    #[test]
    fn test_is_expired() {
        let mut pool = OrderPool::new(2);
        let h = pool.acquire(100, 5, 1_000, Owner::System).unwrap();
        assert!(!pool.get(h).is_expired(999));
        assert!(pool.get(h).is_expired(1_000));

        pool.get_mut(h).expires_at = WITHDRAWN;
        assert!(pool.get(h).is_expired(0));
    }

    #[test]
    fn test_is_live_out_of_range() {
        let pool = OrderPool::new(2);
        assert!(!pool.is_live(NULL_HANDLE));
    }

    #[test]
    fn test_pool_warm_up() {
        let mut pool = OrderPool::new(1000);
        pool.warm_up(); // Should not panic
    }
}
