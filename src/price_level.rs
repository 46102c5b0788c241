//! Price Level - the queue of orders resting at a single tick.
//!
//! Implements a singly-linked list through pool handles. The tail handle is
//! cached so FIFO insertion stays O(1); fills always consume from the head.

use crate::config::TieBreak;
use crate::pool::{OrderHandle, OrderNode, OrderPool, NULL_HANDLE};

/// A queue of orders at a specific price tick.
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    /// First order to fill
    pub head: OrderHandle,
    /// Last order to fill
    pub tail: OrderHandle,
    /// Total quantity across all orders at this level
    pub total_qty: u64,
    /// Number of orders at this level
    pub count: u32,
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceLevel {
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NULL_HANDLE,
            tail: NULL_HANDLE,
            total_qty: 0,
            count: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.head == NULL_HANDLE
    }

    /// Link an order according to the tie-break policy.
    #[inline]
    pub fn insert(&mut self, pool: &mut OrderPool, handle: OrderHandle, policy: TieBreak) {
        match policy {
            TieBreak::HeadInsert => self.push_front(pool, handle),
            TieBreak::TailInsert => self.push_back(pool, handle),
        }
    }

    /// Append an order at the tail (fills after everything already queued).
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn push_back(&mut self, pool: &mut OrderPool, handle: OrderHandle) {
        let qty = pool.get(handle).qty;
        pool.get_mut(handle).next = NULL_HANDLE;

        if self.tail == NULL_HANDLE {
            debug_assert!(self.head == NULL_HANDLE);
            self.head = handle;
        } else {
            pool.get_mut(self.tail).next = handle;
        }
        self.tail = handle;

        self.count += 1;
        self.total_qty += qty as u64;
    }

    /// Prepend an order at the head (fills before everything already queued).
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn push_front(&mut self, pool: &mut OrderPool, handle: OrderHandle) {
        let qty = pool.get(handle).qty;
        pool.get_mut(handle).next = self.head;

        if self.head == NULL_HANDLE {
            self.tail = handle;
        }
        self.head = handle;

        self.count += 1;
        self.total_qty += qty as u64;
    }

    /// Unlink and return the head order.
    ///
    /// The slot is NOT released; the caller must do that.
    #[inline]
    pub fn pop_front(&mut self, pool: &mut OrderPool) -> Option<OrderHandle> {
        if self.head == NULL_HANDLE {
            return None;
        }

        let handle = self.head;
        let node = pool.get(handle);
        let next = node.next;
        let qty = node.qty;

        self.head = next;
        if next == NULL_HANDLE {
            self.tail = NULL_HANDLE;
        }

        self.count -= 1;
        self.total_qty -= qty as u64;
        pool.get_mut(handle).next = NULL_HANDLE;

        Some(handle)
    }

    #[inline]
    pub const fn peek_head(&self) -> OrderHandle {
        self.head
    }

    /// Update total quantity after a partial fill.
    ///
    /// Call this after reducing an order's qty in place.
    #[inline]
    pub fn subtract_qty(&mut self, qty: u32) {
        debug_assert!(self.total_qty >= qty as u64);
        self.total_qty -= qty as u64;
    }

    /// Remove and release every order with `expires_at <= now`.
    ///
    /// Survivors keep their relative order. `on_release` sees each removed
    /// order before its slot goes back to the pool. Returns the number
    /// removed.
    pub fn sweep_expired<F>(&mut self, pool: &mut OrderPool, now: u64, mut on_release: F) -> u32
    where
        F: FnMut(OrderHandle, &OrderNode),
    {
        let mut removed = 0;
        let mut prev = NULL_HANDLE;
        let mut curr = self.head;

        while curr != NULL_HANDLE {
            let node = *pool.get(curr);
            let next = node.next;

            if node.is_expired(now) {
                if prev == NULL_HANDLE {
                    self.head = next;
                } else {
                    pool.get_mut(prev).next = next;
                }
                if self.tail == curr {
                    self.tail = prev;
                }

                self.count -= 1;
                self.total_qty -= node.qty as u64;

                on_release(curr, &node);
                pool.release(curr);
                removed += 1;
            } else {
                prev = curr;
            }

            curr = next;
        }

        removed
    }

    /// Iterate the queued handles head-to-tail.
    pub fn handles<'a>(&self, pool: &'a OrderPool) -> LevelIter<'a> {
        LevelIter {
            pool,
            curr: self.head,
        }
    }
}

/// Head-to-tail iterator over a level's handles.
pub struct LevelIter<'a> {
    pool: &'a OrderPool,
    curr: OrderHandle,
}

impl Iterator for LevelIter<'_> {
    type Item = OrderHandle;

    #[inline]
    fn next(&mut self) -> Option<OrderHandle> {
        if self.curr == NULL_HANDLE {
            return None;
        }
        let handle = self.curr;
        self.curr = self.pool.get(handle).next;
        Some(handle)
    }
}
