// molecule/pool.rs
// Generic object pool with slot recycling.
//
// Free slots live in `dead[..topd]`. Slots handed out since the last commit
// sit in `dead[topd..]` until `commit` reports them as newborn. Released
// slots wait in a graveyard so that indices stay valid for the rest of the
// current step.

use crate::error::{SimError, SimResult};

#[derive(Clone, Debug)]
pub struct Pool<T> {
    items: Vec<T>,
    dead: Vec<usize>,
    topd: usize,
    graveyard: Vec<usize>,
    max_items: usize,
    what: &'static str,
}

impl<T: Default> Pool<T> {
    pub fn new(what: &'static str, max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            dead: Vec::new(),
            topd: 0,
            graveyard: Vec::new(),
            max_items,
            what,
        }
    }

    pub fn with_capacity(what: &'static str, initial: usize, max_items: usize) -> SimResult<Self> {
        let mut pool = Self::new(what, max_items);
        pool.grow_to(initial.min(max_items))?;
        Ok(pool)
    }

    fn grow_to(&mut self, new_cap: usize) -> SimResult<()> {
        let cap = self.items.len();
        if new_cap <= cap {
            return Ok(());
        }
        if new_cap > self.max_items {
            return Err(SimError::OutOfMemory { what: self.what, cap: self.max_items });
        }
        self.items.resize_with(new_cap, T::default);
        // New free slots go below topd, lowest index on top of the stack.
        let fresh: Vec<usize> = (cap..new_cap).rev().collect();
        let added = fresh.len();
        self.dead.splice(0..0, fresh);
        self.topd += added;
        Ok(())
    }

    fn grow(&mut self) -> SimResult<()> {
        let cap = self.items.len();
        if cap >= self.max_items {
            return Err(SimError::OutOfMemory { what: self.what, cap: self.max_items });
        }
        self.grow_to((cap * 2).max(1).min(self.max_items))
    }

    /// Hand out a free slot, reset to its default value.
    pub fn acquire(&mut self) -> SimResult<usize> {
        if self.topd == 0 {
            self.grow()?;
        }
        self.topd -= 1;
        let idx = self.dead[self.topd];
        self.items[idx] = T::default();
        Ok(idx)
    }

    /// Queue a slot for reuse after the next commit.
    pub fn release(&mut self, idx: usize) {
        debug_assert!(idx < self.items.len());
        self.graveyard.push(idx);
    }

    /// Slots handed out since the last commit, removed from the dead list.
    pub fn take_born(&mut self) -> Vec<usize> {
        self.dead.split_off(self.topd)
    }

    /// Return graveyard slots to the free list.
    pub fn flush(&mut self) {
        self.dead.truncate(self.topd);
        self.dead.append(&mut self.graveyard);
        self.topd = self.dead.len();
    }

    /// `take_born` followed by `flush`.
    pub fn commit(&mut self) -> Vec<usize> {
        let born = self.take_born();
        self.flush();
        born
    }

    pub fn get(&self, idx: usize) -> &T {
        &self.items[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut T {
        &mut self.items[idx]
    }

    /// Length of the dead list, including newborn slots above `topd`.
    pub fn nd(&self) -> usize {
        self.dead.len()
    }

    /// Number of free slots.
    pub fn topd(&self) -> usize {
        self.topd
    }

    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Slots neither free nor waiting in the graveyard.
    pub fn in_use(&self) -> usize {
        self.items.len() - self.topd - self.graveyard.len()
    }
}
