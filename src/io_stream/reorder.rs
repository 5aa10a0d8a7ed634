use std::collections::BTreeMap;

use crate::block::FIRST_SEQUENCE;
use crate::error::{Error, Result};

/// Holds out-of-order blocks until the next expected sequence number
/// arrives.
///
/// Every held entry has a sequence number at or past the cursor, and each
/// sequence number is released exactly once, in increasing order.  Once
/// `i32::MAX` has been released the buffer is exhausted and refuses every
/// further block.
#[derive(Debug)]
pub struct ReassemblyBuffer<T> {
    /// `None` once every sequence number has been released.
    next_sequence: Option<i32>,
    pending:       BTreeMap<i32, T>,
}

impl<T> Default for ReassemblyBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReassemblyBuffer<T> {
    pub fn new() -> Self {
        Self {
            next_sequence: Some(FIRST_SEQUENCE),
            pending:       BTreeMap::new(),
        }
    }

    /// Stash `item` under `sequence`.
    ///
    /// # Errors
    /// `CorruptData` if `sequence` was already released or is already held.
    pub fn insert(&mut self, sequence: i32, item: T) -> Result<()> {
        if self.next_sequence.map_or(true, |next| sequence < next) {
            return Err(Error::CorruptData(format!(
                "block {sequence} arrived after it was already written"
            )));
        }
        if self.pending.contains_key(&sequence) {
            return Err(Error::CorruptData(format!("duplicate block {sequence}")));
        }
        self.pending.insert(sequence, item);
        Ok(())
    }

    /// Release the item at the cursor, if present, and advance.
    pub fn pop_ready(&mut self) -> Option<T> {
        let next = self.next_sequence?;
        let item = self.pending.remove(&next)?;
        self.next_sequence = next.checked_add(1);
        Some(item)
    }

    /// Sequence number released next, or `None` when exhausted.
    pub fn next_expected(&self) -> Option<i32> {
        self.next_sequence
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
