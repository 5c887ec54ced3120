//! Reassembly of multi-part command responses.
//!
//! A large response arrives as several command packets sharing one sequence
//! number, each carrying the fragment count and its own index. Fragments may
//! arrive in any order and may be duplicated by the transport. One
//! accumulator exists per sequence until every index `0..total` is present.
//!
//! This structure is not thread-safe; the session owns it behind its lock.

use crate::error::ReassemblyError;
use std::collections::HashMap;

#[derive(Debug)]
struct FragmentAccumulator {
    total: u8,
    highest_index: u8,
    fragments: HashMap<u8, Vec<u8>>,
}

impl FragmentAccumulator {
    fn new(total: u8) -> Self {
        Self {
            total,
            highest_index: 0,
            fragments: HashMap::with_capacity(total as usize),
        }
    }

    /// Stores a fragment. A repeated index replaces the earlier payload.
    fn insert(&mut self, index: u8, payload: &[u8]) {
        self.highest_index = self.highest_index.max(index);
        self.fragments.insert(index, payload.to_vec());
    }

    fn is_complete(&self) -> bool {
        self.fragments.len() == self.total as usize
    }

    fn join(mut self) -> Vec<u8> {
        let len = self.fragments.values().map(Vec::len).sum();
        let mut joined = Vec::with_capacity(len);
        for index in 0..self.total {
            if let Some(fragment) = self.fragments.remove(&index) {
                joined.extend_from_slice(&fragment);
            }
        }
        joined
    }
}

/// Accumulators for every sequence with a partially received response.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    accumulators: HashMap<u8, FragmentAccumulator>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fragment and returns the joined payload once it completes.
    ///
    /// A fragment that contradicts the accumulator (a different total, or an
    /// index outside it) drops the accumulator and returns the violation.
    pub fn on_fragment(
        &mut self,
        sequence: u8,
        index: u8,
        total: u8,
        payload: &[u8],
    ) -> Result<Option<Vec<u8>>, ReassemblyError> {
        if index >= total {
            self.accumulators.remove(&sequence);
            return Err(ReassemblyError::IndexOutOfRange {
                sequence,
                index,
                total,
            });
        }

        let accumulator = self
            .accumulators
            .entry(sequence)
            .or_insert_with(|| FragmentAccumulator::new(total));

        if accumulator.total != total {
            let expected = accumulator.total;
            self.accumulators.remove(&sequence);
            return Err(ReassemblyError::TotalMismatch {
                sequence,
                expected,
                actual: total,
            });
        }

        accumulator.insert(index, payload);

        if !accumulator.is_complete() {
            return Ok(None);
        }

        Ok(self
            .accumulators
            .remove(&sequence)
            .map(FragmentAccumulator::join))
    }

    /// Drops any partial response for `sequence`.
    pub fn discard(&mut self, sequence: u8) -> bool {
        self.accumulators.remove(&sequence).is_some()
    }

    /// Number of fragments held for `sequence`, if it has an accumulator.
    pub fn received(&self, sequence: u8) -> Option<usize> {
        self.accumulators
            .get(&sequence)
            .map(|accumulator| accumulator.fragments.len())
    }

    /// Highest fragment index seen so far for `sequence`.
    pub fn highest_index(&self, sequence: u8) -> Option<u8> {
        self.accumulators
            .get(&sequence)
            .map(|accumulator| accumulator.highest_index)
    }

    #[cfg(test)]
    pub(crate) fn in_progress(&self) -> usize {
        self.accumulators.len()
    }
}
