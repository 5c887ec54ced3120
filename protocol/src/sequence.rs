/// One-byte command sequence ring.
///
/// Not synchronized on its own; the session keeps it behind its lock.
#[derive(Debug, Default, Clone)]
pub struct SequenceCounter {
    next: u8,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next: u8) -> Self {
        Self { next }
    }

    /// Returns the sequence to use and advances the ring, wrapping 255 to 0.
    pub fn next_sequence(&mut self) -> u8 {
        let sequence = self.next;
        self.next = sequence.wrapping_add(1);
        sequence
    }

    #[cfg(test)]
    pub(crate) fn peek(&self) -> u8 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let mut counter = SequenceCounter::new();
        assert_eq!(counter.next_sequence(), 0);
        assert_eq!(counter.next_sequence(), 1);
        assert_eq!(counter.peek(), 2);
    }

    #[test]
    fn test_full_cycle_wraps() {
        let mut counter = SequenceCounter::new();
        for expected in 0..=255u8 {
            assert_eq!(counter.next_sequence(), expected);
        }
        assert_eq!(counter.next_sequence(), 0);
    }

    #[test]
    fn test_wraps_after_255() {
        let mut counter = SequenceCounter::starting_at(254);
        assert_eq!(counter.next_sequence(), 254);
        assert_eq!(counter.next_sequence(), 255);
        assert_eq!(counter.next_sequence(), 0);
    }
}
