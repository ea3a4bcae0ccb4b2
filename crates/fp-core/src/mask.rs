//! Per-record filter bits, one bit per live dimension.
//!
//! A set bit means the record fails that dimension's predicate. A record
//! passes every filter when all of its bits are clear.

/// Bit words stored word-major: `words[w][record]` holds the bits of slots
/// `64 * w .. 64 * w + 63` for one record.
#[derive(Debug, Default)]
pub(crate) struct FilterMasks {
    words: Vec<Vec<u64>>,
    len: usize,
    free: Vec<usize>,
    next_slot: usize,
}

impl FilterMasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records covered
    pub fn len(&self) -> usize {
        self.len
    }

    /// Extend every word column for `additional` new records, all passing
    pub fn grow(&mut self, additional: usize) {
        self.len += additional;
        for word in &mut self.words {
            word.resize(self.len, 0);
        }
    }

    /// Reserve a bit for a new dimension, reusing released slots first
    pub fn alloc_slot(&mut self) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.next_slot;
                self.next_slot += 1;
                slot
            }
        };
        while self.words.len() <= slot / 64 {
            self.words.push(vec![0; self.len]);
        }
        slot
    }

    /// Release a slot, clearing its bit on every record
    pub fn release_slot(&mut self, slot: usize) {
        let bit = 1u64 << (slot % 64);
        if let Some(word) = self.words.get_mut(slot / 64) {
            for bits in word.iter_mut() {
                *bits &= !bit;
            }
        }
        self.free.push(slot);
    }

    pub fn set(&mut self, record: usize, slot: usize, failing: bool) {
        let bit = 1u64 << (slot % 64);
        let bits = &mut self.words[slot / 64][record];
        if failing {
            *bits |= bit;
        } else {
            *bits &= !bit;
        }
    }

    /// Whether the record passes every dimension whose slot is not in `ignore`
    pub fn passes_except(&self, record: usize, ignore: &[usize]) -> bool {
        self.words.iter().enumerate().all(|(w, word)| {
            let mut bits = word[record];
            for &slot in ignore {
                if slot / 64 == w {
                    bits &= !(1u64 << (slot % 64));
                }
            }
            bits == 0
        })
    }

    pub fn passes_all(&self, record: usize) -> bool {
        self.words.iter().all(|word| word[record] == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_beyond_one_word() {
        let mut masks = FilterMasks::new();
        masks.grow(3);
        let slots: Vec<usize> = (0..70).map(|_| masks.alloc_slot()).collect();
        masks.set(1, slots[65], true);
        masks.set(1, slots[2], true);
        assert!(!masks.passes_all(1));
        assert!(!masks.passes_except(1, &[slots[65]]));
        assert!(masks.passes_except(1, &[slots[65], slots[2]]));
        assert!(masks.passes_all(0));
    }

    #[test]
    fn test_released_slot_is_cleared_and_reused() {
        let mut masks = FilterMasks::new();
        masks.grow(2);
        let a = masks.alloc_slot();
        masks.set(0, a, true);
        masks.release_slot(a);
        assert!(masks.passes_all(0));
        assert_eq!(masks.alloc_slot(), a);
        masks.grow(1);
        assert!(masks.passes_all(2));
    }
}
