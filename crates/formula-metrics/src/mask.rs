/// A row-selection mask aligned with a table's rows.
///
/// Bits are stored little-endian within each `u64` word:
/// - bit 0 is the LSB of word 0
/// - bit 63 is the MSB of word 0
///
/// Unused high bits of the last word are always zero so `count_ones` stays exact after `not`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowMask {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl RowMask {
    pub fn all_true(len: usize) -> Self {
        if len == 0 {
            return Self::all_false(0);
        }

        let mut words = vec![u64::MAX; word_len(len)];
        let rem = len % 64;
        if rem != 0 {
            if let Some(last) = words.last_mut() {
                *last = (1u64 << rem) - 1;
            }
        }

        Self {
            words,
            len,
            ones: len,
        }
    }

    pub fn all_false(len: usize) -> Self {
        Self {
            words: vec![0u64; word_len(len)],
            len,
            ones: 0,
        }
    }

    /// Build a mask by evaluating `f` for every row index.
    pub fn from_fn(len: usize, mut f: impl FnMut(usize) -> bool) -> Self {
        let mut mask = Self::all_false(len);
        for row in 0..len {
            if f(row) {
                mask.words[row / 64] |= 1u64 << (row % 64);
                mask.ones += 1;
            }
        }
        mask
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, row: usize) -> bool {
        debug_assert!(row < self.len, "RowMask index out of bounds");
        ((self.words[row / 64] >> (row % 64)) & 1) == 1
    }

    pub fn set(&mut self, row: usize, value: bool) {
        debug_assert!(row < self.len, "RowMask index out of bounds");
        let word = &mut self.words[row / 64];
        let bit = 1u64 << (row % 64);
        let was_set = (*word & bit) != 0;

        match (was_set, value) {
            (true, false) => {
                *word &= !bit;
                self.ones -= 1;
            }
            (false, true) => {
                *word |= bit;
                self.ones += 1;
            }
            _ => {}
        }
    }

    pub fn count_ones(&self) -> usize {
        self.ones
    }

    pub fn is_all_true(&self) -> bool {
        self.ones == self.len
    }

    pub fn and_inplace(&mut self, other: &RowMask) {
        debug_assert_eq!(self.len, other.len, "RowMask length mismatch");
        let mut ones = 0usize;
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w &= *o;
            ones += w.count_ones() as usize;
        }
        self.ones = ones;
    }

    pub fn or_inplace(&mut self, other: &RowMask) {
        debug_assert_eq!(self.len, other.len, "RowMask length mismatch");
        let mut ones = 0usize;
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= *o;
            ones += w.count_ones() as usize;
        }
        self.ones = ones;
    }

    pub fn not_inplace(&mut self) {
        if self.len == 0 {
            return;
        }

        for w in &mut self.words {
            *w = !*w;
        }

        let rem = self.len % 64;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }

        self.ones = self.len - self.ones;
    }

    /// Indices of the selected rows, in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(move |(word_idx, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }
}

fn word_len(bits: usize) -> usize {
    (bits + 63) / 64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_true_masks_trailing_bits() {
        let mask = RowMask::all_true(70);
        assert_eq!(mask.count_ones(), 70);
        assert!(mask.is_all_true());
        assert_eq!(mask.iter_ones().count(), 70);
    }

    #[test]
    fn not_keeps_count_exact() {
        let mut mask = RowMask::from_fn(130, |row| row % 3 == 0);
        let selected = mask.count_ones();
        mask.not_inplace();
        assert_eq!(mask.count_ones(), 130 - selected);
        assert!(mask.iter_ones().all(|row| row % 3 != 0 && row < 130));
    }

    #[test]
    fn and_or_combine() {
        let evens = RowMask::from_fn(100, |row| row % 2 == 0);
        let small = RowMask::from_fn(100, |row| row < 10);

        let mut both = evens.clone();
        both.and_inplace(&small);
        assert_eq!(both.iter_ones().collect::<Vec<_>>(), vec![0, 2, 4, 6, 8]);

        let mut either = evens.clone();
        either.or_inplace(&small);
        assert_eq!(either.count_ones(), 55);
    }

    #[test]
    fn set_tracks_ones() {
        let mut mask = RowMask::all_false(3);
        mask.set(1, true);
        mask.set(1, true);
        assert_eq!(mask.count_ones(), 1);
        assert!(mask.get(1));
        mask.set(1, false);
        assert_eq!(mask.count_ones(), 0);
    }

    #[test]
    fn empty_mask() {
        let mut mask = RowMask::all_true(0);
        mask.not_inplace();
        assert!(mask.is_empty());
        assert_eq!(mask.count_ones(), 0);
    }
}
