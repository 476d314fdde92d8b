//! Track which properties of an instance changed since it was last persisted.
//!
//! Indices refer to the owning model's property order. Properties added to a
//! model after an instance was created (foreign keys from later associations)
//! simply fall outside `len` until the set is grown.

/// A compact bitset of "property is dirty" flags for indices `0..len`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldsSet {
    len: usize,
    bits: Box<[u64]>,
}

impl FieldsSet {
    /// Create an empty (all-clean) set for `len` properties.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        let words = len.div_ceil(64);
        Self {
            len,
            bits: vec![0u64; words].into_boxed_slice(),
        }
    }

    /// Create a full (all-dirty) set for `len` properties.
    #[must_use]
    pub fn all(len: usize) -> Self {
        let mut s = Self::empty(len);
        for idx in 0..len {
            s.set(idx);
        }
        s
    }

    /// Number of properties represented by this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if `len == 0`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Extend the set to cover `len` properties, keeping existing flags.
    pub fn grow(&mut self, len: usize) {
        if len <= self.len {
            return;
        }
        let mut bits = vec![0u64; len.div_ceil(64)];
        bits[..self.bits.len()].copy_from_slice(&self.bits);
        self.bits = bits.into_boxed_slice();
        self.len = len;
    }

    /// Mark a property index as dirty, growing the set if needed.
    pub fn set(&mut self, idx: usize) {
        if idx >= self.len {
            self.grow(idx + 1);
        }
        self.bits[idx / 64] |= 1u64 << (idx % 64);
    }

    /// Mark a property index as clean.
    pub fn unset(&mut self, idx: usize) {
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w &= !(1u64 << (idx % 64));
        }
    }

    /// Check whether a property index is dirty.
    #[must_use]
    pub fn is_set(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        self.bits
            .get(idx / 64)
            .is_some_and(|w| (w & (1u64 << (idx % 64))) != 0)
    }

    /// True when any property is dirty.
    #[must_use]
    pub fn any(&self) -> bool {
        self.bits.iter().any(|w| *w != 0)
    }

    /// Mark everything clean.
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
    }

    /// Dirty indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|idx| self.is_set(*idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut s = FieldsSet::empty(3);
        assert!(!s.any());
        s.set(1);
        assert!(s.is_set(1));
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![1]);
        s.clear();
        assert!(!s.any());
    }

    #[test]
    fn test_set_beyond_len_grows() {
        let mut s = FieldsSet::empty(2);
        s.set(70);
        assert_eq!(s.len(), 71);
        assert!(s.is_set(70));
        s.unset(70);
        assert!(!s.is_set(70));
    }

    #[test]
    fn test_all() {
        let s = FieldsSet::all(65);
        assert_eq!(s.iter().count(), 65);
    }
}
