/// Signed `upvotes - downvotes` score, used as a sort key in an unsigned
/// ordered store.
///
/// Index keys can't carry a sign bit and preserve byte-lex order, so every
/// index keyed on karma stores [`Karma::to_sort_key`] rather than the signed
/// value itself (spec's `uint_from_int` transform).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, bincode::Encode, bincode::Decode)]
pub struct Karma(pub i64);

impl Karma {
    pub const ZERO: Karma = Karma(0);

    /// Order-preserving map of `[i64::MIN, i64::MAX]` onto `[0, u64::MAX]`.
    ///
    /// Implemented as a single wrapping add of the karma value (reinterpreted
    /// as `u64`) onto `i64::MAX as u64`: for non-negative karma this is a
    /// plain offset; for negative karma the twos-complement bit pattern of
    /// `self.0 as u64` already equals `u64::MAX + 1 + self.0`, so the same
    /// addition wraps around to the correct lower half of the range.
    pub fn to_sort_key(self) -> u64 {
        (i64::MAX as u64).wrapping_add(self.0 as u64)
    }

    pub fn from_sort_key(key: u64) -> Self {
        Karma(key.wrapping_sub(i64::MAX as u64) as i64)
    }
}

impl std::ops::Add<i64> for Karma {
    type Output = Karma;
    fn add(self, rhs: i64) -> Karma {
        Karma(self.0 + rhs)
    }
}

impl std::fmt::Display for Karma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_preserves_order() {
        let values = [i64::MIN, -1_000_000, -1, 0, 1, 1_000_000, i64::MAX];
        for w in values.windows(2) {
            let (a, b) = (w[0], w[1]);
            assert!(a < b);
            assert!(Karma(a).to_sort_key() < Karma(b).to_sort_key());
        }
    }

    #[test]
    fn sort_key_roundtrips() {
        for k in [i64::MIN, -42, -1, 0, 1, 42, i64::MAX] {
            assert_eq!(Karma::from_sort_key(Karma(k).to_sort_key()), Karma(k));
        }
    }

    #[test]
    fn zero_maps_to_midpoint() {
        assert_eq!(Karma::ZERO.to_sort_key(), i64::MAX as u64);
    }

    proptest::proptest! {
        #[test]
        fn sort_key_matches_numeric_order(a: i64, b: i64) {
            let ord_numeric = a.cmp(&b);
            let ord_sort_key = Karma(a).to_sort_key().cmp(&Karma(b).to_sort_key());
            prop_assert_eq!(ord_numeric, ord_sort_key);
        }

        #[test]
        fn sort_key_roundtrip_arbitrary(k: i64) {
            prop_assert_eq!(Karma::from_sort_key(Karma(k).to_sort_key()), Karma(k));
        }
    }
}
