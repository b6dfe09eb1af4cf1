/// A fixed-width composite key whose encoding preserves numeric order under
/// byte-lex comparison.
///
/// Every secondary index in `ludwig-db` is keyed on a tuple implementing this
/// trait: `Cursor(a)`, `Cursor(a, b)`, or `Cursor(a, b, c)` in the spec's
/// notation correspond to the `(u64,)`, `(u64, u64)`, and `(u64, u64, u64)`
/// impls below. `redb_bincode`'s big-endian, fixed-width key encoding already
/// makes plain `u64` tuples order-preserving; this trait exists to name the
/// "successor" operation used to bound range scans (e.g. `range(..=a.successor())`
/// to make an inclusive upper bound exclusive without losing the tuple's
/// lexical structure).
pub trait Cursor: Sized + Ord + Copy {
    /// The immediate successor of `self` in byte-lex order: incrementing the
    /// least-significant field, carrying into more significant fields on
    /// overflow. Saturates at the type's maximum (there is no successor past
    /// `u64::MAX` in every field; callers bounding a range by `successor()`
    /// treat saturation as "no exclusive bound needed".
    fn successor(self) -> Self;
}

impl Cursor for (u64,) {
    fn successor(self) -> Self {
        (self.0.saturating_add(1),)
    }
}

impl Cursor for (u64, u64) {
    fn successor(self) -> Self {
        match self.1.checked_add(1) {
            Some(b) => (self.0, b),
            None => (self.0.saturating_add(1), 0),
        }
    }
}

impl Cursor for (u64, u64, u64) {
    fn successor(self) -> Self {
        match self.2.checked_add(1) {
            Some(c) => (self.0, self.1, c),
            None => match self.1.checked_add(1) {
                Some(b) => (self.0, b, 0),
                None => (self.0.saturating_add(1), 0, 0),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_is_strictly_greater_unless_saturated() {
        assert!((1u64,).successor() > (1u64,));
        assert!((1u64, 5u64).successor() > (1u64, 5u64));
        assert!((1u64, u64::MAX).successor() > (1u64, u64::MAX));
        assert_eq!((1u64, u64::MAX).successor(), (2u64, 0u64));
    }

    #[test]
    fn successor_saturates_at_max() {
        assert_eq!(
            (u64::MAX, u64::MAX, u64::MAX).successor(),
            (u64::MAX, u64::MAX, u64::MAX)
        );
    }
}
