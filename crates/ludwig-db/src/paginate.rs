//! Page cursor protocol (§4.6): stable opaque resumption tokens for every
//! list operation, plus the generic range-scan helpers the index-backed list
//! views are built from (§"Iterator layer").

use crate::error::DbResult;

/// Default page size for list operations that don't specify one, matching
/// the original controller layer's per-page item count.
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// An opaque resumption token: `k` is the sort key of the last emitted
/// element, `v` is the tiebreaker id. Encodes to/from a hex string for
/// transmission; an empty cursor renders as the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub k: u64,
    pub v: u64,
}

impl PageCursor {
    pub fn new(k: u64, v: u64) -> Self {
        Self { k, v }
    }

    pub fn encode(self) -> String {
        format!("{:016x}{:016x}", self.k, self.v)
    }

    pub fn decode(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        if s.len() != 32 {
            return None;
        }
        let k = u64::from_str_radix(&s[0..16], 16).ok()?;
        let v = u64::from_str_radix(&s[16..32], 16).ok()?;
        Some(Self { k, v })
    }

    pub fn encode_opt(cursor: Option<PageCursor>) -> String {
        cursor.map(PageCursor::encode).unwrap_or_default()
    }

    pub fn decode_opt(s: &str) -> Option<PageCursor> {
        Self::decode(s)
    }
}

/// Forward range scan starting at (and including) `cursor`, or from the
/// start of the table if `cursor` is `None`. Stops once `limit` items have
/// been accepted by `filter_fn`, returning the key to resume from.
pub fn paginate_table<K, V, R>(
    table: &impl redb_bincode::ReadableTable<K, V>,
    cursor: Option<K>,
    limit: usize,
    filter_fn: impl Fn(K, V) -> DbResult<Option<R>>,
) -> DbResult<(Vec<R>, Option<K>)>
where
    K: bincode::Decode<()> + bincode::Encode,
    V: bincode::Decode<()> + bincode::Encode,
{
    let mut ret = vec![];

    for entry in if let Some(cursor) = cursor {
        table.range(&cursor..)?
    } else {
        table.range(..)?
    } {
        let (k, v) = entry?;
        let k = k.value();
        if limit <= ret.len() {
            return Ok((ret, Some(k)));
        }
        if let Some(r) = filter_fn(k, v.value())? {
            ret.push(r);
        }
    }

    Ok((ret, None))
}

/// Reverse range scan ending at (and including) `cursor`, or from the end of
/// the table if `cursor` is `None`. The natural shape for "time-descending"
/// list views (§4.6).
pub fn paginate_table_rev<K, V, R>(
    table: &impl redb_bincode::ReadableTable<K, V>,
    cursor: Option<K>,
    limit: usize,
    filter_fn: impl Fn(K, V) -> DbResult<Option<R>>,
) -> DbResult<(Vec<R>, Option<K>)>
where
    K: bincode::Decode<()> + bincode::Encode,
    V: bincode::Decode<()> + bincode::Encode,
{
    let mut ret = vec![];

    for entry in if let Some(cursor) = cursor {
        table.range(..=&cursor)?
    } else {
        table.range(..)?
    }
    .rev()
    {
        let (k, v) = entry?;
        let k = k.value();
        if limit <= ret.len() {
            return Ok((ret, Some(k)));
        }
        if let Some(r) = filter_fn(k, v.value())? {
            ret.push(r);
        }
    }

    Ok((ret, None))
}

/// Forward scan over a single scope's partition of a `(scope, sort, id)`
/// composite-keyed index, e.g. "threads of board B, oldest first".
pub fn paginate_table_partition<K, V, C, R>(
    table: &impl redb_bincode::ReadableTable<K, V>,
    prefix_cursor_min: impl Fn(Option<C>) -> K,
    prefix_max: K,
    cursor: Option<C>,
    limit: usize,
    filter_fn: impl Fn(K, V) -> DbResult<Option<R>>,
) -> DbResult<(Vec<R>, Option<K>)>
where
    K: bincode::Decode<()> + bincode::Encode,
    V: bincode::Decode<()> + bincode::Encode,
{
    let mut ret = vec![];

    for entry in table.range(&prefix_cursor_min(cursor)..=&prefix_max)? {
        let (k, v) = entry?;
        let k = k.value();
        if limit <= ret.len() {
            return Ok((ret, Some(k)));
        }
        if let Some(r) = filter_fn(k, v.value())? {
            ret.push(r);
        }
    }

    Ok((ret, None))
}

/// Reverse scan over a single scope's partition, e.g. "threads of board B,
/// newest first".
pub fn paginate_table_partition_rev<K, V, C, R>(
    table: &impl redb_bincode::ReadableTable<K, V>,
    prefix_min: K,
    prefix_max: K,
    cursor_to_prefix: impl Fn(C) -> K,
    cursor: Option<C>,
    limit: usize,
    filter_fn: impl Fn(K, V) -> DbResult<Option<R>>,
) -> DbResult<(Vec<R>, Option<K>)>
where
    K: bincode::Decode<()> + bincode::Encode,
    V: bincode::Decode<()> + bincode::Encode,
{
    let mut ret = vec![];

    for entry in table
        .range(&prefix_min..=&cursor.map(cursor_to_prefix).unwrap_or(prefix_max))?
        .rev()
    {
        let (k, v) = entry?;
        let k = k.value();
        if limit <= ret.len() {
            return Ok((ret, Some(k)));
        }
        if let Some(r) = filter_fn(k, v.value())? {
            ret.push(r);
        }
    }

    Ok((ret, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrips_through_hex() {
        let c = PageCursor::new(0x1234_5678_9abc_def0, 42);
        let s = c.encode();
        assert_eq!(PageCursor::decode(&s), Some(c));
    }

    #[test]
    fn empty_cursor_is_empty_string() {
        assert_eq!(PageCursor::encode_opt(None), "");
        assert_eq!(PageCursor::decode_opt(""), None);
    }
}
