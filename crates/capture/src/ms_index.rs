//! Millisecond index table over a concatenated event stream.

/// Nanoseconds per millisecond
const MS_NS: i64 = 1_000_000;

/// Build the `ms_to_idx` table: entry `i` is the first event index whose
/// timestamp is at or after millisecond `i`.
///
/// Single linear scan; `t` must be non-decreasing (undefined behavior of
/// the table otherwise, the scan itself never panics). Timestamps are
/// nanoseconds from the stream origin, so entry 0 is always index 0.
pub fn build_ms_to_idx(t: &[i64]) -> Vec<u32> {
    let Some(&last) = t.last() else {
        return Vec::new();
    };

    let ms_count = (last / MS_NS) as usize + 1;
    let mut table = Vec::with_capacity(ms_count);
    let mut idx = 0usize;

    for ms in 0..ms_count as i64 {
        let boundary = ms * MS_NS;
        while idx < t.len() && t[idx] < boundary {
            idx += 1;
        }
        table.push(idx as u32);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_has_empty_table() {
        assert!(build_ms_to_idx(&[]).is_empty());
    }

    #[test]
    fn first_entry_is_index_zero() {
        let t = vec![0, 100, 2_500_000];
        let table = build_ms_to_idx(&t);
        assert_eq!(table[0], 0);
    }

    #[test]
    fn boundaries_select_first_event_at_or_after() {
        // events at 0.1ms, 0.9ms, 1.5ms, 3.2ms
        let t = vec![100_000, 900_000, 1_500_000, 3_200_000];
        let table = build_ms_to_idx(&t);
        assert_eq!(table, vec![0, 2, 3, 3]);

        // invariant: t[table[i]] >= i*1ms and t[table[i]-1] < i*1ms
        for (i, &idx) in table.iter().enumerate() {
            let boundary = i as i64 * MS_NS;
            assert!(t[idx as usize] >= boundary);
            if idx > 0 {
                assert!(t[idx as usize - 1] < boundary);
            }
        }
    }

    #[test]
    fn table_is_monotonically_non_decreasing() {
        let t = vec![0, 1, 5_000_000, 5_000_001, 12_000_000, 47_000_000];
        let table = build_ms_to_idx(&t);
        assert_eq!(table.len(), 48);
        assert!(table.windows(2).all(|w| w[0] <= w[1]));
        assert!(table.iter().all(|&idx| (idx as usize) < t.len()));
    }

    #[test]
    fn dense_stream_indexes_every_millisecond() {
        // one event exactly on every millisecond boundary
        let t: Vec<i64> = (0..10).map(|i| i * MS_NS).collect();
        let table = build_ms_to_idx(&t);
        assert_eq!(table, (0..10).map(|i| i as u32).collect::<Vec<_>>());
    }
}
