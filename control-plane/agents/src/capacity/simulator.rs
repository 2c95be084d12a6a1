//! Greedy multi-bin allocation simulation.
//!
//! Answers "how much total volume capacity can be carved out of these pools
//! when every volume needs `replica_count` equally sized slices on distinct
//! pools". Summing the largest values over-reports whenever the pools are
//! unequal, so the simulation repeatedly carves the largest possible common
//! slice out of the `replica_count` biggest pools until not enough pools
//! remain.

/// Simulate the total capacity obtainable from `sizes` with volumes of
/// `replica_count` replicas each.
///
/// Each round sorts ascending, takes the `(len - replica_count)`-th smallest
/// remaining value as the common slice the `replica_count` largest entries
/// can all contribute, accounts it once, subtracts it from those entries and
/// drops entries which reached exactly zero. Entries interact only through
/// their values, so the result is independent of the input order.
pub fn simulate(sizes: &[u64], replica_count: usize) -> u64 {
    if replica_count == 0 {
        return 0;
    }
    let mut sizes = sizes.to_vec();
    let mut total: u64 = 0;
    while sizes.len() >= replica_count {
        sizes.sort_unstable();
        let len = sizes.len();
        let common = sizes[len - replica_count];
        total = total.saturating_add(common);
        for size in sizes[len - replica_count ..].iter_mut() {
            *size -= common;
        }
        sizes.retain(|size| *size != 0);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_enough_entries_yields_zero() {
        assert_eq!(simulate(&[], 1), 0);
        assert_eq!(simulate(&[10], 2), 0);
        assert_eq!(simulate(&[10, 10], 3), 0);
        assert_eq!(simulate(&[10, 10], 0), 0);
    }

    #[test]
    fn equal_pools() {
        // one slice of 10 over two of the three pools, then only one pool
        // with space remains
        assert_eq!(simulate(&[10, 10, 10], 2), 10);
        assert_eq!(simulate(&[10, 10, 10], 1), 30);
        assert_eq!(simulate(&[10, 10, 10], 3), 10);
    }

    #[test]
    fn unequal_pools() {
        // first round carves 10 from {10, 15}, leaving {5, 5}, the second
        // carves the remaining 5
        assert_eq!(simulate(&[5, 10, 15], 2), 15);
        assert_eq!(simulate(&[1, 2, 4], 2), 3);
        assert_eq!(simulate(&[4, 4, 8], 2), 8);
    }

    #[test]
    fn zero_entries_are_dropped() {
        assert_eq!(simulate(&[0, 0, 5], 2), 0);
        assert_eq!(simulate(&[0, 5, 5], 2), 5);
    }

    #[test]
    fn result_is_independent_of_input_order() {
        let reference = simulate(&[3, 9, 27, 81], 2);
        assert_eq!(simulate(&[81, 3, 27, 9], 2), reference);
        assert_eq!(simulate(&[27, 81, 9, 3], 2), reference);
    }

    #[test]
    fn totals_saturate() {
        assert_eq!(simulate(&[u64::MAX, u64::MAX], 1), u64::MAX);
    }
}
