// Table bookkeeping for a single restaurant

use std::collections::HashMap;

/// Customer counts of the occupied tables serving one outcome.
///
/// Every stored count is positive and `total` is their sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSet {
    counts: Vec<usize>,
    total: usize,
}

impl TableSet {
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn n_tables(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts[..]
    }

    pub(crate) fn open_table(&mut self) {
        self.counts.push(1);
        self.total += 1;
    }

    pub(crate) fn seat_at(&mut self, table: usize) {
        self.counts[table] += 1;
        self.total += 1;
    }

    /// Removes one customer from `table`; returns whether the table closed.
    pub(crate) fn unseat_at(&mut self, table: usize) -> bool {
        self.counts[table] -= 1;
        self.total -= 1;
        if self.counts[table] == 0 {
            self.counts.swap_remove(table);
            true
        } else {
            false
        }
    }
}

/// Maps outcome ids to their table sets.
///
/// Implementations differ only in storage; a distribution never needs to
/// know which one it holds.
pub trait TableIndex: Clone + Default + Send + Sync {
    fn table_set(&self, outcome: usize) -> Option<&TableSet>;

    /// Returns the table set for `outcome`, creating an empty one if needed.
    fn table_set_mut(&mut self, outcome: usize) -> &mut TableSet;

    /// Called once the table set of `outcome` has become empty.
    fn release(&mut self, outcome: usize);

    fn iter(&self) -> impl Iterator<Item = (usize, &TableSet)> + '_;

    fn total(&self, outcome: usize) -> usize {
        self.table_set(outcome).map_or(0, |set| set.total())
    }
}

/// Array-indexed storage for small closed vocabularies.
///
/// Grows on demand and never shrinks.
#[derive(Debug, Clone, Default)]
pub struct DenseIndex(Vec<TableSet>);

impl TableIndex for DenseIndex {
    fn table_set(&self, outcome: usize) -> Option<&TableSet> {
        self.0.get(outcome)
    }

    fn table_set_mut(&mut self, outcome: usize) -> &mut TableSet {
        if outcome >= self.0.len() {
            self.0.resize(outcome + 1, TableSet::default());
        }
        &mut self.0[outcome]
    }

    fn release(&mut self, _outcome: usize) {}

    fn iter(&self) -> impl Iterator<Item = (usize, &TableSet)> + '_ {
        self.0.iter().enumerate()
    }
}

/// Hash-indexed storage for open vocabularies; empty entries are dropped.
#[derive(Debug, Clone, Default)]
pub struct SparseIndex(HashMap<usize, TableSet>);

impl SparseIndex {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TableIndex for SparseIndex {
    fn table_set(&self, outcome: usize) -> Option<&TableSet> {
        self.0.get(&outcome)
    }

    fn table_set_mut(&mut self, outcome: usize) -> &mut TableSet {
        self.0.entry(outcome).or_default()
    }

    fn release(&mut self, outcome: usize) {
        self.0.remove(&outcome);
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &TableSet)> + '_ {
        self.0.iter().map(|(outcome, set)| (*outcome, set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_set_bookkeeping() {
        let mut set = TableSet::default();
        set.open_table();
        set.open_table();
        set.seat_at(0);
        assert_eq!(set.counts(), &[2, 1]);
        assert_eq!(set.total(), 3);
        assert!(set.unseat_at(1));
        assert_eq!(set.n_tables(), 1);
        assert!(!set.unseat_at(0));
        assert!(set.unseat_at(0));
        assert!(set.is_empty());
        assert_eq!(set.n_tables(), 0);
    }

    #[test]
    fn test_dense_index_grows_and_keeps_entries() {
        let mut index = DenseIndex::default();
        index.table_set_mut(3).open_table();
        assert_eq!(index.total(3), 1);
        assert_eq!(index.total(1), 0);
        assert_eq!(index.total(10), 0);
        index.table_set_mut(3).unseat_at(0);
        index.release(3);
        assert_eq!(index.iter().count(), 4);
    }

    #[test]
    fn test_sparse_index_release_drops_entry() {
        let mut index = SparseIndex::default();
        index.table_set_mut(1000).open_table();
        assert_eq!(index.len(), 1);
        assert!(index.table_set(5).is_none());
        index.table_set_mut(1000).unseat_at(0);
        index.release(1000);
        assert!(index.is_empty());
    }
}
