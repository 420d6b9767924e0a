//! Cascade-delete coordination state.
//!
//! While strong links are being broken, every column that discovers a row
//! to remove records it here. The row set is kept sorted and deduplicated
//! (lexicographic on `(table_ndx, row_ndx)`), so the driver can process
//! rows in a deterministic order and re-discovery is a no-op.

/// One row scheduled for cascading removal: `table_ndx` is the index of a
/// group-level table, `row_ndx` a row within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CascadeRow {
    pub table_ndx: usize,
    pub row_ndx: usize,
}

/// Shared state for one cascade operation.
#[derive(Debug, Default)]
pub struct CascadeState {
    rows: Vec<CascadeRow>,
    /// When set, no recursion is performed for rows of this table. The
    /// effect is as if all its rows were in the set from the start. Used
    /// by table clear to avoid re-entry.
    ///
    /// Never set together with `stop_on_link_list`.
    stop_on_table: Option<usize>,
    /// When set, breaking reciprocal backlinks for the link list at
    /// `(column_ndx, row_ndx)` is skipped and no recursion happens on its
    /// behalf. Used by link-list clear to avoid re-entry.
    ///
    /// Never set together with `stop_on_table`.
    stop_on_link_list: Option<(usize, usize)>,
}

impl CascadeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a row for removal. Returns `true` if the row was not already
    /// present (i.e. the caller should recurse into it).
    pub fn add_row(&mut self, table_ndx: usize, row_ndx: usize) -> bool {
        let row = CascadeRow { table_ndx, row_ndx };
        match self.rows.binary_search(&row) {
            Ok(_) => false,
            Err(pos) => {
                self.rows.insert(pos, row);
                true
            }
        }
    }

    /// The collected rows, sorted and deduplicated.
    pub fn rows(&self) -> &[CascadeRow] {
        &self.rows
    }

    /// Take the collected rows, leaving the state empty.
    pub fn take_rows(&mut self) -> Vec<CascadeRow> {
        std::mem::take(&mut self.rows)
    }

    /// Mark a table as the no-recursion stop target.
    pub fn set_stop_on_table(&mut self, table_ndx: usize) {
        debug_assert!(
            self.stop_on_link_list.is_none(),
            "stop markers are mutually exclusive"
        );
        self.stop_on_table = Some(table_ndx);
    }

    /// Mark a link list as the no-recursion stop target.
    pub fn set_stop_on_link_list(&mut self, column_ndx: usize, row_ndx: usize) {
        debug_assert!(
            self.stop_on_table.is_none(),
            "stop markers are mutually exclusive"
        );
        self.stop_on_link_list = Some((column_ndx, row_ndx));
    }

    /// Whether recursion into rows of `table_ndx` is suppressed.
    pub fn is_table_stopped(&self, table_ndx: usize) -> bool {
        self.stop_on_table == Some(table_ndx)
    }

    /// Whether backlink removal for this link list is suppressed.
    pub fn is_link_list_stopped(&self, column_ndx: usize, row_ndx: usize) -> bool {
        self.stop_on_link_list == Some((column_ndx, row_ndx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_ordered_and_deduplicated() {
        let mut state = CascadeState::new();
        assert!(state.add_row(1, 5));
        assert!(state.add_row(0, 3));
        assert!(!state.add_row(1, 5));
        assert!(state.add_row(0, 2));

        let rows: Vec<(usize, usize)> = state
            .rows()
            .iter()
            .map(|r| (r.table_ndx, r.row_ndx))
            .collect();
        assert_eq!(rows, vec![(0, 2), (0, 3), (1, 5)]);
    }

    #[test]
    fn stop_markers() {
        let mut state = CascadeState::new();
        state.set_stop_on_table(2);
        assert!(state.is_table_stopped(2));
        assert!(!state.is_table_stopped(1));

        let mut state = CascadeState::new();
        state.set_stop_on_link_list(4, 7);
        assert!(state.is_link_list_stopped(4, 7));
        assert!(!state.is_link_list_stopped(4, 8));
    }

    #[test]
    fn take_rows_drains() {
        let mut state = CascadeState::new();
        state.add_row(0, 0);
        let rows = state.take_rows();
        assert_eq!(rows.len(), 1);
        assert!(state.rows().is_empty());
    }
}
