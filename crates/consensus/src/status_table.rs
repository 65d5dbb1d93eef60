//! Per-validator status slots.
//!
//! One slot per validator index. The slot at `my_index` is the local node's
//! own status and is only written through [`StatusTable::set_mine`]; the others
//! hold whatever each peer last reported, accepted verbatim. Alongside the
//! statuses the table keeps a height-scoped "reported revolt" flag per index.

use ebft_types::{NodeStatus, ValidatorIndex};

use crate::error::{StatusError, StatusResult};

/// Fixed-size table of validator statuses.
#[derive(Debug, Clone)]
pub struct StatusTable {
    statuses: Vec<NodeStatus>,
    reported_revolt: Vec<bool>,
    my_index: ValidatorIndex,
}

impl StatusTable {
    /// Creates a table for `count` validators with `mine` in slot `my_index`.
    ///
    /// Peer slots start as [`NodeStatus::unknown`].
    pub fn new(count: usize, my_index: ValidatorIndex, mine: NodeStatus) -> StatusResult<Self> {
        if my_index >= count {
            return Err(StatusError::IndexOutOfRange {
                index: my_index,
                count,
            });
        }
        let mut statuses = vec![NodeStatus::unknown(); count];
        statuses[my_index] = mine;
        Ok(Self {
            statuses,
            reported_revolt: vec![false; count],
            my_index,
        })
    }

    /// Number of validators.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Always false; a table has at least the local slot.
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Index of the local node.
    pub fn my_index(&self) -> ValidatorIndex {
        self.my_index
    }

    /// Status in slot `index`.
    pub fn get(&self, index: ValidatorIndex) -> StatusResult<&NodeStatus> {
        self.statuses.get(index).ok_or(StatusError::IndexOutOfRange {
            index,
            count: self.statuses.len(),
        })
    }

    /// The local node's status.
    pub fn mine(&self) -> &NodeStatus {
        &self.statuses[self.my_index]
    }

    pub(crate) fn mine_mut(&mut self) -> &mut NodeStatus {
        &mut self.statuses[self.my_index]
    }

    /// Replaces the local node's status.
    pub fn set_mine(&mut self, status: NodeStatus) {
        self.statuses[self.my_index] = status;
    }

    /// Replaces a peer's status.
    pub fn set_peer(&mut self, index: ValidatorIndex, status: NodeStatus) -> StatusResult<()> {
        self.check_index(index)?;
        if index == self.my_index {
            return Err(StatusError::LocalSlot(index));
        }
        self.statuses[index] = status;
        Ok(())
    }

    /// Copy of every slot, in index order.
    pub fn snapshot(&self) -> Vec<NodeStatus> {
        self.statuses.clone()
    }

    /// Iterates over `(index, status)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ValidatorIndex, &NodeStatus)> + '_ {
        self.statuses.iter().enumerate()
    }

    /// Whether `index` has already been counted as a revolter at this height.
    pub fn has_reported_revolt(&self, index: ValidatorIndex) -> StatusResult<bool> {
        self.check_index(index)?;
        Ok(self.reported_revolt[index])
    }

    /// Flags `index` as a revolter. Returns `false` if it already was.
    pub fn mark_reported_revolt(&mut self, index: ValidatorIndex) -> StatusResult<bool> {
        self.check_index(index)?;
        let was_set = std::mem::replace(&mut self.reported_revolt[index], true);
        Ok(!was_set)
    }

    /// Clears every reported-revolt flag.
    pub fn clear_reported_revolts(&mut self) {
        self.reported_revolt.iter_mut().for_each(|flag| *flag = false);
    }

    fn check_index(&self, index: ValidatorIndex) -> StatusResult<()> {
        if index >= self.statuses.len() {
            return Err(StatusError::IndexOutOfRange {
                index,
                count: self.statuses.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StatusTable {
        StatusTable::new(4, 1, NodeStatus::new(10, 100)).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_index() {
        assert!(matches!(
            StatusTable::new(3, 3, NodeStatus::unknown()),
            Err(StatusError::IndexOutOfRange { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_set_peer_accepts_regression() {
        let mut table = table();
        table.set_peer(0, NodeStatus::new(12, 50)).unwrap();
        table.set_peer(0, NodeStatus::new(3, 1)).unwrap();
        assert_eq!(table.get(0).unwrap().height, 3);
    }

    #[test]
    fn test_set_peer_out_of_range() {
        let mut table = table();
        assert_eq!(
            table.set_peer(4, NodeStatus::unknown()),
            Err(StatusError::IndexOutOfRange { index: 4, count: 4 })
        );
    }

    #[test]
    fn test_set_peer_rejects_local_slot() {
        let mut table = table();
        assert_eq!(
            table.set_peer(1, NodeStatus::unknown()),
            Err(StatusError::LocalSlot(1))
        );
        assert_eq!(table.mine().height, 10);
    }

    #[test]
    fn test_snapshot_order() {
        let mut table = table();
        table.set_peer(3, NodeStatus::new(7, 7)).unwrap();
        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot[1].height, 10);
        assert_eq!(snapshot[3].height, 7);
        assert_eq!(snapshot[0], NodeStatus::unknown());
    }

    #[test]
    fn test_reported_revolt_flags() {
        let mut table = table();
        assert!(table.mark_reported_revolt(2).unwrap());
        assert!(!table.mark_reported_revolt(2).unwrap());
        assert!(table.has_reported_revolt(2).unwrap());
        table.clear_reported_revolts();
        assert!(!table.has_reported_revolt(2).unwrap());
        assert!(table.mark_reported_revolt(9).is_err());
    }
}
