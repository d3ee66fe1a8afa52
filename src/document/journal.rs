//! Modification journal: byte-level backups with single-step undo.
//!
//! Every mutating document operation backs up the bytes it is about to overwrite *before*
//! writing. Backups group into operations: one [`Operation`] is one undo step, holding the
//! ordered mutations of one logical edit. Multi-write edits (add a section: resize, header
//! row, section count, image size) coalesce into a single operation through the caller's
//! `continue_last` flag - logical-operation identity is always caller-supplied, never
//! inferred from timing or adjacency.
//!
//! Undo replays the top operation's mutations in reverse order, which restores the buffer
//! byte-for-byte including any tail cut off by a shrink.

/// One reversible primitive mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Bytes at `offset` were overwritten; `backup` holds the previous content.
    Patch {
        /// Absolute buffer offset of the overwritten range.
        offset: u64,
        /// The bytes as they were before the write.
        backup: Vec<u8>,
    },
    /// The buffer length changed; `cut_tail` holds bytes removed by a shrink.
    Resize {
        /// Buffer length before the resize.
        old_size: u64,
        /// Content of the removed tail (empty for a grow).
        cut_tail: Vec<u8>,
    },
}

/// One undo step: the ordered mutations of one logical edit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Operation {
    mutations: Vec<Mutation>,
}

impl Operation {
    /// The mutations in application order.
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

/// The document's modification journal.
#[derive(Debug, Default)]
pub struct Journal {
    operations: Vec<Operation>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Journal {
        Journal::default()
    }

    fn target_operation(&mut self, continue_last: bool) -> &mut Operation {
        if !continue_last || self.operations.is_empty() {
            self.operations.push(Operation::default());
        }
        // the push above guarantees non-emptiness
        let last = self.operations.len() - 1;
        &mut self.operations[last]
    }

    /// Backs up `size` bytes at `offset` before they are overwritten.
    ///
    /// With `continue_last` the backup joins the open top operation instead of starting
    /// a new undo step.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] when the range does not lie inside `buf`;
    /// nothing is recorded in that case.
    pub fn backup_modification(
        &mut self,
        buf: &[u8],
        offset: u64,
        size: u64,
        continue_last: bool,
    ) -> crate::Result<()> {
        let start = usize::try_from(offset).map_err(|_| out_of_bounds_error!())?;
        let len = usize::try_from(size).map_err(|_| out_of_bounds_error!())?;
        let end = start.checked_add(len).ok_or(out_of_bounds_error!())?;
        let backup = buf
            .get(start..end)
            .ok_or(out_of_bounds_error!())?
            .to_vec();

        self.target_operation(continue_last)
            .mutations
            .push(Mutation::Patch { offset, backup });
        Ok(())
    }

    /// Records a pending buffer resize to `new_size`, keeping a copy of any cut tail.
    pub fn backup_resize(&mut self, buf: &[u8], new_size: u64, continue_last: bool) {
        let old_size = buf.len() as u64;
        let cut_tail = if new_size < old_size {
            buf[usize::try_from(new_size).unwrap_or(buf.len())..].to_vec()
        } else {
            Vec::new()
        };

        self.target_operation(continue_last)
            .mutations
            .push(Mutation::Resize { old_size, cut_tail });
    }

    /// Discards the most recent backup without applying it.
    ///
    /// Used when an edit fails between backup and write; an emptied operation is removed
    /// entirely.
    pub fn unbackup_last(&mut self) {
        if let Some(top) = self.operations.last_mut() {
            top.mutations.pop();
            if top.mutations.is_empty() {
                self.operations.pop();
            }
        }
    }

    /// Reverts the top operation against `buf`, mutations in reverse order.
    ///
    /// Returns `false` on an empty journal - undo underflow is not an error.
    pub fn undo_last(&mut self, buf: &mut Vec<u8>) -> bool {
        let Some(operation) = self.operations.pop() else {
            return false;
        };

        for mutation in operation.mutations.iter().rev() {
            match mutation {
                Mutation::Patch { offset, backup } => {
                    let start = usize::try_from(*offset).unwrap_or(buf.len());
                    let end = start.saturating_add(backup.len()).min(buf.len());
                    if start < end {
                        buf[start..end].copy_from_slice(&backup[..end - start]);
                    }
                }
                Mutation::Resize { old_size, cut_tail } => {
                    let old = usize::try_from(*old_size).unwrap_or(buf.len());
                    buf.resize(old, 0);
                    let tail_start = old.saturating_sub(cut_tail.len());
                    buf[tail_start..].copy_from_slice(cut_tail);
                }
            }
        }
        true
    }

    /// Number of undo steps currently recorded.
    #[must_use]
    pub fn count_operations(&self) -> usize {
        self.operations.len()
    }

    /// Whether any edit is recorded.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        !self.operations.is_empty()
    }

    /// Clears the journal without restoring anything.
    ///
    /// The current buffer state becomes the new unmodified baseline.
    pub fn un_modify(&mut self) {
        self.operations.clear();
    }

    /// Whether any recorded patch covers the given offset.
    #[must_use]
    pub fn is_modified_at(&self, offset: u64) -> bool {
        self.operations.iter().any(|operation| {
            operation.mutations.iter().any(|mutation| match mutation {
                Mutation::Patch {
                    offset: start,
                    backup,
                } => offset >= *start && offset < *start + backup.len() as u64,
                Mutation::Resize { .. } => false,
            })
        })
    }

    /// All patched `(offset, size)` ranges in recording order, for display consumers.
    #[must_use]
    pub fn modified_ranges(&self) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        for operation in &self.operations {
            for mutation in &operation.mutations {
                if let Mutation::Patch { offset, backup } = mutation {
                    out.push((*offset, backup.len() as u64));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_undo_restores_bytes() {
        let mut buf = vec![1u8, 2, 3, 4, 5];
        let mut journal = Journal::new();

        journal.backup_modification(&buf, 1, 3, false).unwrap();
        buf[1..4].copy_from_slice(&[9, 9, 9]);

        assert_eq!(journal.count_operations(), 1);
        assert!(journal.is_modified_at(2));
        assert!(!journal.is_modified_at(0));

        assert!(journal.undo_last(&mut buf));
        assert_eq!(buf, vec![1, 2, 3, 4, 5]);
        assert_eq!(journal.count_operations(), 0);
        assert!(!journal.undo_last(&mut buf));
    }

    #[test]
    fn shrink_undo_restores_cut_tail() {
        let mut buf: Vec<u8> = (0..10).collect();
        let mut journal = Journal::new();

        journal.backup_resize(&buf, 4, false);
        buf.truncate(4);

        assert!(journal.undo_last(&mut buf));
        assert_eq!(buf, (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn continue_last_coalesces_into_one_step() {
        let mut buf = vec![0u8; 8];
        let mut journal = Journal::new();

        journal.backup_modification(&buf, 0, 2, false).unwrap();
        buf[0] = 0xAA;
        journal.backup_modification(&buf, 4, 2, true).unwrap();
        buf[4] = 0xBB;

        assert_eq!(journal.count_operations(), 1);
        assert!(journal.undo_last(&mut buf));
        assert_eq!(buf, vec![0u8; 8]);
    }

    #[test]
    fn mixed_operation_reverts_in_reverse_order() {
        let mut buf = vec![7u8; 6];
        let mut journal = Journal::new();

        // grow, then patch inside the grown area
        journal.backup_resize(&buf, 10, false);
        buf.resize(10, 0);
        journal.backup_modification(&buf, 8, 2, true).unwrap();
        buf[8] = 1;
        buf[9] = 2;

        assert!(journal.undo_last(&mut buf));
        assert_eq!(buf, vec![7u8; 6]);
    }

    #[test]
    fn unbackup_drops_pending_entry() {
        let buf = vec![0u8; 4];
        let mut journal = Journal::new();

        journal.backup_modification(&buf, 0, 2, false).unwrap();
        journal.unbackup_last();
        assert_eq!(journal.count_operations(), 0);
    }

    #[test]
    fn out_of_bounds_backup_records_nothing() {
        let buf = vec![0u8; 4];
        let mut journal = Journal::new();

        assert!(journal.backup_modification(&buf, 2, 8, false).is_err());
        assert_eq!(journal.count_operations(), 0);
    }

    #[test]
    fn un_modify_clears_without_restoring() {
        let mut buf = vec![0u8; 4];
        let mut journal = Journal::new();

        journal.backup_modification(&buf, 0, 1, false).unwrap();
        buf[0] = 0xFF;
        journal.un_modify();

        assert!(!journal.is_modified());
        assert_eq!(buf[0], 0xFF);
        assert!(!journal.undo_last(&mut buf));
    }
}
