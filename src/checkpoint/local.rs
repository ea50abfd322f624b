use std::error::Error;

use validit::less_equal;
use validit::Validate;

use crate::seq_no::SeqNo;
use crate::seq_no::UNASSIGNED_SEQ_NO;

/// The highest sequence number one shard copy has confirmed durable.
///
/// Invariant: the value never decreases while the copy is a member of the
/// in-sync set. Out-of-order and duplicate acknowledgements are accepted and
/// reported as "no advance".
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalCheckpoint {
    persisted: SeqNo,
}

impl LocalCheckpoint {
    pub(crate) fn new(initial: SeqNo) -> Self {
        Self {
            persisted: initial.max(UNASSIGNED_SEQ_NO),
        }
    }

    pub(crate) fn persisted(&self) -> SeqNo {
        self.persisted
    }

    /// Raise the persisted checkpoint to `value`; return whether it advanced.
    pub(crate) fn advance(&mut self, value: SeqNo) -> bool {
        if value > self.persisted {
            self.persisted = value;
            true
        } else {
            false
        }
    }
}

impl Validate for LocalCheckpoint {
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        less_equal!(UNASSIGNED_SEQ_NO, self.persisted);
        Ok(())
    }
}
