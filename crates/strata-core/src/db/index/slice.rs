use crate::{
    db::{
        query::FilterOp,
        store::{KeySelector, Subspace, strinc},
    },
    error::InternalError,
};

///
/// SliceBounds
///
/// Start and stop selectors collected while planning one index scan. Every
/// bound is expressed against packed key prefixes: a prefix `p` covers all
/// keys that start with it, so `p` itself is the first such key and
/// `strinc(p)` the first key past them.
///

#[derive(Debug, Default)]
pub(super) struct SliceBounds {
    start: Option<KeySelector>,
    stop: Option<KeySelector>,
}

impl SliceBounds {
    pub(super) fn set(&mut self, start: KeySelector, stop: KeySelector) {
        self.start = Some(start);
        self.stop = Some(stop);
    }

    /// Apply one inequality against `packed`, already expressed in key
    /// order (callers mirror the operator for descending columns). A bound
    /// never widens the slice: the tighter of the old and new one is kept.
    pub(super) fn apply_filter(
        &mut self,
        op: FilterOp,
        packed: &[u8],
    ) -> Result<(), InternalError> {
        match op {
            FilterOp::GreaterThanOrEqual => self.raise_start(at(packed)),
            FilterOp::GreaterThan => self.raise_start(past(packed)),
            FilterOp::LessThanOrEqual => self.lower_stop(past(packed)),
            FilterOp::LessThan => self.lower_stop(at(packed)),
            other => {
                return Err(InternalError::bad_query(format!(
                    "unexpected filter operation {other:?}"
                )));
            }
        }

        Ok(())
    }

    /// Resume position. `inclusive` means the scan restarts at the entry
    /// under `packed`; otherwise it restarts just past it, in scan order.
    pub(super) fn apply_start_cursor(&mut self, packed: &[u8], inclusive: bool, reverse: bool) {
        match (reverse, inclusive) {
            (false, true) => self.raise_start(at(packed)),
            (false, false) => self.raise_start(past(packed)),
            (true, true) => self.lower_stop(past(packed)),
            (true, false) => self.lower_stop(at(packed)),
        }
    }

    /// End position. `inclusive` marks a position just before the entry
    /// under `packed`, which is then excluded; otherwise it is included.
    pub(super) fn apply_end_cursor(&mut self, packed: &[u8], inclusive: bool, reverse: bool) {
        match (reverse, inclusive) {
            (false, true) => self.lower_stop(at(packed)),
            (false, false) => self.lower_stop(past(packed)),
            (true, true) => self.raise_start(past(packed)),
            (true, false) => self.raise_start(at(packed)),
        }
    }

    fn raise_start(&mut self, start: KeySelector) {
        if self.start.as_ref().is_none_or(|current| start.key() > current.key()) {
            self.start = Some(start);
        }
    }

    fn lower_stop(&mut self, stop: KeySelector) {
        if self.stop.as_ref().is_none_or(|current| stop.key() < current.key()) {
            self.stop = Some(stop);
        }
    }

    /// Final selectors, defaulting missing bounds to `subspace`.
    pub(super) fn finish(self, subspace: &Subspace) -> (KeySelector, KeySelector) {
        let (begin, end) = subspace.selectors();

        (self.start.unwrap_or(begin), self.stop.unwrap_or(end))
    }

    /// Selectors that select nothing.
    pub(super) fn empty(subspace: &Subspace) -> (KeySelector, KeySelector) {
        (at(subspace.prefix()), at(subspace.prefix()))
    }
}

// First key with prefix `packed`.
fn at(packed: &[u8]) -> KeySelector {
    KeySelector::first_greater_or_equal(packed.to_vec())
}

// First key past every key with prefix `packed`.
fn past(packed: &[u8]) -> KeySelector {
    KeySelector::first_greater_or_equal(strinc(packed))
}
