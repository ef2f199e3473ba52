use std::collections::{BTreeMap, VecDeque};

use crate::model::{MatchedPair, RecordDiff};
use crate::record::{Record, RecordKey};

/// Partition two record sets on the attribute key.
///
/// Multiset semantics: each right row pairs with at most one left row, so
/// `only_left + both == left` and `only_right + both == right` always hold.
/// Duplicate keys pair in input order. Every partition keeps the input order
/// of its source side.
pub fn diff_records(left: &[Record], right: &[Record], decimals: u32) -> RecordDiff {
    let mut pending: BTreeMap<RecordKey, VecDeque<usize>> = BTreeMap::new();
    for (i, r) in right.iter().enumerate() {
        pending.entry(r.key(decimals)).or_default().push_back(i);
    }

    let mut right_used = vec![false; right.len()];
    let mut only_left = Vec::new();
    let mut both = Vec::new();

    for l in left {
        let partner = pending
            .get_mut(&l.key(decimals))
            .and_then(|queue| queue.pop_front());
        match partner {
            Some(ri) => {
                right_used[ri] = true;
                both.push(MatchedPair {
                    left: l.clone(),
                    right: right[ri].clone(),
                });
            }
            None => only_left.push(l.clone()),
        }
    }

    let only_right = right
        .iter()
        .zip(&right_used)
        .filter(|(_, used)| !**used)
        .map(|(r, _)| r.clone())
        .collect();

    RecordDiff {
        only_left,
        only_right,
        both,
    }
}
