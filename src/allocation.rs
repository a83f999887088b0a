//! Allocation-check helpers used by backend card-allocation policies.
//!
//! Both operate on the snapshot the peer sends with every `allocate_card` call;
//! nothing here is stored by the node.

use uuid::Uuid;

use crate::model::Allocation;

/// True iff the exact `(card_id, channel_id)` pair is already committed.
pub fn already_allocated(allocations: &[Allocation], card_id: &str, channel_id: Uuid) -> bool {
    allocations
        .iter()
        .any(|a| a.card_id == card_id && a.channel_id == channel_id)
}

/// Number of committed allocations on `card_id`, regardless of channel.
pub fn count_allocated(allocations: &[Allocation], card_id: &str) -> usize {
    allocations.iter().filter(|a| a.card_id == card_id).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn exact_pair_matches() {
        let snapshot = [Allocation::new("A", ch(7)), Allocation::new("B", ch(9))];
        assert!(already_allocated(&snapshot, "A", ch(7)));
        assert!(!already_allocated(&snapshot, "C", ch(7)));
        assert!(!already_allocated(&snapshot, "A", ch(9)));
        assert!(!already_allocated(&[], "A", ch(7)));
    }

    #[test]
    fn counts_ignore_channel() {
        let snapshot = [
            Allocation::new("A", ch(7)),
            Allocation::new("A", ch(9)),
            Allocation::new("B", ch(7)),
        ];
        assert_eq!(count_allocated(&snapshot, "A"), 2);
        assert_eq!(count_allocated(&snapshot, "B"), 1);
        assert_eq!(count_allocated(&snapshot, "Z"), 0);
    }
}
