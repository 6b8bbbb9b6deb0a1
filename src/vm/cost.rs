//! Run-limit constants and stack memory costing.
//!
//! The run limit is the machine's only resource-exhaustion defense: every
//! instruction path costs at least one unit and the limit only decreases
//! (refunds are folded into the same settlement as the charges they offset),
//! so execution always terminates without a timeout.

use crate::types::bytes::Bytes;

/// Initial budget for a top-level verification.
pub const DEFAULT_RUN_LIMIT: i64 = 10_000;

/// Fixed overhead charged per stack item on top of its byte length.
pub const STACK_ITEM_OVERHEAD: i64 = 8;

/// Net refund applied by CHECKPREDICATE after its base charge, leaving a
/// net fixed cost of 64 once the child budget is accounted separately.
pub const PREDICATE_REFUND: i64 = 192;

/// Memory cost of one stack value: overhead plus its length.
pub fn value_cost(value: &[u8]) -> i64 {
    STACK_ITEM_OVERHEAD + value.len() as i64
}

/// Aggregate memory cost of a whole stack.
pub fn stack_cost(items: &[Bytes]) -> i64 {
    items.iter().map(|v| value_cost(v)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_cost_is_overhead_plus_length() {
        assert_eq!(value_cost(&[]), 8);
        assert_eq!(value_cost(&[0; 5]), 13);
    }

    #[test]
    fn stack_cost_sums_items() {
        let items = [Bytes::from(b"ab"), Bytes::default(), Bytes::from(b"xyz")];
        assert_eq!(stack_cost(&items), 10 + 8 + 11);
        assert_eq!(stack_cost(&[]), 0);
    }
}
