//! Property-based tests for the tag algebra laws.

use proptest::prelude::*;

use crate::describe::describe;
use crate::tag::Tag;

fn tag_strategy() -> impl Strategy<Value = Tag> {
    any::<u32>().prop_map(Tag::from_bits)
}

proptest! {
    /// Property: combine is commutative.
    #[test]
    fn prop_combine_commutative(a in tag_strategy(), b in tag_strategy()) {
        prop_assert_eq!(a.combine(b), b.combine(a));
    }

    /// Property: combine is associative.
    #[test]
    fn prop_combine_associative(a in tag_strategy(), b in tag_strategy(), c in tag_strategy()) {
        prop_assert_eq!(a.combine(b.combine(c)), a.combine(b).combine(c));
    }

    /// Property: CLEAR is the identity.
    #[test]
    fn prop_clear_is_identity(a in tag_strategy()) {
        prop_assert_eq!(a.combine(Tag::CLEAR), a);
        prop_assert_eq!(Tag::CLEAR.combine(a), a);
    }

    /// Property: combine is idempotent.
    #[test]
    fn prop_combine_idempotent(a in tag_strategy()) {
        prop_assert_eq!(a.combine(a), a);
    }

    /// Property: combining never loses a bit of either operand.
    #[test]
    fn prop_combine_is_upper_bound(a in tag_strategy(), b in tag_strategy()) {
        let joined = a.combine(b);
        for bit in a.iter_bits().chain(b.iter_bits()) {
            prop_assert!(joined.has(bit));
        }
    }

    /// Property: clear always yields the untainted tag.
    #[test]
    fn prop_clear_yields_zero(a in tag_strategy()) {
        prop_assert!(a.clear().is_clear());
    }

    /// Property: rendering is total and never empty.
    #[test]
    fn prop_describe_total(a in tag_strategy()) {
        let text = describe(a);
        prop_assert!(!text.is_empty());
        prop_assert_eq!(text.contains("Unrecognized"), a.unrecognized().is_tainted());
    }
}
