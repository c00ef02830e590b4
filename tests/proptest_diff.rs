//! Property-based tests for the change predicate
//!
//! `diff::changed` must agree with a plain multiset comparison of identity
//! keys, whatever the order of the inputs.

use function_discovery::aws::Lambda;
use function_discovery::diff::changed;
use function_discovery::model::Function;
use proptest::prelude::*;

fn arb_lambda() -> impl Strategy<Value = Lambda> {
    (
        prop::sample::select(vec!["hello", "resize", "thumbnail", "a:b"]),
        prop::sample::select(vec!["$LATEST", "1", "2", "c"]),
    )
        .prop_map(|(name, qualifier)| Lambda::new(name, qualifier))
}

fn arb_lambdas() -> impl Strategy<Value = Vec<Lambda>> {
    prop::collection::vec(arb_lambda(), 0..12)
}

/// Reference: sort both identity lists and compare
fn multiset_differs(a: &[Lambda], b: &[Lambda]) -> bool {
    let mut a: Vec<String> = a.iter().map(|l| l.to_string()).collect();
    let mut b: Vec<String> = b.iter().map(|l| l.to_string()).collect();
    a.sort();
    b.sort();
    a != b
}

proptest! {
    #[test]
    fn changed_matches_multiset_comparison(a in arb_lambdas(), b in arb_lambdas()) {
        prop_assert_eq!(changed(&a, &b), multiset_differs(&a, &b));
    }

    #[test]
    fn permutation_is_unchanged(a in arb_lambdas(), seed in any::<u64>()) {
        let mut shuffled = a.clone();
        // Deterministic rotation plus reverse stands in for a shuffle
        if !shuffled.is_empty() {
            let k = (seed as usize) % shuffled.len();
            shuffled.rotate_left(k);
        }
        if seed % 2 == 0 {
            shuffled.reverse();
        }
        prop_assert!(!changed(&a, &shuffled));
    }

    #[test]
    fn adding_or_removing_one_is_a_change(a in arb_lambdas(), extra in arb_lambda()) {
        let mut grown = a.clone();
        grown.push(extra);
        prop_assert!(changed(&a, &grown));
        prop_assert!(changed(&grown, &a));
    }

    #[test]
    fn changed_is_symmetric(a in arb_lambdas(), b in arb_lambdas()) {
        prop_assert_eq!(changed(&a, &b), changed(&b, &a));
    }

    /// Lambdas and the functions written for them share identities
    #[test]
    fn lambdas_and_functions_compare_by_name_and_qualifier(a in arb_lambdas()) {
        let functions: Vec<Function> = a.iter().map(|l| Function::new(l.to_string())).collect();
        prop_assert!(!changed(&functions, &a));
    }
}
