use nova_flow::{PackedParams, ParamSet, ParamsValue, WideParams};
use proptest::prelude::*;

const PROPTEST_CASES: u32 = 256;

/// Parameter flags plus a word width, over a shared arity.
fn arb_values(count: usize) -> impl Strategy<Value = (usize, Vec<(Vec<bool>, u8)>)> {
    (0usize..=32).prop_flat_map(move |arity| {
        let value = (prop::collection::vec(any::<bool>(), arity), 1u8..=2);
        (Just(arity), prop::collection::vec(value, count))
    })
}

fn build<S: ParamSet>(arity: usize, (flags, size): &(Vec<bool>, u8)) -> ParamsValue<S> {
    let mut params = S::empty(arity);
    for (index, _) in flags.iter().enumerate().filter(|&(_, &set)| set) {
        params.insert(index);
    }
    ParamsValue::with_params(params, *size)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: PROPTEST_CASES, .. ProptestConfig::default() })]

    #[test]
    fn merge_is_idempotent((arity, values) in arb_values(1)) {
        let v = build::<PackedParams>(arity, &values[0]);
        prop_assert_eq!(v.merge(&v), v.clone());
        let w = build::<WideParams>(arity, &values[0]);
        prop_assert_eq!(w.merge(&w), w.clone());
    }

    #[test]
    fn merge_is_commutative((arity, values) in arb_values(2)) {
        let a = build::<WideParams>(arity, &values[0]);
        let b = build::<WideParams>(arity, &values[1]);
        prop_assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn merge_is_associative((arity, values) in arb_values(3)) {
        let a = build::<PackedParams>(arity, &values[0]);
        let b = build::<PackedParams>(arity, &values[1]);
        let c = build::<PackedParams>(arity, &values[2]);
        prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn representations_agree((arity, values) in arb_values(2)) {
        let packed = build::<PackedParams>(arity, &values[0])
            .merge(&build::<PackedParams>(arity, &values[1]));
        let wide = build::<WideParams>(arity, &values[0])
            .merge(&build::<WideParams>(arity, &values[1]));
        prop_assert_eq!(packed.params.to_bools(arity), wide.params.to_bools(arity));
        prop_assert_eq!(packed.width(), wide.width());
        prop_assert_eq!(packed.params.is_empty(), wide.params.is_empty());
    }

    #[test]
    fn merge_is_an_upper_bound((arity, values) in arb_values(2)) {
        let a = build::<WideParams>(arity, &values[0]);
        let b = build::<WideParams>(arity, &values[1]);
        let joined = a.merge(&b);
        for index in 0..arity {
            prop_assert_eq!(
                joined.params.contains(index),
                a.params.contains(index) || b.params.contains(index)
            );
        }
        prop_assert_eq!(joined.width(), a.width().min(b.width()));
    }
}

#[test]
fn single_parameter_values() {
    let packed = ParamsValue::<PackedParams>::parameter(3, 2);
    let wide = ParamsValue::<WideParams>::parameter(3, 2);
    assert_eq!(packed.params.to_bools(3), vec![false, false, true]);
    assert_eq!(wide.params.to_bools(3), packed.params.to_bools(3));
    assert_eq!(packed.width(), 1);
    assert!(ParamsValue::<WideParams>::untracked(3, 2).params.is_empty());
}
