use carboncat::model::filter::{self, Filter, FilterOperation};
use proptest::prelude::*;

fn operation() -> impl Strategy<Value = FilterOperation> {
    prop_oneof![
        Just(FilterOperation::Eq),
        Just(FilterOperation::NotEq),
        Just(FilterOperation::Contains),
    ]
}

fn non_timestamp_filter() -> impl Strategy<Value = Filter> {
    ("[a-z][a-z.]{0,8}", operation(), "[a-zA-Z0-9 ]{0,6}")
        .prop_filter("timestamp is reserved", |(k, _, _)| k != "timestamp")
        .prop_map(|(k, op, v)| Filter::new(k, op, v))
}

fn filter_list() -> impl Strategy<Value = Vec<Filter>> {
    // distinct elements, so toggling F in is well-defined
    prop::collection::vec(non_timestamp_filter(), 0..6).prop_map(|mut list| {
        let mut seen = Vec::new();
        list.retain(|f| {
            if seen.contains(f) {
                false
            } else {
                seen.push(f.clone());
                true
            }
        });
        list
    })
}

proptest! {
    #[test]
    fn add_is_its_own_inverse(list in filter_list(), f in non_timestamp_filter()) {
        prop_assume!(!list.contains(&f));
        let once = filter::add(&list, &f);
        prop_assert_eq!(once.last(), Some(&f));
        prop_assert_eq!(filter::add(&once, &f), list.clone());
        prop_assert_eq!(filter::remove(&once, &f), list);
    }

    #[test]
    fn timestamp_filters_never_enter(list in filter_list(), op in operation(), v in "[0-9:-]{0,10}") {
        let ts = Filter::new("timestamp", op, v);
        prop_assert_eq!(filter::add(&list, &ts), list.clone());
        prop_assert_eq!(filter::remove(&list, &ts), list);
    }

    #[test]
    fn only_leaves_a_single_filter(list in filter_list(), f in non_timestamp_filter()) {
        prop_assert_eq!(filter::only(&list, &f), vec![f]);
    }
}
