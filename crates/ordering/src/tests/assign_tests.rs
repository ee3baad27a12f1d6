use std::collections::HashSet;

use serde_json::json;

use super::*;

fn attrs(value: serde_json::Value) -> PivotAttributes {
    value.as_object().cloned().expect("object")
}

#[test]
fn single_member_is_appended_after_current_count() {
    let assigned = assign_orders(3, MemberSelection::Single(MemberId(9)), &PivotAttributes::new())
        .expect("assign");
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].member_id, MemberId(9));
    assert_eq!(assigned[0].sort_order, 4);
}

#[test]
fn ordered_members_receive_sequential_orders_in_input_order() {
    let selection = MemberSelection::ids([MemberId(30), MemberId(10), MemberId(20)]);
    let assigned = assign_orders(0, selection, &PivotAttributes::new()).expect("assign");
    let orders: Vec<(i64, u32)> = assigned
        .iter()
        .map(|member| (member.member_id.0, member.sort_order))
        .collect();
    assert_eq!(orders, vec![(30, 1), (10, 2), (20, 3)]);
}

#[test]
fn per_member_attributes_layer_over_shared_attributes() {
    let selection = MemberSelection::Ordered(vec![
        NewMember::new(MemberId(1)),
        NewMember::with_attributes(MemberId(2), attrs(json!({ "role": "editor" }))),
    ]);
    let shared = attrs(json!({ "role": "viewer", "source": "import" }));

    let assigned = assign_orders(5, selection, &shared).expect("assign");
    assert_eq!(assigned[0].sort_order, 6);
    assert_eq!(assigned[0].attributes["role"], "viewer");
    assert_eq!(assigned[1].sort_order, 7);
    assert_eq!(assigned[1].attributes["role"], "editor");
    assert_eq!(assigned[1].attributes["source"], "import");
}

#[test]
fn unordered_selection_is_rejected() {
    let set: HashSet<MemberId> = [MemberId(1), MemberId(2)].into_iter().collect();
    let err = assign_orders(0, MemberSelection::Unordered(set), &PivotAttributes::new())
        .expect_err("unordered");
    assert!(matches!(err, OrderingError::Validation(_)));
}

#[test]
fn empty_and_duplicate_selections_are_rejected() {
    let err = assign_orders(0, MemberSelection::Ordered(Vec::new()), &PivotAttributes::new())
        .expect_err("empty");
    assert!(matches!(err, OrderingError::Validation(_)));

    let err = assign_orders(
        0,
        MemberSelection::ids([MemberId(4), MemberId(4)]),
        &PivotAttributes::new(),
    )
    .expect_err("duplicate");
    assert!(matches!(err, OrderingError::Validation(_)));
}
