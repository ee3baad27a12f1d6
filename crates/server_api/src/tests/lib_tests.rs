use super::*;
use serde_json::json;

async fn setup() -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let relations = RelationRegistry::build(
        &storage,
        &[
            RelationSetting::new("post", "tags"),
            RelationSetting::new("playlist", "tracks"),
        ],
    )
    .expect("registry");
    ApiContext { storage, relations }
}

fn attach_request(value: serde_json::Value) -> AttachRequest {
    serde_json::from_value(value).expect("attach request")
}

fn ids(response: &ScopeMembersResponse) -> Vec<i64> {
    response.member_ids().into_iter().map(|id| id.0).collect()
}

#[tokio::test]
async fn registry_requires_both_configuration_fields() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let missing_type = RelationSetting {
        parent_entity_type: None,
        relation_name: Some("tags".into()),
    };
    let err = RelationRegistry::build(&storage, &[missing_type])
        .err()
        .expect("missing parent type");
    assert!(matches!(err, OrderingError::Configuration(_)));

    let missing_relation = RelationSetting {
        parent_entity_type: Some("post".into()),
        relation_name: None,
    };
    let err = RelationRegistry::build(&storage, &[missing_relation])
        .err()
        .expect("missing relation");
    assert!(err.to_string().contains("relation_name"));

    assert!(RelationRegistry::build(&storage, &[]).is_err());
}

#[tokio::test]
async fn registry_rejects_duplicate_relations() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let err = RelationRegistry::build(
        &storage,
        &[
            RelationSetting::new("post", "tags"),
            RelationSetting::new("post", " tags "),
        ],
    )
    .err()
    .expect("duplicate");
    assert!(matches!(err, OrderingError::Configuration(_)));
}

#[tokio::test]
async fn lists_configured_relations_sorted() {
    let ctx = setup().await;
    let relations = list_relations(&ctx);
    assert_eq!(relations.len(), 2);
    assert_eq!(relations[0].parent_entity_type, "playlist");
    assert_eq!(relations[1].relation_name, "tags");
}

#[tokio::test]
async fn unknown_relation_is_not_found() {
    let ctx = setup().await;
    let err = list_members(&ctx, "post", "comments", 1)
        .await
        .expect_err("unknown");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn attach_reorder_and_detach_round_trip() {
    let ctx = setup().await;

    let attached = attach_members(
        &ctx,
        "post",
        "tags",
        attach_request(json!({ "parent_id": 1, "member_ids": [1, 2, 3, 4] })),
    )
    .await
    .expect("attach");
    assert_eq!(ids(&attached), vec![1, 2, 3, 4]);

    let reordered = reorder_member(
        &ctx,
        "post",
        "tags",
        ReorderRequest {
            parent_id: Some(1),
            member_id: Some(1),
            position: Some(3),
        },
    )
    .await
    .expect("reorder");
    assert_eq!(ids(&reordered), vec![2, 3, 1, 4]);
    let orders: Vec<u32> = reordered.members.iter().map(|row| row.sort_order).collect();
    assert_eq!(orders, vec![1, 2, 3, 4]);

    let detached = detach_members(
        &ctx,
        "post",
        "tags",
        DetachRequest {
            parent_id: Some(1),
            member_ids: Some(DetachMembers::One(3)),
        },
    )
    .await
    .expect("detach");
    assert_eq!(ids(&detached), vec![2, 1, 4]);

    let listed = list_members(&ctx, "post", "tags", 1).await.expect("list");
    assert_eq!(ids(&listed), vec![2, 1, 4]);
}

#[tokio::test]
async fn attach_accepts_per_member_attributes() {
    let ctx = setup().await;
    let response = attach_members(
        &ctx,
        "playlist",
        "tracks",
        attach_request(json!({
            "parent_id": 9,
            "member_ids": [5, { "member_id": 6, "attributes": { "fade_in": true } }],
            "attributes": { "added_by": "import" }
        })),
    )
    .await
    .expect("attach");

    assert_eq!(ids(&response), vec![5, 6]);
    assert_eq!(response.members[0].attributes["added_by"], "import");
    assert_eq!(response.members[1].attributes["fade_in"], true);
    assert_eq!(response.members[1].attributes["added_by"], "import");
}

#[tokio::test]
async fn keyed_attach_is_rejected_as_unordered() {
    let ctx = setup().await;
    let err = attach_members(
        &ctx,
        "post",
        "tags",
        attach_request(json!({ "parent_id": 1, "member_ids": { "3": {}, "1": {} } })),
    )
    .await
    .expect_err("unordered");
    assert_eq!(err.code, ErrorCode::Validation);

    let listed = list_members(&ctx, "post", "tags", 1).await.expect("list");
    assert!(listed.members.is_empty());
}

#[tokio::test]
async fn missing_request_fields_are_validation_errors() {
    let ctx = setup().await;

    let err = reorder_member(
        &ctx,
        "post",
        "tags",
        ReorderRequest {
            parent_id: Some(1),
            member_id: None,
            position: Some(1),
        },
    )
    .await
    .expect_err("member missing");
    assert_eq!(err.code, ErrorCode::Validation);
    assert!(err.message.contains("member_id"));

    let err = reorder_member(
        &ctx,
        "post",
        "tags",
        ReorderRequest {
            parent_id: Some(1),
            member_id: Some(1),
            position: Some(0),
        },
    )
    .await
    .expect_err("position zero");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = attach_members(&ctx, "post", "tags", AttachRequest::default())
        .await
        .expect_err("parent missing");
    assert!(err.message.contains("parent_id"));

    let err = detach_members(
        &ctx,
        "post",
        "tags",
        DetachRequest {
            parent_id: Some(-4),
            member_ids: Some(DetachMembers::One(1)),
        },
    )
    .await
    .expect_err("negative parent");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn out_of_range_position_is_a_scope_conflict() {
    let ctx = setup().await;
    attach_members(
        &ctx,
        "post",
        "tags",
        attach_request(json!({ "parent_id": 2, "member_ids": [1, 2] })),
    )
    .await
    .expect("attach");

    let err = reorder_member(
        &ctx,
        "post",
        "tags",
        ReorderRequest {
            parent_id: Some(2),
            member_id: Some(1),
            position: Some(3),
        },
    )
    .await
    .expect_err("out of range");
    assert_eq!(err.code, ErrorCode::ScopeConsistency);
}

#[test]
fn parse_position_rejects_values_outside_u32() {
    assert_eq!(parse_position(Some(2)).expect("valid"), 2);
    assert!(parse_position(Some(i64::from(u32::MAX) + 1)).is_err());
    assert!(parse_position(Some(-1)).is_err());
    assert!(parse_position(None).is_err());
}
