use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{MemberId, ParentId, PivotAttributes, PivotRow},
    error::ApiError,
};

/// Members named by an attach request.
///
/// A JSON object keyed by member id has no reliable iteration order, so it
/// deserializes into [`AttachMembers::Keyed`] and is rejected before any order
/// is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachMembers {
    One(i64),
    Many(Vec<AttachEntry>),
    Keyed(HashMap<String, PivotAttributes>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachEntry {
    Id(i64),
    WithAttributes {
        member_id: i64,
        #[serde(default)]
        attributes: PivotAttributes,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetachMembers {
    One(i64),
    Many(Vec<i64>),
}

// Fields are optional so that a missing value surfaces as a validation error
// rather than a body rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachRequest {
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub member_ids: Option<AttachMembers>,
    #[serde(default)]
    pub attributes: PivotAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReorderRequest {
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default, alias = "related_id")]
    pub member_id: Option<i64>,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetachRequest {
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub member_ids: Option<DetachMembers>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeMembersResponse {
    pub parent_type: String,
    pub relation_name: String,
    pub parent_id: ParentId,
    pub members: Vec<PivotRow>,
}

impl ScopeMembersResponse {
    pub fn member_ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|row| row.member_id).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ScopeEvent {
    MembershipChanged {
        parent_type: String,
        relation_name: String,
        parent_id: ParentId,
        member_count: usize,
    },
    Error(ApiError),
}
