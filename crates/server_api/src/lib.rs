use std::collections::{HashMap, HashSet};

use ordering::{MemberSelection, NewMember, OrderedAssociation, OrderingError, RelationConfig};
use serde::Deserialize;
use shared::{
    domain::{MemberId, ParentId, RelationSummary},
    error::{ApiError, ErrorCode},
    protocol::{
        AttachEntry, AttachMembers, AttachRequest, DetachMembers, DetachRequest, ReorderRequest,
        ScopeMembersResponse,
    },
};
use storage::Storage;
use tracing::warn;

/// One `[[sortable]]` entry as it appears in configuration. Both fields are
/// required; they are optional here so a missing one is reported by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationSetting {
    pub parent_entity_type: Option<String>,
    pub relation_name: Option<String>,
}

impl RelationSetting {
    pub fn new(parent_entity_type: &str, relation_name: &str) -> Self {
        Self {
            parent_entity_type: Some(parent_entity_type.to_string()),
            relation_name: Some(relation_name.to_string()),
        }
    }
}

/// Every sortable relation the service manages, keyed by
/// `(parent_entity_type, relation_name)`.
#[derive(Clone)]
pub struct RelationRegistry {
    relations: HashMap<(String, String), OrderedAssociation<Storage>>,
}

impl RelationRegistry {
    pub fn build(storage: &Storage, settings: &[RelationSetting]) -> Result<Self, OrderingError> {
        if settings.is_empty() {
            return Err(OrderingError::Configuration(
                "at least one sortable relation must be configured".into(),
            ));
        }

        let mut relations = HashMap::new();
        for (index, setting) in settings.iter().enumerate() {
            let parent_entity_type = setting.parent_entity_type.as_deref().ok_or_else(|| {
                OrderingError::Configuration(format!(
                    "sortable relation #{index}: please specify parent_entity_type"
                ))
            })?;
            let relation_name = setting.relation_name.as_deref().ok_or_else(|| {
                OrderingError::Configuration(format!(
                    "sortable relation #{index}: please specify relation_name"
                ))
            })?;
            let config = RelationConfig::new(parent_entity_type, relation_name)?;
            let key = (
                config.parent_entity_type.clone(),
                config.relation_name.clone(),
            );
            if relations.contains_key(&key) {
                return Err(OrderingError::Configuration(format!(
                    "sortable relation {}.{} is configured twice",
                    key.0, key.1
                )));
            }
            relations.insert(key, OrderedAssociation::new(config, storage.clone()));
        }
        Ok(Self { relations })
    }

    pub fn get(
        &self,
        parent_type: &str,
        relation_name: &str,
    ) -> Option<&OrderedAssociation<Storage>> {
        self.relations
            .get(&(parent_type.to_string(), relation_name.to_string()))
    }

    pub fn summaries(&self) -> Vec<RelationSummary> {
        let mut summaries: Vec<RelationSummary> = self
            .relations
            .values()
            .map(|association| association.config().summary())
            .collect();
        summaries.sort_by(|a, b| {
            (&a.parent_entity_type, &a.relation_name).cmp(&(&b.parent_entity_type, &b.relation_name))
        });
        summaries
    }
}

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub relations: RelationRegistry,
}

pub fn list_relations(ctx: &ApiContext) -> Vec<RelationSummary> {
    ctx.relations.summaries()
}

pub async fn list_members(
    ctx: &ApiContext,
    parent_type: &str,
    relation_name: &str,
    parent_id: i64,
) -> Result<ScopeMembersResponse, ApiError> {
    let association = relation(ctx, parent_type, relation_name)?;
    let parent_id = parse_parent_id(Some(parent_id))?;
    members_response(association, parent_id).await
}

pub async fn attach_members(
    ctx: &ApiContext,
    parent_type: &str,
    relation_name: &str,
    request: AttachRequest,
) -> Result<ScopeMembersResponse, ApiError> {
    let association = relation(ctx, parent_type, relation_name)?;
    let parent_id = parse_parent_id(request.parent_id)?;
    let selection = parse_attach_members(request.member_ids)?;

    association
        .attach(parent_id, selection, &request.attributes)
        .await
        .map_err(rejected)?;
    members_response(association, parent_id).await
}

pub async fn reorder_member(
    ctx: &ApiContext,
    parent_type: &str,
    relation_name: &str,
    request: ReorderRequest,
) -> Result<ScopeMembersResponse, ApiError> {
    let association = relation(ctx, parent_type, relation_name)?;
    let parent_id = parse_parent_id(request.parent_id)?;
    let member_id = parse_member_id(request.member_id)?;
    let position = parse_position(request.position)?;

    association
        .reorder(parent_id, member_id, position)
        .await
        .map_err(rejected)?;
    members_response(association, parent_id).await
}

pub async fn detach_members(
    ctx: &ApiContext,
    parent_type: &str,
    relation_name: &str,
    request: DetachRequest,
) -> Result<ScopeMembersResponse, ApiError> {
    let association = relation(ctx, parent_type, relation_name)?;
    let parent_id = parse_parent_id(request.parent_id)?;
    let member_ids = match request.member_ids {
        Some(DetachMembers::One(id)) => vec![parse_member_id(Some(id))?],
        Some(DetachMembers::Many(ids)) => ids
            .into_iter()
            .map(|id| parse_member_id(Some(id)))
            .collect::<Result<Vec<_>, _>>()?,
        None => return Err(missing("member_ids")),
    };

    association
        .detach(parent_id, &member_ids)
        .await
        .map_err(rejected)?;
    members_response(association, parent_id).await
}

fn relation<'a>(
    ctx: &'a ApiContext,
    parent_type: &str,
    relation_name: &str,
) -> Result<&'a OrderedAssociation<Storage>, ApiError> {
    ctx.relations.get(parent_type, relation_name).ok_or_else(|| {
        ApiError::new(
            ErrorCode::NotFound,
            format!("{parent_type}.{relation_name} is not a sortable relation"),
        )
    })
}

async fn members_response(
    association: &OrderedAssociation<Storage>,
    parent_id: ParentId,
) -> Result<ScopeMembersResponse, ApiError> {
    let members = association
        .ordered_members(parent_id)
        .await
        .map_err(rejected)?;
    let config = association.config();
    Ok(ScopeMembersResponse {
        parent_type: config.parent_entity_type.clone(),
        relation_name: config.relation_name.clone(),
        parent_id,
        members,
    })
}

fn rejected(error: OrderingError) -> ApiError {
    if matches!(
        error,
        OrderingError::CascadeInterrupted { .. } | OrderingError::Store(_)
    ) {
        warn!(%error, "sortable relation update failed");
    }
    error.into()
}

fn missing(field: &str) -> ApiError {
    ApiError::new(ErrorCode::Validation, format!("please specify {field}"))
}

pub fn parse_parent_id(raw: Option<i64>) -> Result<ParentId, ApiError> {
    match raw {
        Some(id) if id > 0 => Ok(ParentId(id)),
        Some(id) => Err(ApiError::new(
            ErrorCode::Validation,
            format!("parent_id must be positive, got {id}"),
        )),
        None => Err(missing("parent_id")),
    }
}

pub fn parse_member_id(raw: Option<i64>) -> Result<MemberId, ApiError> {
    match raw {
        Some(id) if id > 0 => Ok(MemberId(id)),
        Some(id) => Err(ApiError::new(
            ErrorCode::Validation,
            format!("member_id must be positive, got {id}"),
        )),
        None => Err(missing("member_id")),
    }
}

pub fn parse_position(raw: Option<i64>) -> Result<u32, ApiError> {
    let position = raw.ok_or_else(|| missing("position"))?;
    u32::try_from(position)
        .ok()
        .filter(|position| *position >= 1)
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::Validation,
                format!("position must be between 1 and {}, got {position}", u32::MAX),
            )
        })
}

pub fn parse_attach_members(raw: Option<AttachMembers>) -> Result<MemberSelection, ApiError> {
    match raw {
        Some(AttachMembers::One(id)) => Ok(MemberSelection::Single(parse_member_id(Some(id))?)),
        Some(AttachMembers::Many(entries)) => entries
            .into_iter()
            .map(|entry| match entry {
                AttachEntry::Id(id) => Ok(NewMember::new(parse_member_id(Some(id))?)),
                AttachEntry::WithAttributes {
                    member_id,
                    attributes,
                } => Ok(NewMember::with_attributes(
                    parse_member_id(Some(member_id))?,
                    attributes,
                )),
            })
            .collect::<Result<Vec<_>, ApiError>>()
            .map(MemberSelection::Ordered),
        Some(AttachMembers::Keyed(map)) => {
            let ids = map
                .keys()
                .map(|key| {
                    key.parse::<i64>()
                        .map_err(|_| {
                            ApiError::new(
                                ErrorCode::Validation,
                                format!("member id '{key}' is not an integer"),
                            )
                        })
                        .and_then(|id| parse_member_id(Some(id)))
                })
                .collect::<Result<HashSet<_>, _>>()?;
            Ok(MemberSelection::Unordered(ids))
        }
        None => Err(missing("member_ids")),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
