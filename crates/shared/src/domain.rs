use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ParentId);
id_newtype!(MemberId);

/// Free-form association attributes carried next to the order value.
pub type PivotAttributes = serde_json::Map<String, serde_json::Value>;

/// Identifies one ordered scope: every pivot row of a single parent in a single relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub parent_type: String,
    pub relation_name: String,
    pub parent_id: ParentId,
}

impl ScopeKey {
    pub fn new(
        parent_type: impl Into<String>,
        relation_name: impl Into<String>,
        parent_id: ParentId,
    ) -> Self {
        Self {
            parent_type: parent_type.into(),
            relation_name: relation_name.into(),
            parent_id,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}.{}",
            self.parent_type, self.parent_id, self.relation_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRow {
    pub parent_id: ParentId,
    pub member_id: MemberId,
    pub sort_order: u32,
    #[serde(default)]
    pub attributes: PivotAttributes,
    pub attached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSummary {
    pub parent_entity_type: String,
    pub relation_name: String,
}
