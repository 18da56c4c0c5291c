//! Query and filter types for find and neighborhood operations

use crate::instance::{Guid, InstanceStatus};
use crate::limits::{MAX_NEIGHBORHOOD_LEVEL, MAX_PAGE_SIZE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a set of property conditions combines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every property must match
    #[default]
    All,
    /// At least one property must match
    Any,
    /// No property may match
    None,
}

/// Property conditions evaluated by the cohort's property matcher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchCriteria {
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub mode: MatchMode,
}

impl MatchCriteria {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            properties: HashMap::new(),
            mode,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

/// Apply a status filter
///
/// An empty filter admits everything except deleted records; a non-empty
/// filter admits exactly the listed statuses, so listing `Deleted`
/// explicitly includes soft-deleted records.
pub fn status_passes(status: InstanceStatus, filter: &[InstanceStatus]) -> bool {
    if filter.is_empty() {
        !status.is_deleted()
    } else {
        filter.contains(&status)
    }
}

/// Paging window over a result list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paging {
    /// Index of the first element to return
    #[serde(default)]
    pub from_element: usize,

    /// Number of results per page; 0 disables the limit
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    100
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            from_element: 0,
            page_size: default_page_size(),
        }
    }
}

impl Paging {
    pub fn new(from_element: usize, page_size: usize) -> Self {
        Self {
            from_element,
            page_size: page_size.min(MAX_PAGE_SIZE),
        }
    }

    /// Window admitting every result
    pub fn unbounded() -> Self {
        Self {
            from_element: 0,
            page_size: 0,
        }
    }
}

/// Property or header field a result list is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencingOrder {
    #[default]
    Guid,
    CreationDate,
    LastUpdate,
    PropertyAscending,
    PropertyDescending,
}

/// Ordering applied to a result list before paging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sequencing {
    /// Property to order by, for the property orderings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,

    #[serde(default)]
    pub order: SequencingOrder,
}

impl Sequencing {
    pub fn by_property(name: impl Into<String>, descending: bool) -> Self {
        Self {
            property: Some(name.into()),
            order: if descending {
                SequencingOrder::PropertyDescending
            } else {
                SequencingOrder::PropertyAscending
            },
        }
    }
}

/// Find query over the entity store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityFindQuery {
    /// Admit only these type names; subtype semantics live with the
    /// type validator. Empty admits every type.
    #[serde(default)]
    pub type_filter: Vec<String>,

    /// Admit only these statuses; empty excludes deleted records
    #[serde(default)]
    pub status_filter: Vec<InstanceStatus>,

    /// Entity must carry every listed classification
    #[serde(default)]
    pub classification_filter: Vec<String>,

    /// Property conditions, evaluated by the property matcher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<MatchCriteria>,

    /// Substring searched across string-valued properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_string: Option<String>,

    /// Reconstruct the store as of this instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,

    #[serde(default)]
    pub paging: Paging,

    #[serde(default)]
    pub sequencing: Sequencing,
}

impl EntityFindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_filter.push(type_name.into());
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status_filter.push(status);
        self
    }

    pub fn with_classification(mut self, name: impl Into<String>) -> Self {
        self.classification_filter.push(name.into());
        self
    }

    pub fn with_criteria(mut self, criteria: MatchCriteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn with_search_string(mut self, search: impl Into<String>) -> Self {
        self.search_string = Some(search.into());
        self
    }

    pub fn as_of(mut self, instant: DateTime<Utc>) -> Self {
        self.as_of = Some(instant);
        self
    }

    pub fn with_paging(mut self, from_element: usize, page_size: usize) -> Self {
        self.paging = Paging::new(from_element, page_size);
        self
    }

    pub fn with_sequencing(mut self, sequencing: Sequencing) -> Self {
        self.sequencing = sequencing;
        self
    }
}

/// Find query over the relationship store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipFindQuery {
    /// Admit only these type names; empty admits every type
    #[serde(default)]
    pub type_filter: Vec<String>,

    /// Admit only these statuses; empty excludes deleted records
    #[serde(default)]
    pub status_filter: Vec<InstanceStatus>,

    /// Property conditions, evaluated by the property matcher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<MatchCriteria>,

    /// Substring searched across string-valued properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_string: Option<String>,

    /// Reconstruct the store as of this instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,

    #[serde(default)]
    pub paging: Paging,

    #[serde(default)]
    pub sequencing: Sequencing,
}

impl RelationshipFindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_filter.push(type_name.into());
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status_filter.push(status);
        self
    }

    pub fn with_criteria(mut self, criteria: MatchCriteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn with_search_string(mut self, search: impl Into<String>) -> Self {
        self.search_string = Some(search.into());
        self
    }

    pub fn as_of(mut self, instant: DateTime<Utc>) -> Self {
        self.as_of = Some(instant);
        self
    }

    pub fn with_paging(mut self, from_element: usize, page_size: usize) -> Self {
        self.paging = Paging::new(from_element, page_size);
        self
    }
}

/// Listing of the relationships anchored at one entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRelationshipsQuery {
    /// Admit only these statuses; empty excludes deleted records
    #[serde(default)]
    pub status_filter: Vec<InstanceStatus>,

    /// Reconstruct the store as of this instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,

    #[serde(default)]
    pub paging: Paging,
}

impl EntityRelationshipsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status_filter.push(status);
        self
    }

    pub fn as_of(mut self, instant: DateTime<Utc>) -> Self {
        self.as_of = Some(instant);
        self
    }

    pub fn with_paging(mut self, from_element: usize, page_size: usize) -> Self {
        self.paging = Paging::new(from_element, page_size);
        self
    }
}

/// Neighborhood traversal request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodQuery {
    /// Entity the sub-graph radiates from
    pub root: Guid,

    /// Both ends of a relationship must carry one of these types;
    /// empty admits every entity type
    #[serde(default)]
    pub entity_type_filter: Vec<String>,

    /// Admit only relationships of these types; empty admits every type
    #[serde(default)]
    pub relationship_type_filter: Vec<String>,

    /// Admit only these statuses; empty excludes deleted records
    #[serde(default)]
    pub status_filter: Vec<InstanceStatus>,

    /// Both ends of a relationship must carry every listed classification
    #[serde(default)]
    pub classification_filter: Vec<String>,

    /// Hop bound; any value outside [1, 100] is treated as 100
    #[serde(default = "default_level")]
    pub level: i32,

    /// Reconstruct the store as of this instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

fn default_level() -> i32 {
    MAX_NEIGHBORHOOD_LEVEL as i32
}

impl NeighborhoodQuery {
    pub fn new(root: Guid) -> Self {
        Self {
            root,
            entity_type_filter: Vec::new(),
            relationship_type_filter: Vec::new(),
            status_filter: Vec::new(),
            classification_filter: Vec::new(),
            level: default_level(),
            as_of: None,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_entity_type(mut self, type_name: impl Into<String>) -> Self {
        self.entity_type_filter.push(type_name.into());
        self
    }

    pub fn with_relationship_type(mut self, type_name: impl Into<String>) -> Self {
        self.relationship_type_filter.push(type_name.into());
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status_filter.push(status);
        self
    }

    pub fn with_classification(mut self, name: impl Into<String>) -> Self {
        self.classification_filter.push(name.into());
        self
    }

    pub fn as_of(mut self, instant: DateTime<Utc>) -> Self {
        self.as_of = Some(instant);
        self
    }
}
