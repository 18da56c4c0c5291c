//! Instance header types shared by entities and relationships

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ulid::Ulid;

/// Unique identifier for an entity or relationship
///
/// Locally minted GUIDs are ULIDs, but the wrapper keeps the raw string so
/// identifiers assigned by other cohort members round-trip untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Guid(pub String);

impl Guid {
    /// Mint a fresh identifier
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Guid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Guid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Draft,
    Prepared,
    Proposed,
    #[default]
    Active,
    Deprecated,
    /// Set by delete only; cleared by restore, terminal via purge
    Deleted,
}

impl InstanceStatus {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// Whether this repository is authoritative for an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Originated in the local cohort collection; lineage is tracked here
    LocalCohort,
    /// Mirrored from another repository; the home collection owns lineage
    ExternalSource,
}

/// Header fields shared by entity and relationship instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceHeader {
    /// Unique identifier
    pub guid: Guid,

    /// Type name from the cohort's type registry
    pub type_name: String,

    /// Lifecycle status
    pub status: InstanceStatus,

    /// Starts at 1 and strictly increases with every mutation
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp, absent until the first update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Status held before a soft delete, present only while deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_on_delete: Option<InstanceStatus>,

    /// Identifier of the metadata collection this instance is homed in
    pub home_collection_id: String,

    /// Display name of the home collection
    pub home_collection_name: String,

    /// Whether this repository is authoritative for the instance
    pub provenance: Provenance,

    /// GUID this instance was re-identified from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub re_identified_from: Option<Guid>,

    /// Named property values
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl InstanceHeader {
    /// Create a header for a brand-new instance with a generated GUID
    pub fn new(
        type_name: impl Into<String>,
        home_collection_id: impl Into<String>,
        home_collection_name: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            guid: Guid::generate(),
            type_name: type_name.into(),
            status: InstanceStatus::default(),
            version: 1,
            created_at: Utc::now(),
            updated_at: None,
            status_on_delete: None,
            home_collection_id: home_collection_id.into(),
            home_collection_name: home_collection_name.into(),
            provenance,
            re_identified_from: None,
            properties: HashMap::new(),
        }
    }

    /// Timestamp an as-of-time query compares against
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Record a mutation: move to `version` and stamp the update time
    pub fn touch(&mut self, version: u64) {
        self.version = version;
        self.updated_at = Some(Utc::now());
    }

    pub fn is_homed_in(&self, collection_id: &str) -> bool {
        self.home_collection_id == collection_id
    }
}
