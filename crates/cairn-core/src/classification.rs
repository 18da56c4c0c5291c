//! Classifications - named, versioned property attachments on entities

use crate::instance::Provenance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a classification came to sit on an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationOrigin {
    /// Directly assigned to the entity
    Assigned,
    /// Propagated along a relationship
    Propagated,
}

/// A named property attachment, independent of the entity's type
///
/// Classifications carry their own version and provenance track, advanced
/// separately from the owning instance's version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub name: String,

    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,

    pub origin: ClassificationOrigin,

    /// Version track independent of the owning instance
    pub version: u64,

    pub provenance: Provenance,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Classification {
    pub fn new(
        name: impl Into<String>,
        origin: ClassificationOrigin,
        provenance: Provenance,
    ) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            origin,
            version: 1,
            provenance,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_properties(mut self, properties: HashMap<String, serde_json::Value>) -> Self {
        self.properties = properties;
        self
    }

    /// Replace the property bag and advance this classification's version
    pub fn revise(&mut self, properties: HashMap<String, serde_json::Value>, version: u64) {
        self.properties = properties;
        self.version = version;
        self.updated_at = Some(Utc::now());
    }
}
