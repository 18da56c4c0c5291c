//! The metadata repository protocol shared by every back end

use crate::entity::{Entity, EntityDetail, EntityProxy};
use crate::error::{CascadeOutcome, Result};
use crate::instance::{Guid, InstanceStatus};
use crate::query::{
    EntityFindQuery, EntityRelationshipsQuery, NeighborhoodQuery, RelationshipFindQuery,
};
use crate::relationship::Relationship;
use crate::traversal::InstanceGraph;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request to create an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub type_name: String,

    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,

    /// Classifications to assign at creation
    #[serde(default)]
    pub classifications: Vec<NewClassification>,

    /// Initial lifecycle status; the factory default applies when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_status: Option<InstanceStatus>,
}

impl NewEntity {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: HashMap::new(),
            classifications: Vec::new(),
            initial_status: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_classification(mut self, classification: NewClassification) -> Self {
        self.classifications.push(classification);
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.initial_status = Some(status);
        self
    }
}

/// Request to attach a classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClassification {
    pub name: String,

    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl NewClassification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

/// Request to create a relationship between two stored entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
    pub type_name: String,

    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,

    pub end_one: Guid,

    pub end_two: Guid,

    /// Initial lifecycle status; the factory default applies when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_status: Option<InstanceStatus>,
}

impl NewRelationship {
    pub fn new(type_name: impl Into<String>, end_one: Guid, end_two: Guid) -> Self {
        Self {
            type_name: type_name.into(),
            properties: HashMap::new(),
            end_one,
            end_two,
            initial_status: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.initial_status = Some(status);
        self
    }
}

/// Uniform metadata-collection protocol
///
/// Every back end implements this surface: the in-memory store here,
/// persistent databases and remote proxies elsewhere. GUID lookups return
/// soft-deleted records; find and neighborhood operations exclude them
/// unless the status filter lists `Deleted`.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Entity Lookups
    // ─────────────────────────────────────────────────────────────────────────

    /// The current record under the GUID, full or proxy, in any status
    async fn is_entity_known(&self, guid: &Guid) -> Result<Option<Entity>>;

    /// The full entity record; a proxy-only GUID is reported as such
    async fn entity_by_guid(&self, guid: &Guid) -> Result<EntityDetail>;

    /// The full entity record as it stood at `as_of`
    async fn entity_by_guid_as_of(
        &self,
        guid: &Guid,
        as_of: DateTime<Utc>,
    ) -> Result<EntityDetail>;

    /// Relationships anchored at the entity
    async fn relationships_for_entity(
        &self,
        guid: &Guid,
        query: EntityRelationshipsQuery,
    ) -> Result<Vec<Relationship>>;

    /// Brute-force scan of the entity store
    async fn find_entities(&self, query: EntityFindQuery) -> Result<Vec<EntityDetail>>;

    /// Connected sub-graph radiating from a root entity
    async fn entity_neighborhood(&self, query: NeighborhoodQuery) -> Result<InstanceGraph>;

    /// Full version history between two instants; not every back end
    /// retains one
    async fn entity_history(
        &self,
        guid: &Guid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<EntityDetail>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a locally homed entity
    async fn create_entity(&self, request: NewEntity) -> Result<EntityDetail>;

    /// Register a proxy for an entity homed elsewhere, so relationships can
    /// anchor on it; a GUID already known is left untouched
    async fn add_entity_proxy(&self, proxy: EntityProxy) -> Result<()>;

    /// Replace the entity's property bag
    async fn update_entity_properties(
        &self,
        guid: &Guid,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<EntityDetail>;

    /// Move the entity to a new (non-deleted) lifecycle status
    async fn update_entity_status(
        &self,
        guid: &Guid,
        status: InstanceStatus,
    ) -> Result<EntityDetail>;

    /// Reinstate the most recent prior version of the entity
    async fn undo_entity_update(&self, guid: &Guid) -> Result<EntityDetail>;

    /// Soft-delete the entity and, best-effort, its relationships
    async fn delete_entity(&self, guid: &Guid) -> Result<CascadeOutcome<EntityDetail>>;

    /// Hard-remove a soft-deleted entity and every touching relationship
    async fn purge_entity(&self, guid: &Guid) -> Result<()>;

    /// Return a soft-deleted entity to the status it held before delete
    async fn restore_entity(&self, guid: &Guid) -> Result<EntityDetail>;

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Classification
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach a classification to an entity or entity proxy
    async fn classify_entity(
        &self,
        guid: &Guid,
        classification: NewClassification,
    ) -> Result<Entity>;

    /// Remove a classification by name
    async fn declassify_entity(&self, guid: &Guid, name: &str) -> Result<Entity>;

    /// Replace a classification's properties, advancing its own version
    async fn reclassify_entity(
        &self,
        guid: &Guid,
        name: &str,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<Entity>;

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Identity
    // ─────────────────────────────────────────────────────────────────────────

    /// Retire the GUID and carry the record forward under a new one,
    /// repointing relationship ends best-effort
    async fn re_identify_entity(
        &self,
        guid: &Guid,
        new_guid: Guid,
    ) -> Result<CascadeOutcome<EntityDetail>>;

    /// Replace the entity's type in place
    async fn re_type_entity(&self, guid: &Guid, new_type_name: &str) -> Result<EntityDetail>;

    /// Move the entity to a different home collection
    async fn re_home_entity(
        &self,
        guid: &Guid,
        new_collection_id: &str,
        new_collection_name: &str,
    ) -> Result<EntityDetail>;

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Reference Copies
    // ─────────────────────────────────────────────────────────────────────────

    /// Mirror an entity homed in another repository
    async fn save_entity_reference_copy(&self, entity: EntityDetail) -> Result<()>;

    /// Drop a mirrored entity without lifecycle preconditions
    async fn purge_entity_reference_copy(&self, guid: &Guid) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Lookups
    // ─────────────────────────────────────────────────────────────────────────

    /// The current record under the GUID, in any status
    async fn is_relationship_known(&self, guid: &Guid) -> Result<Option<Relationship>>;

    async fn relationship_by_guid(&self, guid: &Guid) -> Result<Relationship>;

    /// The relationship as it stood at `as_of`
    async fn relationship_by_guid_as_of(
        &self,
        guid: &Guid,
        as_of: DateTime<Utc>,
    ) -> Result<Relationship>;

    /// Brute-force scan of the relationship store
    async fn find_relationships(
        &self,
        query: RelationshipFindQuery,
    ) -> Result<Vec<Relationship>>;

    /// Full version history between two instants; not every back end
    /// retains one
    async fn relationship_history(
        &self,
        guid: &Guid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Relationship>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a relationship between two stored entities or proxies
    async fn create_relationship(&self, request: NewRelationship) -> Result<Relationship>;

    async fn update_relationship_properties(
        &self,
        guid: &Guid,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<Relationship>;

    async fn update_relationship_status(
        &self,
        guid: &Guid,
        status: InstanceStatus,
    ) -> Result<Relationship>;

    /// Reinstate the most recent prior version of the relationship
    async fn undo_relationship_update(&self, guid: &Guid) -> Result<Relationship>;

    /// Soft-delete the relationship
    async fn delete_relationship(&self, guid: &Guid) -> Result<Relationship>;

    /// Hard-remove a soft-deleted relationship
    async fn purge_relationship(&self, guid: &Guid) -> Result<()>;

    /// Return a soft-deleted relationship to its pre-delete status
    async fn restore_relationship(&self, guid: &Guid) -> Result<Relationship>;

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Identity
    // ─────────────────────────────────────────────────────────────────────────

    /// Retire the GUID and carry the record forward under a new one
    async fn re_identify_relationship(
        &self,
        guid: &Guid,
        new_guid: Guid,
    ) -> Result<Relationship>;

    /// Replace the relationship's type in place
    async fn re_type_relationship(
        &self,
        guid: &Guid,
        new_type_name: &str,
    ) -> Result<Relationship>;

    /// Move the relationship to a different home collection
    async fn re_home_relationship(
        &self,
        guid: &Guid,
        new_collection_id: &str,
        new_collection_name: &str,
    ) -> Result<Relationship>;

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Reference Copies
    // ─────────────────────────────────────────────────────────────────────────

    /// Mirror a relationship homed in another repository, registering
    /// proxies for any unknown ends
    async fn save_relationship_reference_copy(&self, relationship: Relationship) -> Result<()>;

    /// Drop a mirrored relationship without lifecycle preconditions
    async fn purge_relationship_reference_copy(&self, guid: &Guid) -> Result<()>;
}
