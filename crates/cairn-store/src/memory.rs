//! In-memory repository back end - the lifecycle coordinator

use crate::store::{InstanceStore, Retention};
use async_trait::async_trait;
use cairn_core::{
    limits, status_passes, CascadeFailure, CascadeOutcome, ClassificationOrigin,
    CohortInstanceFactory, Entity, EntityDetail, EntityFindQuery, EntityProxy,
    EntityRelationshipsQuery, Error, ExactMatcher, Guid, InstanceFactory, InstanceGraph,
    InstanceStatus, MetadataRepository, NeighborhoodEngine, NeighborhoodQuery, NewClassification,
    NewEntity, NewRelationship, OpenTypeValidator, PropertyMatcher, Provenance, Relationship,
    RelationshipFindQuery, Result, Sequencing, TypeValidator,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

fn expect_detail(entity: Entity) -> Result<EntityDetail> {
    match entity {
        Entity::Detail(detail) => Ok(detail),
        Entity::Proxy(proxy) => Err(Error::EntityProxyOnly(proxy.header.guid)),
    }
}

/// In-memory metadata repository
///
/// Holds locally homed instances and reference copies for one member of a
/// cohort. Mutations validate their preconditions, write through the
/// versioned [`InstanceStore`] and cascade effects to dependent
/// relationships best-effort: the primary state change always completes,
/// with secondary failures collected rather than surfaced.
pub struct InMemoryRepository {
    collection_id: String,
    collection_name: String,
    store: InstanceStore,
    validator: Arc<dyn TypeValidator>,
    factory: Arc<dyn InstanceFactory>,
    matcher: Arc<dyn PropertyMatcher>,
}

impl InMemoryRepository {
    /// A repository for one cohort collection, wired with the registry-free
    /// defaults; production deployments inject the cohort's own validator,
    /// factory and matcher
    pub fn new(collection_id: impl Into<String>, collection_name: impl Into<String>) -> Self {
        let collection_id = collection_id.into();
        let collection_name = collection_name.into();
        let factory = CohortInstanceFactory::new(&collection_id, &collection_name);
        Self {
            collection_id,
            collection_name,
            store: InstanceStore::new(),
            validator: Arc::new(OpenTypeValidator),
            factory: Arc::new(factory),
            matcher: Arc::new(ExactMatcher),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn TypeValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_factory(mut self, factory: Arc<dyn InstanceFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn PropertyMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn require_entity(&self, guid: &Guid) -> Result<Entity> {
        self.store
            .entity(guid)
            .ok_or_else(|| Error::EntityNotFound(guid.clone()))
    }

    fn require_entity_detail(&self, guid: &Guid) -> Result<EntityDetail> {
        expect_detail(self.require_entity(guid)?)
    }

    /// Entity in a mutable state: present and not soft-deleted
    fn require_live_entity(&self, guid: &Guid) -> Result<Entity> {
        let entity = self.require_entity(guid)?;
        if entity.header().status.is_deleted() {
            return Err(Error::AlreadyDeleted(guid.clone()));
        }
        Ok(entity)
    }

    fn require_live_entity_detail(&self, guid: &Guid) -> Result<EntityDetail> {
        expect_detail(self.require_live_entity(guid)?)
    }

    fn require_relationship(&self, guid: &Guid) -> Result<Relationship> {
        self.store
            .relationship(guid)
            .ok_or_else(|| Error::RelationshipNotFound(guid.clone()))
    }

    fn require_live_relationship(&self, guid: &Guid) -> Result<Relationship> {
        let relationship = self.require_relationship(guid)?;
        if relationship.header.status.is_deleted() {
            return Err(Error::AlreadyDeleted(guid.clone()));
        }
        Ok(relationship)
    }

    fn validate_as_of(as_of: Option<DateTime<Utc>>) -> Result<()> {
        if let Some(t) = as_of {
            if t > Utc::now() {
                return Err(Error::InvalidParameter(format!(
                    "as-of time {t} is in the future"
                )));
            }
        }
        Ok(())
    }

    fn validate_new_status(status: InstanceStatus) -> Result<()> {
        if status.is_deleted() {
            return Err(Error::InvalidParameter(
                "the deleted status is entered through delete, not directly".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint record for a new relationship end: the stored proxy, or a
    /// proxy built from the stored detail. A deleted endpoint cannot
    /// anchor new relationships.
    fn end_proxy(&self, guid: &Guid) -> Result<EntityProxy> {
        let entity = self.require_entity(guid)?;
        if entity.header().status.is_deleted() {
            return Err(Error::AlreadyDeleted(guid.clone()));
        }
        match entity {
            Entity::Detail(detail) => Ok(self.factory.proxy_from(&detail)),
            Entity::Proxy(proxy) => Ok(proxy),
        }
    }

    fn soft_delete_relationship(&self, guid: &Guid) -> Result<Relationship> {
        let mut relationship = self.require_live_relationship(guid)?;
        relationship.header.status_on_delete = Some(relationship.header.status);
        relationship.header.status = InstanceStatus::Deleted;
        let version = self.factory.next_version(relationship.header.version);
        relationship.header.touch(version);
        self.store.update_relationship(relationship.clone());
        Ok(relationship)
    }

    /// Rebuild the embedded end proxies of every relationship anchored at
    /// the entity. A derived-representation refresh, not a lineage
    /// mutation: no version bump, no history.
    fn refresh_end_proxies(&self, entity: &EntityDetail) {
        let proxy = self.factory.proxy_from(entity);
        let guid = &entity.header.guid;
        for mut relationship in self.store.relationships_touching(guid) {
            if &relationship.end_one.header.guid == guid {
                relationship.end_one = proxy.clone();
            }
            if &relationship.end_two.header.guid == guid {
                relationship.end_two = proxy.clone();
            }
            self.store.save_relationship_copy(relationship);
        }
    }
}

#[async_trait]
impl MetadataRepository for InMemoryRepository {
    // ─────────────────────────────────────────────────────────────────────────
    // Entity Lookups
    // ─────────────────────────────────────────────────────────────────────────

    async fn is_entity_known(&self, guid: &Guid) -> Result<Option<Entity>> {
        limits::validate_guid(guid.as_str())?;
        Ok(self.store.entity(guid))
    }

    async fn entity_by_guid(&self, guid: &Guid) -> Result<EntityDetail> {
        limits::validate_guid(guid.as_str())?;
        self.require_entity_detail(guid)
    }

    async fn entity_by_guid_as_of(
        &self,
        guid: &Guid,
        as_of: DateTime<Utc>,
    ) -> Result<EntityDetail> {
        limits::validate_guid(guid.as_str())?;
        Self::validate_as_of(Some(as_of))?;
        let snapshot = self.store.snapshot(Some(as_of));
        match snapshot.entities.get(guid) {
            Some(entity) => expect_detail(entity.clone()),
            None => Err(Error::EntityNotFound(guid.clone())),
        }
    }

    async fn relationships_for_entity(
        &self,
        guid: &Guid,
        query: EntityRelationshipsQuery,
    ) -> Result<Vec<Relationship>> {
        limits::validate_guid(guid.as_str())?;
        Self::validate_as_of(query.as_of)?;
        let snapshot = self.store.snapshot(query.as_of);
        if !snapshot.entities.contains_key(guid) {
            return Err(Error::EntityNotFound(guid.clone()));
        }

        let results: Vec<Relationship> = snapshot
            .relationships
            .values()
            .filter(|r| r.touches(guid) && status_passes(r.header.status, &query.status_filter))
            .cloned()
            .collect();
        Ok(self
            .factory
            .sequence_relationships(results, &Sequencing::default(), &query.paging))
    }

    async fn find_entities(&self, query: EntityFindQuery) -> Result<Vec<EntityDetail>> {
        Self::validate_as_of(query.as_of)?;
        let snapshot = self.store.snapshot(query.as_of);

        let mut results = Vec::new();
        for entity in snapshot.entities.values() {
            // scans return full records only; proxies are remote stand-ins
            let Entity::Detail(detail) = entity else {
                continue;
            };
            if !self
                .validator
                .type_matches(&detail.header.type_name, &query.type_filter)
            {
                continue;
            }
            if !status_passes(detail.header.status, &query.status_filter) {
                continue;
            }
            if !query
                .classification_filter
                .iter()
                .all(|name| detail.has_classification(name))
            {
                continue;
            }
            if let Some(criteria) = &query.criteria {
                if !self.matcher.matches(&detail.header.properties, criteria)? {
                    continue;
                }
            }
            if let Some(search) = &query.search_string {
                if !self
                    .matcher
                    .matches_search_string(&detail.header.properties, search)?
                {
                    continue;
                }
            }
            results.push(detail.clone());
        }

        Ok(self
            .factory
            .sequence_entities(results, &query.sequencing, &query.paging))
    }

    async fn entity_neighborhood(&self, query: NeighborhoodQuery) -> Result<InstanceGraph> {
        limits::validate_guid(query.root.as_str())?;
        Self::validate_as_of(query.as_of)?;
        let snapshot = self.store.snapshot(query.as_of);
        if !snapshot.entities.contains_key(&query.root) {
            return Err(Error::EntityNotFound(query.root.clone()));
        }
        Ok(NeighborhoodEngine::execute(
            &query,
            &snapshot.entities,
            &snapshot.relationships,
        ))
    }

    async fn entity_history(
        &self,
        _guid: &Guid,
        _from: Option<DateTime<Utc>>,
        _to: Option<DateTime<Utc>>,
    ) -> Result<Vec<EntityDetail>> {
        Err(Error::FunctionNotSupported(
            "entity version history; this back end keeps an undo log, not a temporal index"
                .to_string(),
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_entity(&self, request: NewEntity) -> Result<EntityDetail> {
        self.validator.validate_type_known(&request.type_name)?;
        let status = request.initial_status.unwrap_or_default();
        Self::validate_new_status(status)?;
        self.validator
            .validate_status_for_type(&request.type_name, status)?;
        self.validator
            .validate_properties(&request.type_name, &request.properties)?;

        let mut classifications = Vec::with_capacity(request.classifications.len());
        for attach in &request.classifications {
            self.validator.validate_classification(
                &request.type_name,
                &attach.name,
                &attach.properties,
            )?;
            classifications.push(self.factory.new_classification(
                &attach.name,
                attach.properties.clone(),
                ClassificationOrigin::Assigned,
            ));
        }

        let entity = self
            .factory
            .new_entity(&request.type_name, request.properties, classifications, status);
        let stored = self.store.create_entity(Entity::Detail(entity));
        tracing::debug!(guid = %stored.guid(), type_name = %stored.header().type_name, "created entity");
        expect_detail(stored)
    }

    async fn add_entity_proxy(&self, proxy: EntityProxy) -> Result<()> {
        limits::validate_guid(proxy.header.guid.as_str())?;
        self.validator.validate_type_known(&proxy.header.type_name)?;
        if proxy.header.is_homed_in(&self.collection_id) {
            return Err(Error::InvalidParameter(format!(
                "entity {} is homed in this collection; proxies stand in for entities homed elsewhere",
                proxy.header.guid
            )));
        }
        // a GUID already known is left untouched; the held record is at
        // least as rich as the offered proxy
        if self.store.entity(&proxy.header.guid).is_none() {
            self.store.save_entity_copy(Entity::Proxy(proxy));
        }
        Ok(())
    }

    async fn update_entity_properties(
        &self,
        guid: &Guid,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<EntityDetail> {
        let mut entity = self.require_live_entity_detail(guid)?;
        self.validator
            .validate_properties(&entity.header.type_name, &properties)?;
        entity.header.properties = properties;
        let version = self.factory.next_version(entity.header.version);
        entity.header.touch(version);
        self.store.update_entity(Entity::Detail(entity.clone()));
        Ok(entity)
    }

    async fn update_entity_status(
        &self,
        guid: &Guid,
        status: InstanceStatus,
    ) -> Result<EntityDetail> {
        Self::validate_new_status(status)?;
        let mut entity = self.require_live_entity_detail(guid)?;
        self.validator
            .validate_status_for_type(&entity.header.type_name, status)?;
        entity.header.status = status;
        let version = self.factory.next_version(entity.header.version);
        entity.header.touch(version);
        self.store.update_entity(Entity::Detail(entity.clone()));
        Ok(entity)
    }

    async fn undo_entity_update(&self, guid: &Guid) -> Result<EntityDetail> {
        limits::validate_guid(guid.as_str())?;
        match self.store.previous_entity_version(guid) {
            Some(prior) => expect_detail(prior),
            // distinguish an unknown guid from one with no logged versions
            None => match self.store.entity(guid) {
                Some(_) => Err(Error::InvalidParameter(format!(
                    "no prior version held for entity {guid}"
                ))),
                None => Err(Error::EntityNotFound(guid.clone())),
            },
        }
    }

    async fn delete_entity(&self, guid: &Guid) -> Result<CascadeOutcome<EntityDetail>> {
        let mut entity = self.require_entity_detail(guid)?;
        if entity.header.status.is_deleted() {
            return Err(Error::AlreadyDeleted(guid.clone()));
        }
        entity.header.status_on_delete = Some(entity.header.status);
        entity.header.status = InstanceStatus::Deleted;
        let version = self.factory.next_version(entity.header.version);
        entity.header.touch(version);
        self.store.update_entity(Entity::Detail(entity.clone()));

        // best-effort cascade; the entity delete never fails because of it
        let mut failures = Vec::new();
        for relationship in self.store.relationships_touching(guid) {
            let rel_guid = relationship.header.guid.clone();
            let outcome = if relationship.header.is_homed_in(&self.collection_id) {
                self.soft_delete_relationship(&rel_guid).map(|_| ())
            } else {
                // replicated copy; its home repository owns the lifecycle
                self.store.remove_relationship(&rel_guid, Retention::Discard);
                Ok(())
            };
            if let Err(e) = outcome {
                tracing::debug!(relationship = %rel_guid, error = %e, "cascade delete skipped relationship");
                failures.push(CascadeFailure {
                    guid: rel_guid,
                    reason: e.to_string(),
                });
            }
        }
        tracing::debug!(guid = %guid, cascaded_failures = failures.len(), "deleted entity");
        Ok(CascadeOutcome {
            primary: entity,
            failures,
        })
    }

    async fn purge_entity(&self, guid: &Guid) -> Result<()> {
        let entity = self.require_entity_detail(guid)?;
        if !entity.header.status.is_deleted() {
            return Err(Error::NotDeleted(guid.clone()));
        }
        for relationship in self.store.relationships_touching(guid) {
            self.store
                .remove_relationship(&relationship.header.guid, Retention::Discard);
        }
        self.store.remove_entity(guid, Retention::Discard);
        tracing::debug!(guid = %guid, "purged entity");
        Ok(())
    }

    async fn restore_entity(&self, guid: &Guid) -> Result<EntityDetail> {
        let mut entity = self.require_entity_detail(guid)?;
        if !entity.header.status.is_deleted() {
            return Err(Error::NotDeleted(guid.clone()));
        }
        let held = entity.header.status_on_delete.take().ok_or_else(|| {
            Error::Internal(format!("no saved status for deleted entity {guid}"))
        })?;
        entity.header.status = held;
        let version = self.factory.next_version(entity.header.version);
        entity.header.touch(version);
        self.store.update_entity(Entity::Detail(entity.clone()));
        Ok(entity)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Classification
    // ─────────────────────────────────────────────────────────────────────────

    async fn classify_entity(
        &self,
        guid: &Guid,
        classification: NewClassification,
    ) -> Result<Entity> {
        let mut entity = self.require_live_entity(guid)?;
        self.validator.validate_classification(
            &entity.header().type_name,
            &classification.name,
            &classification.properties,
        )?;
        if entity.has_classification(&classification.name) {
            return Err(Error::ClassificationMismatch(format!(
                "entity {} already carries classification {}",
                guid, classification.name
            )));
        }

        let record = self.factory.new_classification(
            &classification.name,
            classification.properties,
            ClassificationOrigin::Assigned,
        );
        entity.classifications_mut().push(record);
        let version = self.factory.next_version(entity.header().version);
        entity.header_mut().touch(version);
        self.store.update_entity(entity.clone());
        Ok(entity)
    }

    async fn declassify_entity(&self, guid: &Guid, name: &str) -> Result<Entity> {
        let mut entity = self.require_live_entity(guid)?;
        let position = entity
            .classifications()
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| {
                Error::ClassificationMismatch(format!(
                    "entity {guid} does not carry classification {name}"
                ))
            })?;
        entity.classifications_mut().remove(position);
        let version = self.factory.next_version(entity.header().version);
        entity.header_mut().touch(version);
        self.store.update_entity(entity.clone());
        Ok(entity)
    }

    async fn reclassify_entity(
        &self,
        guid: &Guid,
        name: &str,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<Entity> {
        let mut entity = self.require_live_entity(guid)?;
        self.validator
            .validate_classification(&entity.header().type_name, name, &properties)?;

        match entity
            .classifications_mut()
            .iter_mut()
            .find(|c| c.name == name)
        {
            Some(existing) => {
                let classification_version = self.factory.next_version(existing.version);
                existing.revise(properties, classification_version);
            }
            None => {
                return Err(Error::ClassificationMismatch(format!(
                    "entity {guid} does not carry classification {name}"
                )))
            }
        }

        let version = self.factory.next_version(entity.header().version);
        entity.header_mut().touch(version);
        self.store.update_entity(entity.clone());
        Ok(entity)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Identity
    // ─────────────────────────────────────────────────────────────────────────

    async fn re_identify_entity(
        &self,
        guid: &Guid,
        new_guid: Guid,
    ) -> Result<CascadeOutcome<EntityDetail>> {
        limits::validate_guid(new_guid.as_str())?;
        let old = self.require_live_entity_detail(guid)?;

        // the replacement goes in first so relationship ends can repoint
        let mut fresh = old.clone();
        fresh.header.guid = new_guid;
        fresh.header.re_identified_from = Some(guid.clone());
        let version = self.factory.next_version(old.header.version);
        fresh.header.touch(version);
        let replacement = expect_detail(self.store.create_entity(Entity::Detail(fresh)))?;

        // retire the old guid, addressable until purged
        let mut retired = old;
        retired.header.status_on_delete = Some(retired.header.status);
        retired.header.status = InstanceStatus::Deleted;
        let version = self.factory.next_version(retired.header.version);
        retired.header.touch(version);
        self.store.update_entity(Entity::Detail(retired));

        // repoint relationship ends, best-effort
        let proxy = self.factory.proxy_from(&replacement);
        let mut failures = Vec::new();
        for mut relationship in self.store.relationships_touching(guid) {
            let rel_guid = relationship.header.guid.clone();
            let outcome = if relationship.header.status.is_deleted() {
                Err(Error::AlreadyDeleted(rel_guid.clone()))
            } else {
                if relationship.end_one.header.guid == *guid {
                    relationship.end_one = proxy.clone();
                }
                if relationship.end_two.header.guid == *guid {
                    relationship.end_two = proxy.clone();
                }
                let version = self.factory.next_version(relationship.header.version);
                relationship.header.touch(version);
                self.store.update_relationship(relationship);
                Ok(())
            };
            if let Err(e) = outcome {
                failures.push(CascadeFailure {
                    guid: rel_guid,
                    reason: e.to_string(),
                });
            }
        }
        tracing::debug!(old = %guid, new = %replacement.header.guid, "re-identified entity");
        Ok(CascadeOutcome {
            primary: replacement,
            failures,
        })
    }

    async fn re_type_entity(&self, guid: &Guid, new_type_name: &str) -> Result<EntityDetail> {
        self.validator.validate_type_known(new_type_name)?;
        let mut entity = self.require_live_entity_detail(guid)?;
        self.validator
            .validate_properties(new_type_name, &entity.header.properties)?;
        entity.header.type_name = new_type_name.to_string();
        let version = self.factory.next_version(entity.header.version);
        entity.header.touch(version);
        self.store.update_entity(Entity::Detail(entity.clone()));
        self.refresh_end_proxies(&entity);
        Ok(entity)
    }

    async fn re_home_entity(
        &self,
        guid: &Guid,
        new_collection_id: &str,
        new_collection_name: &str,
    ) -> Result<EntityDetail> {
        if new_collection_id.is_empty() {
            return Err(Error::InvalidParameter(
                "new home collection id cannot be empty".to_string(),
            ));
        }
        let mut entity = self.require_live_entity_detail(guid)?;
        entity.header.home_collection_id = new_collection_id.to_string();
        entity.header.home_collection_name = new_collection_name.to_string();
        entity.header.provenance = if new_collection_id == self.collection_id {
            Provenance::LocalCohort
        } else {
            Provenance::ExternalSource
        };
        let version = self.factory.next_version(entity.header.version);
        entity.header.touch(version);
        self.store.update_entity(Entity::Detail(entity.clone()));
        self.refresh_end_proxies(&entity);
        Ok(entity)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity Reference Copies
    // ─────────────────────────────────────────────────────────────────────────

    async fn save_entity_reference_copy(&self, entity: EntityDetail) -> Result<()> {
        limits::validate_guid(entity.header.guid.as_str())?;
        self.validator.validate_type_known(&entity.header.type_name)?;
        if entity.header.is_homed_in(&self.collection_id) {
            return Err(Error::InvalidParameter(format!(
                "entity {} is homed in this collection; reference copies mirror instances homed elsewhere",
                entity.header.guid
            )));
        }
        let mut copy = entity;
        copy.header.provenance = Provenance::ExternalSource;
        self.store.save_entity_copy(Entity::Detail(copy));
        Ok(())
    }

    async fn purge_entity_reference_copy(&self, guid: &Guid) -> Result<()> {
        let entity = self.require_entity(guid)?;
        if entity.header().is_homed_in(&self.collection_id) {
            return Err(Error::InvalidParameter(format!(
                "entity {guid} is homed in this collection; purge it through its lifecycle"
            )));
        }
        self.store.remove_entity(guid, Retention::Discard);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Lookups
    // ─────────────────────────────────────────────────────────────────────────

    async fn is_relationship_known(&self, guid: &Guid) -> Result<Option<Relationship>> {
        limits::validate_guid(guid.as_str())?;
        Ok(self.store.relationship(guid))
    }

    async fn relationship_by_guid(&self, guid: &Guid) -> Result<Relationship> {
        limits::validate_guid(guid.as_str())?;
        self.require_relationship(guid)
    }

    async fn relationship_by_guid_as_of(
        &self,
        guid: &Guid,
        as_of: DateTime<Utc>,
    ) -> Result<Relationship> {
        limits::validate_guid(guid.as_str())?;
        Self::validate_as_of(Some(as_of))?;
        let snapshot = self.store.snapshot(Some(as_of));
        snapshot
            .relationships
            .get(guid)
            .cloned()
            .ok_or_else(|| Error::RelationshipNotFound(guid.clone()))
    }

    async fn find_relationships(
        &self,
        query: RelationshipFindQuery,
    ) -> Result<Vec<Relationship>> {
        Self::validate_as_of(query.as_of)?;
        let snapshot = self.store.snapshot(query.as_of);

        let mut results = Vec::new();
        for relationship in snapshot.relationships.values() {
            if !self
                .validator
                .type_matches(&relationship.header.type_name, &query.type_filter)
            {
                continue;
            }
            if !status_passes(relationship.header.status, &query.status_filter) {
                continue;
            }
            if let Some(criteria) = &query.criteria {
                if !self
                    .matcher
                    .matches(&relationship.header.properties, criteria)?
                {
                    continue;
                }
            }
            if let Some(search) = &query.search_string {
                if !self
                    .matcher
                    .matches_search_string(&relationship.header.properties, search)?
                {
                    continue;
                }
            }
            results.push(relationship.clone());
        }

        Ok(self
            .factory
            .sequence_relationships(results, &query.sequencing, &query.paging))
    }

    async fn relationship_history(
        &self,
        _guid: &Guid,
        _from: Option<DateTime<Utc>>,
        _to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Relationship>> {
        Err(Error::FunctionNotSupported(
            "relationship version history; this back end keeps an undo log, not a temporal index"
                .to_string(),
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_relationship(&self, request: NewRelationship) -> Result<Relationship> {
        self.validator.validate_type_known(&request.type_name)?;
        let status = request.initial_status.unwrap_or_default();
        Self::validate_new_status(status)?;
        self.validator
            .validate_status_for_type(&request.type_name, status)?;
        self.validator
            .validate_properties(&request.type_name, &request.properties)?;

        let end_one = self.end_proxy(&request.end_one)?;
        let end_two = self.end_proxy(&request.end_two)?;
        self.validator
            .validate_relationship_ends(&request.type_name, &end_one, &end_two)?;

        let relationship = self.factory.new_relationship(
            &request.type_name,
            request.properties,
            end_one,
            end_two,
            status,
        );
        let stored = self.store.create_relationship(relationship);
        tracing::debug!(guid = %stored.header.guid, type_name = %stored.header.type_name, "created relationship");
        Ok(stored)
    }

    async fn update_relationship_properties(
        &self,
        guid: &Guid,
        properties: HashMap<String, serde_json::Value>,
    ) -> Result<Relationship> {
        let mut relationship = self.require_live_relationship(guid)?;
        self.validator
            .validate_properties(&relationship.header.type_name, &properties)?;
        relationship.header.properties = properties;
        let version = self.factory.next_version(relationship.header.version);
        relationship.header.touch(version);
        self.store.update_relationship(relationship.clone());
        Ok(relationship)
    }

    async fn update_relationship_status(
        &self,
        guid: &Guid,
        status: InstanceStatus,
    ) -> Result<Relationship> {
        Self::validate_new_status(status)?;
        let mut relationship = self.require_live_relationship(guid)?;
        self.validator
            .validate_status_for_type(&relationship.header.type_name, status)?;
        relationship.header.status = status;
        let version = self.factory.next_version(relationship.header.version);
        relationship.header.touch(version);
        self.store.update_relationship(relationship.clone());
        Ok(relationship)
    }

    async fn undo_relationship_update(&self, guid: &Guid) -> Result<Relationship> {
        limits::validate_guid(guid.as_str())?;
        match self.store.previous_relationship_version(guid) {
            Some(prior) => Ok(prior),
            None => match self.store.relationship(guid) {
                Some(_) => Err(Error::InvalidParameter(format!(
                    "no prior version held for relationship {guid}"
                ))),
                None => Err(Error::RelationshipNotFound(guid.clone())),
            },
        }
    }

    async fn delete_relationship(&self, guid: &Guid) -> Result<Relationship> {
        self.soft_delete_relationship(guid)
    }

    async fn purge_relationship(&self, guid: &Guid) -> Result<()> {
        let relationship = self.require_relationship(guid)?;
        if !relationship.header.status.is_deleted() {
            return Err(Error::NotDeleted(guid.clone()));
        }
        self.store.remove_relationship(guid, Retention::Discard);
        Ok(())
    }

    async fn restore_relationship(&self, guid: &Guid) -> Result<Relationship> {
        let mut relationship = self.require_relationship(guid)?;
        if !relationship.header.status.is_deleted() {
            return Err(Error::NotDeleted(guid.clone()));
        }
        let held = relationship.header.status_on_delete.take().ok_or_else(|| {
            Error::Internal(format!("no saved status for deleted relationship {guid}"))
        })?;
        relationship.header.status = held;
        let version = self.factory.next_version(relationship.header.version);
        relationship.header.touch(version);
        self.store.update_relationship(relationship.clone());
        Ok(relationship)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Identity
    // ─────────────────────────────────────────────────────────────────────────

    async fn re_identify_relationship(
        &self,
        guid: &Guid,
        new_guid: Guid,
    ) -> Result<Relationship> {
        limits::validate_guid(new_guid.as_str())?;
        let old = self.require_live_relationship(guid)?;

        let mut fresh = old.clone();
        fresh.header.guid = new_guid;
        fresh.header.re_identified_from = Some(guid.clone());
        let version = self.factory.next_version(old.header.version);
        fresh.header.touch(version);
        let replacement = self.store.create_relationship(fresh);

        let mut retired = old;
        retired.header.status_on_delete = Some(retired.header.status);
        retired.header.status = InstanceStatus::Deleted;
        let version = self.factory.next_version(retired.header.version);
        retired.header.touch(version);
        self.store.update_relationship(retired);

        Ok(replacement)
    }

    async fn re_type_relationship(
        &self,
        guid: &Guid,
        new_type_name: &str,
    ) -> Result<Relationship> {
        self.validator.validate_type_known(new_type_name)?;
        let mut relationship = self.require_live_relationship(guid)?;
        self.validator
            .validate_properties(new_type_name, &relationship.header.properties)?;
        relationship.header.type_name = new_type_name.to_string();
        let version = self.factory.next_version(relationship.header.version);
        relationship.header.touch(version);
        self.store.update_relationship(relationship.clone());
        Ok(relationship)
    }

    async fn re_home_relationship(
        &self,
        guid: &Guid,
        new_collection_id: &str,
        new_collection_name: &str,
    ) -> Result<Relationship> {
        if new_collection_id.is_empty() {
            return Err(Error::InvalidParameter(
                "new home collection id cannot be empty".to_string(),
            ));
        }
        let mut relationship = self.require_live_relationship(guid)?;
        relationship.header.home_collection_id = new_collection_id.to_string();
        relationship.header.home_collection_name = new_collection_name.to_string();
        relationship.header.provenance = if new_collection_id == self.collection_id {
            Provenance::LocalCohort
        } else {
            Provenance::ExternalSource
        };
        let version = self.factory.next_version(relationship.header.version);
        relationship.header.touch(version);
        self.store.update_relationship(relationship.clone());
        Ok(relationship)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Relationship Reference Copies
    // ─────────────────────────────────────────────────────────────────────────

    async fn save_relationship_reference_copy(&self, relationship: Relationship) -> Result<()> {
        limits::validate_guid(relationship.header.guid.as_str())?;
        self.validator
            .validate_type_known(&relationship.header.type_name)?;
        if relationship.header.is_homed_in(&self.collection_id) {
            return Err(Error::InvalidParameter(format!(
                "relationship {} is homed in this collection; reference copies mirror instances homed elsewhere",
                relationship.header.guid
            )));
        }

        // both ends must stay resolvable locally; register the embedded
        // proxies for any unknown endpoint
        for end in [&relationship.end_one, &relationship.end_two] {
            if self.store.entity(&end.header.guid).is_none() {
                self.store.save_entity_copy(Entity::Proxy(end.clone()));
            }
        }

        let mut copy = relationship;
        copy.header.provenance = Provenance::ExternalSource;
        self.store.save_relationship_copy(copy);
        Ok(())
    }

    async fn purge_relationship_reference_copy(&self, guid: &Guid) -> Result<()> {
        let relationship = self.require_relationship(guid)?;
        if relationship.header.is_homed_in(&self.collection_id) {
            return Err(Error::InvalidParameter(format!(
                "relationship {guid} is homed in this collection; purge it through its lifecycle"
            )));
        }
        self.store.remove_relationship(guid, Retention::Discard);
        Ok(())
    }
}
