//! The versioned instance store - current state plus shared history logs

use cairn_core::{Entity, Guid, Relationship};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// What happens to a record evicted from a current map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Push the evicted record onto the history log
    Keep,
    /// Drop the record and scrub its history entries; a purged GUID is
    /// unreachable even through previous-version retrieval
    Discard,
}

/// Point-in-time copy of the current maps
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub entities: HashMap<Guid, Entity>,
    pub relationships: HashMap<Guid, Relationship>,
}

#[derive(Default)]
struct StoreInner {
    entities: HashMap<Guid, Entity>,
    relationships: HashMap<Guid, Relationship>,
    /// Prior entity versions, most recent first, shared across GUIDs
    entity_history: VecDeque<Entity>,
    /// Prior relationship versions, most recent first, shared across GUIDs
    relationship_history: VecDeque<Relationship>,
}

/// Versioned graph store behind a single lock
///
/// Every operation is a short critical section and total over its inputs: a
/// missing GUID yields `None`, never an error. Consistency between the
/// entity and relationship maps is the coordinator's responsibility, not
/// the store's.
#[derive(Default)]
pub struct InstanceStore {
    inner: RwLock<StoreInner>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entity record; deleted records are returned
    pub fn entity(&self, guid: &Guid) -> Option<Entity> {
        self.inner.read().entities.get(guid).cloned()
    }

    /// Current relationship record; deleted records are returned
    pub fn relationship(&self, guid: &Guid) -> Option<Relationship> {
        self.inner.read().relationships.get(guid).cloned()
    }

    /// Insert a new entity; a GUID collision assigns the record a fresh
    /// GUID until an empty slot is found
    pub fn create_entity(&self, mut entity: Entity) -> Entity {
        let mut inner = self.inner.write();
        while inner.entities.contains_key(entity.guid()) {
            let fresh = Guid::generate();
            tracing::debug!(taken = %entity.guid(), fresh = %fresh, "entity guid collision");
            entity.header_mut().guid = fresh;
        }
        inner.entities.insert(entity.guid().clone(), entity.clone());
        entity
    }

    /// Insert a new relationship; collisions regenerate the GUID as for
    /// entities
    pub fn create_relationship(&self, mut relationship: Relationship) -> Relationship {
        let mut inner = self.inner.write();
        while inner.relationships.contains_key(&relationship.header.guid) {
            let fresh = Guid::generate();
            tracing::debug!(taken = %relationship.header.guid, fresh = %fresh, "relationship guid collision");
            relationship.header.guid = fresh;
        }
        inner
            .relationships
            .insert(relationship.header.guid.clone(), relationship.clone());
        relationship
    }

    /// Replace the current record, pushing the prior version to history
    pub fn update_entity(&self, entity: Entity) {
        let mut inner = self.inner.write();
        let guid = entity.guid().clone();
        if let Some(prior) = inner.entities.insert(guid, entity) {
            inner.entity_history.push_front(prior);
        }
    }

    /// Replace the current record, pushing the prior version to history
    pub fn update_relationship(&self, relationship: Relationship) {
        let mut inner = self.inner.write();
        let guid = relationship.header.guid.clone();
        if let Some(prior) = inner.relationships.insert(guid, relationship) {
            inner.relationship_history.push_front(prior);
        }
    }

    /// Reference-copy upsert; the local repository is not authoritative
    /// for the instance's lineage, so no history is written
    pub fn save_entity_copy(&self, entity: Entity) {
        let mut inner = self.inner.write();
        inner.entities.insert(entity.guid().clone(), entity);
    }

    /// Reference-copy upsert, no history
    pub fn save_relationship_copy(&self, relationship: Relationship) {
        let mut inner = self.inner.write();
        inner
            .relationships
            .insert(relationship.header.guid.clone(), relationship);
    }

    /// Remove the current entity record for the GUID
    pub fn remove_entity(&self, guid: &Guid, retention: Retention) -> Option<Entity> {
        let mut inner = self.inner.write();
        let evicted = inner.entities.remove(guid)?;
        match retention {
            Retention::Keep => inner.entity_history.push_front(evicted.clone()),
            Retention::Discard => inner.entity_history.retain(|e| e.guid() != guid),
        }
        Some(evicted)
    }

    /// Remove the current relationship record for the GUID
    pub fn remove_relationship(&self, guid: &Guid, retention: Retention) -> Option<Relationship> {
        let mut inner = self.inner.write();
        let evicted = inner.relationships.remove(guid)?;
        match retention {
            Retention::Keep => inner.relationship_history.push_front(evicted.clone()),
            Retention::Discard => inner
                .relationship_history
                .retain(|r| &r.header.guid != guid),
        }
        Some(evicted)
    }

    /// Reinstate the most recent history entry for the GUID
    ///
    /// The log is shared across GUIDs and searched linearly. The hit is
    /// removed from history, versioned one past the current record (or one
    /// past its own stored version when no current record exists) and
    /// reinstated as current; the displaced record is not retained.
    pub fn previous_entity_version(&self, guid: &Guid) -> Option<Entity> {
        let mut inner = self.inner.write();
        let index = inner.entity_history.iter().position(|e| e.guid() == guid)?;
        let mut prior = inner.entity_history.remove(index)?;
        let next_version = match inner.entities.get(guid) {
            Some(current) => current.header().version + 1,
            None => prior.header().version + 1,
        };
        prior.header_mut().version = next_version;
        inner.entities.insert(guid.clone(), prior.clone());
        Some(prior)
    }

    /// Reinstate the most recent history entry for the GUID
    pub fn previous_relationship_version(&self, guid: &Guid) -> Option<Relationship> {
        let mut inner = self.inner.write();
        let index = inner
            .relationship_history
            .iter()
            .position(|r| &r.header.guid == guid)?;
        let mut prior = inner.relationship_history.remove(index)?;
        let next_version = match inner.relationships.get(guid) {
            Some(current) => current.header.version + 1,
            None => prior.header.version + 1,
        };
        prior.header.version = next_version;
        inner.relationships.insert(guid.clone(), prior.clone());
        Some(prior)
    }

    /// Current relationships anchored at the entity at either end
    pub fn relationships_touching(&self, guid: &Guid) -> Vec<Relationship> {
        self.inner
            .read()
            .relationships
            .values()
            .filter(|r| r.touches(guid))
            .cloned()
            .collect()
    }

    /// Shallow copy of current state, or a reconstruction as of `t`
    ///
    /// The reconstruction includes every current record effective at or
    /// before `t`, then consults each shared history log most-recent-first:
    /// the first qualifying entry is reinstated for its GUID (without
    /// displacing a current record that already qualified) and the scan of
    /// that log stops there. Older versions of other GUIDs are not
    /// recovered; callers needing full lineage use a back end that keeps a
    /// temporal index.
    pub fn snapshot(&self, as_of: Option<DateTime<Utc>>) -> StoreSnapshot {
        let inner = self.inner.read();
        let Some(t) = as_of else {
            return StoreSnapshot {
                entities: inner.entities.clone(),
                relationships: inner.relationships.clone(),
            };
        };

        let mut entities: HashMap<Guid, Entity> = inner
            .entities
            .iter()
            .filter(|(_, e)| e.header().effective_time() <= t)
            .map(|(guid, e)| (guid.clone(), e.clone()))
            .collect();
        for old in &inner.entity_history {
            if old.header().effective_time() <= t {
                entities
                    .entry(old.guid().clone())
                    .or_insert_with(|| old.clone());
                break;
            }
        }

        let mut relationships: HashMap<Guid, Relationship> = inner
            .relationships
            .iter()
            .filter(|(_, r)| r.header.effective_time() <= t)
            .map(|(guid, r)| (guid.clone(), r.clone()))
            .collect();
        for old in &inner.relationship_history {
            if old.header.effective_time() <= t {
                relationships
                    .entry(old.header.guid.clone())
                    .or_insert_with(|| old.clone());
                break;
            }
        }

        tracing::debug!(
            entities = entities.len(),
            relationships = relationships.len(),
            "reconstructed store snapshot"
        );
        StoreSnapshot {
            entities,
            relationships,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{CohortInstanceFactory, EntityDetail, InstanceFactory, InstanceStatus};

    fn factory() -> CohortInstanceFactory {
        CohortInstanceFactory::new("col-1", "Main")
    }

    fn new_detail(name: &str) -> EntityDetail {
        let mut props = HashMap::new();
        props.insert("displayName".to_string(), serde_json::json!(name));
        factory().new_entity("Asset", props, Vec::new(), InstanceStatus::Active)
    }

    fn display_name(entity: &Entity) -> String {
        entity.header().properties["displayName"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_create_and_get() {
        let store = InstanceStore::new();
        let created = store.create_entity(Entity::Detail(new_detail("orders")));
        let fetched = store.entity(created.guid()).unwrap();
        assert_eq!(fetched.guid(), created.guid());
        assert!(store.entity(&Guid::new("missing")).is_none());
    }

    #[test]
    fn test_guid_collision_regenerates() {
        let store = InstanceStore::new();
        let first = store.create_entity(Entity::Detail(new_detail("one")));

        let mut clash = new_detail("two");
        clash.header.guid = first.guid().clone();
        let second = store.create_entity(Entity::Detail(clash));

        assert_ne!(second.guid(), first.guid());
        assert_eq!(display_name(&store.entity(first.guid()).unwrap()), "one");
        assert_eq!(display_name(&store.entity(second.guid()).unwrap()), "two");
    }

    #[test]
    fn test_update_pushes_history_and_undo_walks_back() {
        let store = InstanceStore::new();
        let created = store.create_entity(Entity::Detail(new_detail("v1")));
        let guid = created.guid().clone();

        for (version, name) in [(2, "v2"), (3, "v3")] {
            let mut next = store.entity(&guid).unwrap();
            next.header_mut()
                .properties
                .insert("displayName".to_string(), serde_json::json!(name));
            next.header_mut().touch(version);
            store.update_entity(next);
        }
        assert_eq!(display_name(&store.entity(&guid).unwrap()), "v3");
        assert_eq!(store.entity(&guid).unwrap().header().version, 3);

        // each undo reinstates the next-most-recent snapshot with a
        // version one past current
        let undone = store.previous_entity_version(&guid).unwrap();
        assert_eq!(display_name(&undone), "v2");
        assert_eq!(undone.header().version, 4);

        let undone = store.previous_entity_version(&guid).unwrap();
        assert_eq!(display_name(&undone), "v1");
        assert_eq!(undone.header().version, 5);

        assert!(store.previous_entity_version(&guid).is_none());
    }

    #[test]
    fn test_remove_keep_retains_history() {
        let store = InstanceStore::new();
        let created = store.create_entity(Entity::Detail(new_detail("kept")));
        let guid = created.guid().clone();

        store.remove_entity(&guid, Retention::Keep);
        assert!(store.entity(&guid).is_none());

        let reinstated = store.previous_entity_version(&guid).unwrap();
        assert_eq!(display_name(&reinstated), "kept");
        assert_eq!(reinstated.header().version, 2);
    }

    #[test]
    fn test_remove_discard_scrubs_history() {
        let store = InstanceStore::new();
        let created = store.create_entity(Entity::Detail(new_detail("v1")));
        let guid = created.guid().clone();

        let mut next = store.entity(&guid).unwrap();
        next.header_mut().touch(2);
        store.update_entity(next);

        store.remove_entity(&guid, Retention::Discard);
        assert!(store.entity(&guid).is_none());
        assert!(store.previous_entity_version(&guid).is_none());
    }

    #[test]
    fn test_snapshot_as_of_reconstructs_prior_version() {
        let store = InstanceStore::new();
        let created = store.create_entity(Entity::Detail(new_detail("v1")));
        let guid = created.guid().clone();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let between = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let mut next = store.entity(&guid).unwrap();
        next.header_mut()
            .properties
            .insert("displayName".to_string(), serde_json::json!("v2"));
        next.header_mut().touch(2);
        store.update_entity(next);

        let warped = store.snapshot(Some(between));
        assert_eq!(display_name(&warped.entities[&guid]), "v1");

        let current = store.snapshot(Some(Utc::now()));
        assert_eq!(display_name(&current.entities[&guid]), "v2");

        let unscoped = store.snapshot(None);
        assert_eq!(display_name(&unscoped.entities[&guid]), "v2");
    }

    #[test]
    fn test_snapshot_history_scan_stops_after_first_hit() {
        // Two entities both updated after the warp point: only the most
        // recently logged prior version is reconstructed. The scan stops at
        // the first qualifying history entry.
        let store = InstanceStore::new();
        let a = store.create_entity(Entity::Detail(new_detail("a-v1")));
        let b = store.create_entity(Entity::Detail(new_detail("b-v1")));
        let a_guid = a.guid().clone();
        let b_guid = b.guid().clone();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let between = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(5));

        for guid in [&a_guid, &b_guid] {
            let mut next = store.entity(guid).unwrap();
            next.header_mut().touch(2);
            store.update_entity(next);
        }

        let warped = store.snapshot(Some(between));
        let reconstructed = [&a_guid, &b_guid]
            .iter()
            .filter(|g| warped.entities.contains_key(**g))
            .count();
        assert_eq!(reconstructed, 1);
    }

    #[test]
    fn test_snapshot_keeps_qualifying_current_over_history() {
        let store = InstanceStore::new();
        let created = store.create_entity(Entity::Detail(new_detail("v1")));
        let guid = created.guid().clone();

        let mut next = store.entity(&guid).unwrap();
        next.header_mut()
            .properties
            .insert("displayName".to_string(), serde_json::json!("v2"));
        next.header_mut().touch(2);
        store.update_entity(next);

        std::thread::sleep(std::time::Duration::from_millis(5));
        // both the current record and the logged prior version qualify;
        // the current one wins
        let warped = store.snapshot(Some(Utc::now()));
        assert_eq!(display_name(&warped.entities[&guid]), "v2");
    }

    #[test]
    fn test_save_copy_writes_no_history() {
        let store = InstanceStore::new();
        let mut mirrored = new_detail("mirror-v1");
        mirrored.header.home_collection_id = "col-2".to_string();
        let guid = mirrored.header.guid.clone();
        store.save_entity_copy(Entity::Detail(mirrored.clone()));

        let mut refreshed = mirrored;
        refreshed.header.touch(2);
        store.save_entity_copy(Entity::Detail(refreshed));

        assert_eq!(store.entity(&guid).unwrap().header().version, 2);
        assert!(store.previous_entity_version(&guid).is_none());
    }
}
