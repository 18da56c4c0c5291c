//! Neighborhood traversal - bounded breadth-first sub-graph extraction

use crate::classification::Classification;
use crate::entity::Entity;
use crate::instance::Guid;
use crate::limits::MAX_NEIGHBORHOOD_LEVEL;
use crate::query::{status_passes, NeighborhoodQuery};
use crate::relationship::Relationship;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Connected sub-graph radiating from a root entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceGraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl InstanceGraph {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    pub fn contains_entity(&self, guid: &Guid) -> bool {
        self.entities.iter().any(|e| e.guid() == guid)
    }

    pub fn contains_relationship(&self, guid: &Guid) -> bool {
        self.relationships.iter().any(|r| &r.header.guid == guid)
    }
}

/// Map any out-of-range level to the hard cap
pub fn effective_level(level: i32) -> u32 {
    if (1..=MAX_NEIGHBORHOOD_LEVEL as i32).contains(&level) {
        level as u32
    } else {
        MAX_NEIGHBORHOOD_LEVEL
    }
}

/// Bounded breadth-first neighborhood extraction over a store snapshot
pub struct NeighborhoodEngine;

impl NeighborhoodEngine {
    /// Extract the connected sub-graph reachable from `query.root` within
    /// the level bound, restricted to instances passing the filters.
    ///
    /// The maps are a snapshot already scoped to the requested time. An
    /// unresolvable root produces an empty graph, so callers check root
    /// existence first and report not-found themselves.
    pub fn execute(
        query: &NeighborhoodQuery,
        entities: &HashMap<Guid, Entity>,
        relationships: &HashMap<Guid, Relationship>,
    ) -> InstanceGraph {
        let level = effective_level(query.level);
        tracing::debug!(root = %query.root, level, "starting neighborhood traversal");

        // entity guid -> relationships touching it at either end
        let mut adjacency: HashMap<&Guid, Vec<&Guid>> = HashMap::new();
        for (guid, relationship) in relationships {
            let (one, two) = relationship.end_guids();
            adjacency.entry(one).or_default().push(guid);
            if two != one {
                adjacency.entry(two).or_default().push(guid);
            }
        }

        let mut visited_entities: HashSet<Guid> = HashSet::new();
        let mut visited_relationships: HashSet<Guid> = HashSet::new();

        // the root is force-included by GUID even when unresolvable
        visited_entities.insert(query.root.clone());
        let mut frontier = vec![query.root.clone()];

        for _ in 0..level {
            let mut next = Vec::new();
            for current in &frontier {
                let Some(touching) = adjacency.get(current) else {
                    continue;
                };
                for &rel_guid in touching {
                    if visited_relationships.contains(rel_guid) {
                        continue;
                    }
                    let Some(relationship) = relationships.get(rel_guid) else {
                        continue;
                    };
                    if !Self::relationship_passes(relationship, query, entities) {
                        continue;
                    }

                    visited_relationships.insert(rel_guid.clone());
                    let (one, two) = relationship.end_guids();
                    let opposite = if one == current { two } else { one };
                    let newly_reached = !visited_entities.contains(opposite);
                    visited_entities.insert(one.clone());
                    visited_entities.insert(two.clone());
                    if newly_reached {
                        next.push(opposite.clone());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        // resolve back through the snapshot; unresolvable guids drop out
        let graph_entities: Vec<Entity> = visited_entities
            .iter()
            .filter_map(|guid| entities.get(guid).cloned())
            .collect();
        let graph_relationships: Vec<Relationship> = visited_relationships
            .iter()
            .filter_map(|guid| relationships.get(guid).cloned())
            .collect();

        tracing::debug!(
            entities = graph_entities.len(),
            relationships = graph_relationships.len(),
            "neighborhood traversal complete"
        );

        InstanceGraph {
            entities: graph_entities,
            relationships: graph_relationships,
        }
    }

    fn relationship_passes(
        relationship: &Relationship,
        query: &NeighborhoodQuery,
        entities: &HashMap<Guid, Entity>,
    ) -> bool {
        if !query.relationship_type_filter.is_empty()
            && !query
                .relationship_type_filter
                .contains(&relationship.header.type_name)
        {
            return false;
        }
        if !status_passes(relationship.header.status, &query.status_filter) {
            return false;
        }

        let (one, two) = relationship.end_guids();
        Self::endpoint_passes(one, relationship, query, entities)
            && Self::endpoint_passes(two, relationship, query, entities)
    }

    /// Each end is checked independently against the full entity-type
    /// filter, and must carry every classification in the filter.
    fn endpoint_passes(
        end: &Guid,
        relationship: &Relationship,
        query: &NeighborhoodQuery,
        entities: &HashMap<Guid, Entity>,
    ) -> bool {
        // prefer the snapshot record; fall back to the embedded proxy
        let (type_name, classifications): (&str, &[Classification]) = match entities.get(end) {
            Some(entity) => (&entity.header().type_name, entity.classifications()),
            None => {
                let proxy = if &relationship.end_one.header.guid == end {
                    &relationship.end_one
                } else {
                    &relationship.end_two
                };
                (&proxy.header.type_name, &proxy.classifications)
            }
        };

        if !query.entity_type_filter.is_empty()
            && !query.entity_type_filter.iter().any(|t| t == type_name)
        {
            return false;
        }
        query
            .classification_filter
            .iter()
            .all(|name| classifications.iter().any(|c| &c.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ClassificationOrigin;
    use crate::factory::{CohortInstanceFactory, InstanceFactory};
    use crate::instance::InstanceStatus;

    fn factory() -> CohortInstanceFactory {
        CohortInstanceFactory::new("col-1", "Main")
    }

    fn add_entity(entities: &mut HashMap<Guid, Entity>, type_name: &str) -> Guid {
        let detail = factory().new_entity(
            type_name,
            HashMap::new(),
            Vec::new(),
            InstanceStatus::Active,
        );
        let guid = detail.header.guid.clone();
        entities.insert(guid.clone(), Entity::Detail(detail));
        guid
    }

    fn link(
        entities: &HashMap<Guid, Entity>,
        relationships: &mut HashMap<Guid, Relationship>,
        one: &Guid,
        two: &Guid,
        type_name: &str,
    ) -> Guid {
        let proxy_one = factory().proxy_from(entities[one].as_detail().unwrap());
        let proxy_two = factory().proxy_from(entities[two].as_detail().unwrap());
        let relationship = factory().new_relationship(
            type_name,
            HashMap::new(),
            proxy_one,
            proxy_two,
            InstanceStatus::Active,
        );
        let guid = relationship.header.guid.clone();
        relationships.insert(guid.clone(), relationship);
        guid
    }

    // A --connects-- B --connects-- C
    fn chain() -> (HashMap<Guid, Entity>, HashMap<Guid, Relationship>, Vec<Guid>) {
        let mut entities = HashMap::new();
        let mut relationships = HashMap::new();
        let a = add_entity(&mut entities, "Node");
        let b = add_entity(&mut entities, "Node");
        let c = add_entity(&mut entities, "Node");
        link(&entities, &mut relationships, &a, &b, "connects");
        link(&entities, &mut relationships, &b, &c, "connects");
        (entities, relationships, vec![a, b, c])
    }

    #[test]
    fn test_effective_level_clamps() {
        assert_eq!(effective_level(0), 100);
        assert_eq!(effective_level(-5), 100);
        assert_eq!(effective_level(500), 100);
        assert_eq!(effective_level(1), 1);
        assert_eq!(effective_level(100), 100);
    }

    #[test]
    fn test_level_one_stops_after_one_hop() {
        let (entities, relationships, guids) = chain();
        let query = NeighborhoodQuery::new(guids[0].clone()).with_level(1);
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);

        assert!(graph.contains_entity(&guids[0]));
        assert!(graph.contains_entity(&guids[1]));
        assert!(!graph.contains_entity(&guids[2]));
        assert_eq!(graph.relationships.len(), 1);
    }

    #[test]
    fn test_out_of_range_levels_behave_as_max() {
        let (entities, relationships, guids) = chain();
        for level in [0, 500] {
            let query = NeighborhoodQuery::new(guids[0].clone()).with_level(level);
            let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
            assert_eq!(graph.entities.len(), 3, "level {} should reach everything", level);
            assert_eq!(graph.relationships.len(), 2);
        }
    }

    #[test]
    fn test_cycle_terminates() {
        let mut entities = HashMap::new();
        let mut relationships = HashMap::new();
        let a = add_entity(&mut entities, "Node");
        let b = add_entity(&mut entities, "Node");
        let c = add_entity(&mut entities, "Node");
        link(&entities, &mut relationships, &a, &b, "connects");
        link(&entities, &mut relationships, &b, &c, "connects");
        link(&entities, &mut relationships, &c, &a, "connects");

        let query = NeighborhoodQuery::new(a.clone()).with_level(100);
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
        assert_eq!(graph.entities.len(), 3);
        assert_eq!(graph.relationships.len(), 3);
    }

    #[test]
    fn test_relationship_type_filter() {
        let mut entities = HashMap::new();
        let mut relationships = HashMap::new();
        let a = add_entity(&mut entities, "Node");
        let b = add_entity(&mut entities, "Node");
        let c = add_entity(&mut entities, "Node");
        link(&entities, &mut relationships, &a, &b, "owns");
        link(&entities, &mut relationships, &b, &c, "uses");

        let query = NeighborhoodQuery::new(a.clone()).with_relationship_type("owns");
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
        assert!(graph.contains_entity(&b));
        assert!(!graph.contains_entity(&c));
    }

    #[test]
    fn test_entity_type_filter_checks_both_ends() {
        let mut entities = HashMap::new();
        let mut relationships = HashMap::new();
        let a = add_entity(&mut entities, "Person");
        let b = add_entity(&mut entities, "Team");
        link(&entities, &mut relationships, &a, &b, "member");

        // one end fails the filter, so the relationship is rejected
        let query = NeighborhoodQuery::new(a.clone()).with_entity_type("Person");
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
        assert!(graph.relationships.is_empty());
        assert!(!graph.contains_entity(&b));

        let query = NeighborhoodQuery::new(a.clone())
            .with_entity_type("Person")
            .with_entity_type("Team");
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
        assert_eq!(graph.relationships.len(), 1);
        assert!(graph.contains_entity(&b));
    }

    #[test]
    fn test_status_filter_excludes_deleted_by_default() {
        let (entities, mut relationships, guids) = chain();
        let rel_guid = relationships.keys().next().cloned().unwrap();
        // soft-delete every relationship in the fixture
        for relationship in relationships.values_mut() {
            relationship.header.status = InstanceStatus::Deleted;
        }

        let query = NeighborhoodQuery::new(guids[0].clone());
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
        assert!(graph.relationships.is_empty());

        let query = NeighborhoodQuery::new(guids[0].clone())
            .with_status(InstanceStatus::Deleted);
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
        assert!(graph.contains_relationship(&rel_guid));
    }

    #[test]
    fn test_classification_filter_requires_both_ends() {
        let mut entities = HashMap::new();
        let mut relationships = HashMap::new();
        let a = add_entity(&mut entities, "Node");
        let b = add_entity(&mut entities, "Node");
        link(&entities, &mut relationships, &a, &b, "connects");

        let classify = |entities: &mut HashMap<Guid, Entity>, guid: &Guid| {
            let record = factory().new_classification(
                "Confidential",
                HashMap::new(),
                ClassificationOrigin::Assigned,
            );
            entities.get_mut(guid).unwrap().classifications_mut().push(record);
        };

        classify(&mut entities, &a);
        let query = NeighborhoodQuery::new(a.clone()).with_classification("Confidential");
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
        assert!(graph.relationships.is_empty());

        classify(&mut entities, &b);
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
        assert_eq!(graph.relationships.len(), 1);
    }

    #[test]
    fn test_absent_root_yields_empty_graph() {
        let (entities, relationships, _) = chain();
        let query = NeighborhoodQuery::new(Guid::new("missing"));
        let graph = NeighborhoodEngine::execute(&query, &entities, &relationships);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_isolated_root_returns_just_the_root() {
        let mut entities = HashMap::new();
        let a = add_entity(&mut entities, "Node");
        let query = NeighborhoodQuery::new(a.clone());
        let graph = NeighborhoodEngine::execute(&query, &entities, &HashMap::new());
        assert_eq!(graph.entities.len(), 1);
        assert!(graph.relationships.is_empty());
    }
}
