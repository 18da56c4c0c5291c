//! Instance factory contract - minting records with provenance stamps

use crate::classification::{Classification, ClassificationOrigin};
use crate::entity::{EntityDetail, EntityProxy};
use crate::instance::{InstanceHeader, InstanceStatus, Provenance};
use crate::query::{Paging, Sequencing, SequencingOrder};
use crate::relationship::Relationship;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Mints instance records and formats result lists
///
/// Supplied by the surrounding system so provenance stamping, version
/// numbering and result sequencing stay uniform across back ends.
pub trait InstanceFactory: Send + Sync {
    fn new_entity(
        &self,
        type_name: &str,
        properties: HashMap<String, serde_json::Value>,
        classifications: Vec<Classification>,
        status: InstanceStatus,
    ) -> EntityDetail;

    fn new_relationship(
        &self,
        type_name: &str,
        properties: HashMap<String, serde_json::Value>,
        end_one: EntityProxy,
        end_two: EntityProxy,
        status: InstanceStatus,
    ) -> Relationship;

    fn new_classification(
        &self,
        name: &str,
        properties: HashMap<String, serde_json::Value>,
        origin: ClassificationOrigin,
    ) -> Classification;

    /// Reduce a full record to the proxy form relationships embed
    fn proxy_from(&self, entity: &EntityDetail) -> EntityProxy;

    /// Version an instance takes after a mutation
    fn next_version(&self, current: u64) -> u64;

    /// Order a result list and cut the requested page
    fn sequence_entities(
        &self,
        entities: Vec<EntityDetail>,
        sequencing: &Sequencing,
        paging: &Paging,
    ) -> Vec<EntityDetail>;

    fn sequence_relationships(
        &self,
        relationships: Vec<Relationship>,
        sequencing: &Sequencing,
        paging: &Paging,
    ) -> Vec<Relationship>;
}

/// Factory stamping instances as locally homed in one cohort collection
#[derive(Debug, Clone)]
pub struct CohortInstanceFactory {
    collection_id: String,
    collection_name: String,
}

impl CohortInstanceFactory {
    pub fn new(collection_id: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            collection_name: collection_name.into(),
        }
    }

    fn new_header(&self, type_name: &str, status: InstanceStatus) -> InstanceHeader {
        let mut header = InstanceHeader::new(
            type_name,
            &self.collection_id,
            &self.collection_name,
            Provenance::LocalCohort,
        );
        header.status = status;
        header
    }
}

impl InstanceFactory for CohortInstanceFactory {
    fn new_entity(
        &self,
        type_name: &str,
        properties: HashMap<String, serde_json::Value>,
        classifications: Vec<Classification>,
        status: InstanceStatus,
    ) -> EntityDetail {
        let mut header = self.new_header(type_name, status);
        header.properties = properties;
        EntityDetail {
            header,
            classifications,
        }
    }

    fn new_relationship(
        &self,
        type_name: &str,
        properties: HashMap<String, serde_json::Value>,
        end_one: EntityProxy,
        end_two: EntityProxy,
        status: InstanceStatus,
    ) -> Relationship {
        let mut header = self.new_header(type_name, status);
        header.properties = properties;
        Relationship::new(header, end_one, end_two)
    }

    fn new_classification(
        &self,
        name: &str,
        properties: HashMap<String, serde_json::Value>,
        origin: ClassificationOrigin,
    ) -> Classification {
        Classification::new(name, origin, Provenance::LocalCohort).with_properties(properties)
    }

    fn proxy_from(&self, entity: &EntityDetail) -> EntityProxy {
        EntityProxy {
            header: entity.header.clone(),
            classifications: entity.classifications.clone(),
        }
    }

    fn next_version(&self, current: u64) -> u64 {
        current + 1
    }

    fn sequence_entities(
        &self,
        mut entities: Vec<EntityDetail>,
        sequencing: &Sequencing,
        paging: &Paging,
    ) -> Vec<EntityDetail> {
        entities.sort_by(|a, b| compare_headers(&a.header, &b.header, sequencing));
        window(entities, paging)
    }

    fn sequence_relationships(
        &self,
        mut relationships: Vec<Relationship>,
        sequencing: &Sequencing,
        paging: &Paging,
    ) -> Vec<Relationship> {
        relationships.sort_by(|a, b| compare_headers(&a.header, &b.header, sequencing));
        window(relationships, paging)
    }
}

fn compare_headers(a: &InstanceHeader, b: &InstanceHeader, sequencing: &Sequencing) -> Ordering {
    match sequencing.order {
        SequencingOrder::Guid => a.guid.cmp(&b.guid),
        SequencingOrder::CreationDate => a.created_at.cmp(&b.created_at),
        SequencingOrder::LastUpdate => a.effective_time().cmp(&b.effective_time()),
        SequencingOrder::PropertyAscending | SequencingOrder::PropertyDescending => {
            let ordering = match &sequencing.property {
                Some(name) => {
                    compare_property(a.properties.get(name), b.properties.get(name))
                }
                None => Ordering::Equal,
            };
            if sequencing.order == SequencingOrder::PropertyDescending {
                ordering.reverse()
            } else {
                ordering
            }
        }
    }
}

/// Instances missing the sequencing property sort last
fn compare_property(
    a: Option<&serde_json::Value>,
    b: Option<&serde_json::Value>,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_values(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    use serde_json::Value;
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn window<T>(items: Vec<T>, paging: &Paging) -> Vec<T> {
    let take = if paging.page_size == 0 {
        usize::MAX
    } else {
        paging.page_size
    };
    items
        .into_iter()
        .skip(paging.from_element)
        .take(take)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> CohortInstanceFactory {
        CohortInstanceFactory::new("col-1", "Main")
    }

    fn entity_with_name(name: &str) -> EntityDetail {
        let mut props = HashMap::new();
        props.insert("displayName".to_string(), serde_json::json!(name));
        factory().new_entity("Asset", props, Vec::new(), InstanceStatus::Active)
    }

    #[test]
    fn test_new_entity_stamps_provenance() {
        let entity = factory().new_entity(
            "Asset",
            HashMap::new(),
            Vec::new(),
            InstanceStatus::Draft,
        );
        assert_eq!(entity.header.provenance, Provenance::LocalCohort);
        assert_eq!(entity.header.home_collection_id, "col-1");
        assert_eq!(entity.header.status, InstanceStatus::Draft);
        assert_eq!(entity.header.version, 1);
    }

    #[test]
    fn test_proxy_keeps_header_and_classifications() {
        let mut entity = entity_with_name("orders");
        entity.classifications.push(factory().new_classification(
            "Confidential",
            HashMap::new(),
            ClassificationOrigin::Assigned,
        ));

        let proxy = factory().proxy_from(&entity);
        assert_eq!(proxy.header.guid, entity.header.guid);
        assert_eq!(proxy.classifications.len(), 1);
    }

    #[test]
    fn test_sequence_entities_by_property() {
        let entities = vec![
            entity_with_name("beta"),
            entity_with_name("alpha"),
            entity_with_name("gamma"),
        ];

        let ordered = factory().sequence_entities(
            entities,
            &Sequencing::by_property("displayName", false),
            &Paging::unbounded(),
        );
        let names: Vec<_> = ordered
            .iter()
            .map(|e| e.header.properties["displayName"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_sequence_entities_pages_after_ordering() {
        let entities = vec![
            entity_with_name("beta"),
            entity_with_name("alpha"),
            entity_with_name("gamma"),
        ];

        let page = factory().sequence_entities(
            entities,
            &Sequencing::by_property("displayName", false),
            &Paging::new(1, 1),
        );
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].header.properties["displayName"], "beta");
    }
}
