//! Entity records - full details and remote-homed proxies

use crate::classification::Classification;
use crate::instance::{Guid, InstanceHeader};
use serde::{Deserialize, Serialize};

/// The full record of an entity held by this repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDetail {
    pub header: InstanceHeader,

    /// Ordered classification list
    #[serde(default)]
    pub classifications: Vec<Classification>,
}

impl EntityDetail {
    pub fn new(header: InstanceHeader) -> Self {
        Self {
            header,
            classifications: Vec::new(),
        }
    }

    pub fn has_classification(&self, name: &str) -> bool {
        self.classifications.iter().any(|c| c.name == name)
    }
}

/// Header-and-classifications stand-in for an entity whose authoritative
/// copy lives in another repository
///
/// Proxies exist so relationships can reference remote endpoints; a proxy
/// is never returned where a full detail record was asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityProxy {
    pub header: InstanceHeader,

    #[serde(default)]
    pub classifications: Vec<Classification>,
}

impl EntityProxy {
    pub fn guid(&self) -> &Guid {
        &self.header.guid
    }
}

/// An entity record as held in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Detail(EntityDetail),
    Proxy(EntityProxy),
}

impl Entity {
    pub fn header(&self) -> &InstanceHeader {
        match self {
            Self::Detail(d) => &d.header,
            Self::Proxy(p) => &p.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut InstanceHeader {
        match self {
            Self::Detail(d) => &mut d.header,
            Self::Proxy(p) => &mut p.header,
        }
    }

    pub fn guid(&self) -> &Guid {
        &self.header().guid
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }

    pub fn classifications(&self) -> &[Classification] {
        match self {
            Self::Detail(d) => &d.classifications,
            Self::Proxy(p) => &p.classifications,
        }
    }

    pub fn classifications_mut(&mut self) -> &mut Vec<Classification> {
        match self {
            Self::Detail(d) => &mut d.classifications,
            Self::Proxy(p) => &mut p.classifications,
        }
    }

    pub fn has_classification(&self, name: &str) -> bool {
        self.classifications().iter().any(|c| c.name == name)
    }

    pub fn as_detail(&self) -> Option<&EntityDetail> {
        match self {
            Self::Detail(d) => Some(d),
            Self::Proxy(_) => None,
        }
    }

    pub fn into_detail(self) -> Option<EntityDetail> {
        match self {
            Self::Detail(d) => Some(d),
            Self::Proxy(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ClassificationOrigin;
    use crate::instance::Provenance;

    fn sample_header() -> InstanceHeader {
        InstanceHeader::new("DataSet", "col-1", "Main", Provenance::LocalCohort)
    }

    #[test]
    fn test_detail_classification_lookup() {
        let mut detail = EntityDetail::new(sample_header());
        detail.classifications.push(Classification::new(
            "Confidential",
            ClassificationOrigin::Assigned,
            Provenance::LocalCohort,
        ));

        assert!(detail.has_classification("Confidential"));
        assert!(!detail.has_classification("Retention"));
    }

    #[test]
    fn test_entity_variant_dispatch() {
        let detail = Entity::Detail(EntityDetail::new(sample_header()));
        let proxy = Entity::Proxy(EntityProxy {
            header: sample_header(),
            classifications: Vec::new(),
        });

        assert!(!detail.is_proxy());
        assert!(proxy.is_proxy());
        assert!(detail.as_detail().is_some());
        assert!(proxy.as_detail().is_none());
    }

    #[test]
    fn test_header_access_through_variants() {
        let mut entity = Entity::Detail(EntityDetail::new(sample_header()));
        entity.header_mut().touch(2);
        assert_eq!(entity.header().version, 2);
    }
}
