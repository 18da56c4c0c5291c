//! Type validation contract - the boundary to the cohort's type registry

use crate::entity::EntityProxy;
use crate::error::Result;
use crate::instance::InstanceStatus;
use crate::limits;
use std::collections::HashMap;

/// Verifies instances against the cohort's type system
///
/// The repository core treats type names as opaque; the surrounding system
/// supplies a registry-backed implementation. [`OpenTypeValidator`] stands
/// in where no registry is wired.
pub trait TypeValidator: Send + Sync {
    /// The type name is usable for new instances
    fn validate_type_known(&self, type_name: &str) -> Result<()>;

    /// Whether `type_name` satisfies a type filter; subtype semantics live
    /// with the registry. An empty filter admits every type.
    fn type_matches(&self, type_name: &str, filter: &[String]) -> bool;

    /// The status is legal for instances of the type
    fn validate_status_for_type(&self, type_name: &str, status: InstanceStatus) -> Result<()>;

    /// The property bag is compatible with the type
    fn validate_properties(
        &self,
        type_name: &str,
        properties: &HashMap<String, serde_json::Value>,
    ) -> Result<()>;

    /// The classification is attachable to entities of the type
    fn validate_classification(
        &self,
        entity_type: &str,
        classification_name: &str,
        properties: &HashMap<String, serde_json::Value>,
    ) -> Result<()>;

    /// The ends satisfy the relationship type's end constraints
    fn validate_relationship_ends(
        &self,
        relationship_type: &str,
        end_one: &EntityProxy,
        end_two: &EntityProxy,
    ) -> Result<()>;
}

/// Registry-free validator: accepts well-formed names and any property bag
#[derive(Debug, Clone, Default)]
pub struct OpenTypeValidator;

impl TypeValidator for OpenTypeValidator {
    fn validate_type_known(&self, type_name: &str) -> Result<()> {
        limits::validate_type_name(type_name)?;
        Ok(())
    }

    fn type_matches(&self, type_name: &str, filter: &[String]) -> bool {
        filter.is_empty() || filter.iter().any(|t| t == type_name)
    }

    fn validate_status_for_type(&self, _type_name: &str, _status: InstanceStatus) -> Result<()> {
        Ok(())
    }

    fn validate_properties(
        &self,
        _type_name: &str,
        _properties: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        Ok(())
    }

    fn validate_classification(
        &self,
        _entity_type: &str,
        classification_name: &str,
        _properties: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        limits::validate_classification_name(classification_name)?;
        Ok(())
    }

    fn validate_relationship_ends(
        &self,
        _relationship_type: &str,
        _end_one: &EntityProxy,
        _end_two: &EntityProxy,
    ) -> Result<()> {
        Ok(())
    }
}
