//! Cairn Core - instance model and traversal engine
//!
//! This crate provides the data types, the repository protocol and the
//! neighborhood traversal engine for the Cairn metadata repository.

pub mod classification;
pub mod entity;
pub mod error;
pub mod factory;
pub mod instance;
pub mod limits;
pub mod matching;
pub mod query;
pub mod relationship;
pub mod repository;
pub mod traversal;
pub mod validation;

pub use classification::{Classification, ClassificationOrigin};
pub use entity::{Entity, EntityDetail, EntityProxy};
pub use error::{CascadeFailure, CascadeOutcome, Error, Result};
pub use factory::{CohortInstanceFactory, InstanceFactory};
pub use instance::{Guid, InstanceHeader, InstanceStatus, Provenance};
pub use matching::{ExactMatcher, PropertyMatcher};
pub use query::{
    status_passes, EntityFindQuery, EntityRelationshipsQuery, MatchCriteria, MatchMode,
    NeighborhoodQuery, Paging, RelationshipFindQuery, Sequencing, SequencingOrder,
};
pub use relationship::Relationship;
pub use repository::{MetadataRepository, NewClassification, NewEntity, NewRelationship};
pub use traversal::{effective_level, InstanceGraph, NeighborhoodEngine};
pub use validation::{OpenTypeValidator, TypeValidator};
