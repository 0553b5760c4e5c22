//! Foundation types for CMR, an in-process CMIS content repository.
//!
//! This crate provides the identifier, value, ACL, and type-definition
//! types used throughout the repository core. Every other CMR crate
//! depends on `cmr-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] — store-assigned object identifier (UUID v7 backed)
//! - [`TypedValue`] / [`PropertyValue`] — the eight CMIS value families,
//!   single- or multi-valued, with per-family comparison semantics
//! - [`Acl`] / [`Ace`] / [`AclPropagation`] — access control lists and
//!   their merge rules
//! - [`TypeDefinition`] / [`TypeManager`] / [`TypeRegistry`] — object type
//!   declarations and the parent-chain resolution seam
//! - [`RepositoryError`] — the five-kind error taxonomy shared by the
//!   store and the query evaluator

pub mod acl;
pub mod error;
pub mod id;
pub mod typedef;
pub mod value;

pub use acl::{
    Ace, Acl, AclPropagation, PERMISSION_ALL, PERMISSION_READ, PERMISSION_WRITE,
    PRINCIPAL_ANYONE,
};
pub use error::{RepoResult, RepositoryError};
pub use id::ObjectId;
pub use typedef::{
    Cardinality, PropertyDefinition, TypeDefinition, TypeManager, TypeRegistry,
    BASE_TYPE_DOCUMENT, BASE_TYPE_FOLDER, BASE_TYPE_RELATIONSHIP, PROP_CHANGE_TOKEN,
    PROP_CREATED_BY, PROP_CREATION_DATE, PROP_LAST_MODIFICATION_DATE, PROP_LAST_MODIFIED_BY,
    PROP_NAME, PROP_OBJECT_ID, PROP_OBJECT_TYPE_ID,
};
pub use value::{compare_for_order, OrderBy, PropertyType, PropertyValue, TypedValue};
