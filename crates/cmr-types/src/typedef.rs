//! Object type definitions and the type-manager seam.
//!
//! A [`TypeDefinition`] names a type, its optional parent type, and the
//! properties its instances may carry. The [`TypeManager`] trait is the
//! seam the store and the query evaluator consult to walk parent chains;
//! [`TypeRegistry`] is the in-memory implementation, pre-loadable with the
//! CMIS base types.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{RepoResult, RepositoryError};
use crate::value::{PropertyType, PropertyValue};

/// Base type id for folders.
pub const BASE_TYPE_FOLDER: &str = "cmis:folder";
/// Base type id for documents (versioned or not).
pub const BASE_TYPE_DOCUMENT: &str = "cmis:document";
/// Base type id for relationships.
pub const BASE_TYPE_RELATIONSHIP: &str = "cmis:relationship";

/// System property: object name.
pub const PROP_NAME: &str = "cmis:name";
/// System property: object id.
pub const PROP_OBJECT_ID: &str = "cmis:objectId";
/// System property: object type id.
pub const PROP_OBJECT_TYPE_ID: &str = "cmis:objectTypeId";
/// System property: creating principal.
pub const PROP_CREATED_BY: &str = "cmis:createdBy";
/// System property: creation instant.
pub const PROP_CREATION_DATE: &str = "cmis:creationDate";
/// System property: last modifying principal.
pub const PROP_LAST_MODIFIED_BY: &str = "cmis:lastModifiedBy";
/// System property: last modification instant.
pub const PROP_LAST_MODIFICATION_DATE: &str = "cmis:lastModificationDate";
/// System property: opaque change token.
pub const PROP_CHANGE_TOKEN: &str = "cmis:changeToken";

/// Whether a property holds one value or an ordered list of values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    Single,
    Multi,
}

/// Declaration of one property on a type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: String,
    pub property_type: PropertyType,
    pub cardinality: Cardinality,
}

impl PropertyDefinition {
    /// A single-valued property declaration.
    pub fn single(id: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id: id.into(),
            property_type,
            cardinality: Cardinality::Single,
        }
    }

    /// A multi-valued property declaration.
    pub fn multi(id: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id: id.into(),
            property_type,
            cardinality: Cardinality::Multi,
        }
    }
}

/// Definition of an object type: id, parent link, and property set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub id: String,
    pub parent_id: Option<String>,
    pub property_definitions: HashMap<String, PropertyDefinition>,
}

impl TypeDefinition {
    /// A new type with no properties declared yet.
    pub fn new(id: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            property_definitions: HashMap::new(),
        }
    }

    /// Declare a property on this type (builder style).
    pub fn with_property(mut self, definition: PropertyDefinition) -> Self {
        self.property_definitions
            .insert(definition.id.clone(), definition);
        self
    }

    /// Check a property bag against the declarations of this type.
    ///
    /// Undeclared property ids are a `ConstraintViolation`; a multi-valued
    /// slot on a single-valued declaration (or vice versa) and value-family
    /// mismatches are `InvalidArgument`.
    pub fn validate_properties(
        &self,
        properties: &HashMap<String, PropertyValue>,
    ) -> RepoResult<()> {
        for (id, value) in properties {
            let Some(def) = self.property_definitions.get(id) else {
                return Err(RepositoryError::ConstraintViolation(format!(
                    "property '{id}' is not declared on type '{}'",
                    self.id
                )));
            };

            match (value, def.cardinality) {
                (PropertyValue::Multi(_), Cardinality::Single) => {
                    return Err(RepositoryError::InvalidArgument(format!(
                        "property '{id}' is single-valued on type '{}'",
                        self.id
                    )));
                }
                (PropertyValue::Single(_), Cardinality::Multi) => {
                    return Err(RepositoryError::InvalidArgument(format!(
                        "property '{id}' is multi-valued on type '{}'",
                        self.id
                    )));
                }
                _ => {}
            }

            let values: Vec<_> = match value {
                PropertyValue::Single(v) => vec![v],
                PropertyValue::Multi(vs) => vs.iter().collect(),
            };
            for v in values {
                if v.property_type() != def.property_type {
                    return Err(RepositoryError::InvalidArgument(format!(
                        "property '{id}' expects {} values, got {}",
                        def.property_type,
                        v.property_type()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Resolves a type id to its definition.
///
/// The store and the query evaluator only ever walk upward: from a type to
/// its parent, until a sought ancestor is found or the chain ends.
pub trait TypeManager: Send + Sync {
    /// The definition for `type_id`, or `None` for unknown types.
    fn type_definition(&self, type_id: &str) -> Option<TypeDefinition>;

    /// Walk the parent chain from `type_id` looking for `ancestor_id`.
    ///
    /// The walk is inclusive: a type is a subtype of itself. Bounded so a
    /// registry corrupted into a parent cycle cannot loop forever.
    fn is_subtype_of(&self, type_id: &str, ancestor_id: &str) -> bool {
        let mut current = Some(type_id.to_string());
        let mut hops = 0usize;
        while let Some(id) = current {
            if id == ancestor_id {
                return true;
            }
            hops += 1;
            if hops > 64 {
                return false;
            }
            current = self.type_definition(&id).and_then(|d| d.parent_id);
        }
        false
    }
}

/// The system properties every type carries.
fn system_property_definitions() -> Vec<PropertyDefinition> {
    vec![
        PropertyDefinition::single(PROP_NAME, PropertyType::String),
        PropertyDefinition::single(PROP_OBJECT_ID, PropertyType::Id),
        PropertyDefinition::single(PROP_OBJECT_TYPE_ID, PropertyType::Id),
        PropertyDefinition::single(PROP_CREATED_BY, PropertyType::String),
        PropertyDefinition::single(PROP_CREATION_DATE, PropertyType::DateTime),
        PropertyDefinition::single(PROP_LAST_MODIFIED_BY, PropertyType::String),
        PropertyDefinition::single(PROP_LAST_MODIFICATION_DATE, PropertyType::DateTime),
        PropertyDefinition::single(PROP_CHANGE_TOKEN, PropertyType::String),
    ]
}

/// In-memory, `HashMap`-based type manager.
///
/// Registration validates the parent link and rejects duplicate ids.
/// Lookups clone; definitions are small.
#[derive(Debug)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, TypeDefinition>>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-loaded with the CMIS base types and their system
    /// properties.
    pub fn with_base_types() -> Self {
        let registry = Self::new();
        for base in [BASE_TYPE_FOLDER, BASE_TYPE_DOCUMENT, BASE_TYPE_RELATIONSHIP] {
            let mut def = TypeDefinition::new(base, None);
            for prop in system_property_definitions() {
                def = def.with_property(prop);
            }
            registry
                .register(def)
                .expect("base type registration cannot collide in a fresh registry");
        }
        registry
    }

    /// Register a type definition.
    ///
    /// The parent type, if named, must already be registered (its property
    /// definitions are inherited); duplicate ids are rejected.
    pub fn register(&self, mut definition: TypeDefinition) -> RepoResult<()> {
        let mut types = self.types.write().expect("lock poisoned");

        if types.contains_key(&definition.id) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "type '{}' is already registered",
                definition.id
            )));
        }

        if let Some(parent_id) = &definition.parent_id {
            let Some(parent) = types.get(parent_id) else {
                return Err(RepositoryError::NotFound(format!(
                    "parent type '{parent_id}' of '{}'",
                    definition.id
                )));
            };
            for (id, def) in &parent.property_definitions {
                definition
                    .property_definitions
                    .entry(id.clone())
                    .or_insert_with(|| def.clone());
            }
        }

        types.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.read().expect("lock poisoned").is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_base_types()
    }
}

impl TypeManager for TypeRegistry {
    fn type_definition(&self, type_id: &str) -> Option<TypeDefinition> {
        self.types
            .read()
            .expect("lock poisoned")
            .get(type_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypedValue;

    #[test]
    fn base_registry_knows_the_three_base_types() {
        let registry = TypeRegistry::with_base_types();
        assert_eq!(registry.len(), 3);
        assert!(registry.type_definition(BASE_TYPE_FOLDER).is_some());
        assert!(registry.type_definition(BASE_TYPE_DOCUMENT).is_some());
        assert!(registry.type_definition(BASE_TYPE_RELATIONSHIP).is_some());
        assert!(registry.type_definition("cmis:nope").is_none());
    }

    #[test]
    fn subtype_chain_resolves_transitively() {
        let registry = TypeRegistry::with_base_types();
        registry
            .register(TypeDefinition::new("invoice", Some(BASE_TYPE_DOCUMENT)))
            .unwrap();
        registry
            .register(TypeDefinition::new("paid-invoice", Some("invoice")))
            .unwrap();

        assert!(registry.is_subtype_of("paid-invoice", BASE_TYPE_DOCUMENT));
        assert!(registry.is_subtype_of("paid-invoice", "invoice"));
        assert!(registry.is_subtype_of("invoice", "invoice"));
        assert!(!registry.is_subtype_of("invoice", BASE_TYPE_FOLDER));
        assert!(!registry.is_subtype_of(BASE_TYPE_DOCUMENT, "invoice"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = TypeRegistry::with_base_types();
        let err = registry
            .register(TypeDefinition::new(BASE_TYPE_DOCUMENT, None))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation(_)));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let registry = TypeRegistry::new();
        let err = registry
            .register(TypeDefinition::new("orphan", Some("missing")))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[test]
    fn subtypes_inherit_parent_properties() {
        let registry = TypeRegistry::with_base_types();
        registry
            .register(
                TypeDefinition::new("invoice", Some(BASE_TYPE_DOCUMENT)).with_property(
                    PropertyDefinition::single("invoice:total", PropertyType::Decimal),
                ),
            )
            .unwrap();

        let def = registry.type_definition("invoice").unwrap();
        assert!(def.property_definitions.contains_key("invoice:total"));
        assert!(def.property_definitions.contains_key(PROP_NAME));
    }

    #[test]
    fn validate_rejects_undeclared_property() {
        let def = TypeDefinition::new("bare", None);
        let mut props = HashMap::new();
        props.insert(
            "custom:field".to_string(),
            TypedValue::String("x".into()).into(),
        );
        let err = def.validate_properties(&props).unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation(_)));
    }

    #[test]
    fn validate_rejects_cardinality_mismatch() {
        let def = TypeDefinition::new("t", None).with_property(PropertyDefinition::single(
            "t:one",
            PropertyType::Integer,
        ));
        let mut props = HashMap::new();
        props.insert(
            "t:one".to_string(),
            PropertyValue::Multi(vec![TypedValue::Integer(1)]),
        );
        let err = def.validate_properties(&props).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidArgument(_)));
    }

    #[test]
    fn validate_rejects_family_mismatch() {
        let def = TypeDefinition::new("t", None).with_property(PropertyDefinition::single(
            "t:when",
            PropertyType::DateTime,
        ));
        let mut props = HashMap::new();
        props.insert(
            "t:when".to_string(),
            TypedValue::String("not a date".into()).into(),
        );
        let err = def.validate_properties(&props).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidArgument(_)));
    }

    #[test]
    fn validate_accepts_a_conforming_bag() {
        let def = TypeDefinition::new("t", None)
            .with_property(PropertyDefinition::single("t:count", PropertyType::Integer))
            .with_property(PropertyDefinition::multi("t:tags", PropertyType::String));

        let mut props = HashMap::new();
        props.insert("t:count".to_string(), TypedValue::Integer(7).into());
        props.insert(
            "t:tags".to_string(),
            PropertyValue::Multi(vec![
                TypedValue::String("a".into()),
                TypedValue::String("b".into()),
            ]),
        );
        def.validate_properties(&props).unwrap();
    }
}
