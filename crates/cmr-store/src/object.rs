//! The stored-object model.
//!
//! Every record in the repository is a [`StoredObject`]: an [`ObjectCore`]
//! with the fields common to all kinds, plus an [`ObjectKind`] payload
//! carrying only what that kind needs. Capabilities (filing,
//! multi-filing, children, versioning) are questions answered per kind
//! rather than an inheritance chain.
//!
//! Objects are created transient (`id` is `None`) by the store's factory
//! calls; `persist()` assigns the id and creation metadata and makes the
//! object visible to lookups. Every mutation afterwards goes through the
//! store and bumps the modification stamp and change token.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cmr_types::{
    Acl, ObjectId, PropertyValue, TypedValue, PROP_CHANGE_TOKEN, PROP_CREATED_BY,
    PROP_CREATION_DATE, PROP_LAST_MODIFICATION_DATE, PROP_LAST_MODIFIED_BY, PROP_NAME,
    PROP_OBJECT_ID, PROP_OBJECT_TYPE_ID,
};

use crate::content::ContentStream;
use crate::filing::ParentRef;
use crate::versioning::VersionSeriesData;

/// Fields every stored object carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectCore {
    /// `None` while transient; assigned exactly once by `persist()`.
    pub id: Option<ObjectId>,
    pub name: String,
    pub type_id: String,
    pub repository_id: String,
    /// Non-system properties, by property id.
    pub properties: HashMap<String, PropertyValue>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
    /// Opaque token, regenerated on every mutation.
    pub change_token: String,
    pub acl: Acl,
}

impl ObjectCore {
    /// A transient core. Stamps are provisional until `persist()`.
    pub(crate) fn transient(
        name: impl Into<String>,
        type_id: impl Into<String>,
        repository_id: impl Into<String>,
        user: &str,
        acl: Acl,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: name.into(),
            type_id: type_id.into(),
            repository_id: repository_id.into(),
            properties: HashMap::new(),
            created_by: user.to_string(),
            created_at: now,
            modified_by: user.to_string(),
            modified_at: now,
            change_token: new_change_token(),
            acl,
        }
    }

    /// Record a mutation: bump the modification stamp and regenerate the
    /// change token.
    pub(crate) fn touch(&mut self, user: &str) {
        self.modified_by = user.to_string();
        self.modified_at = Utc::now();
        self.change_token = new_change_token();
    }
}

/// A fresh opaque change token.
pub(crate) fn new_change_token() -> String {
    Uuid::now_v7().to_string()
}

/// Kind payload of a folder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FolderData {
    /// The containing folder; `None` only for the root.
    pub parent: Option<ObjectId>,
    /// Direct children, in insertion order.
    pub children: Vec<ObjectId>,
}

/// Kind payload of an unversioned document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    /// Parent folders; empty means unfiled.
    pub parents: Vec<ParentRef>,
    pub content: Option<ContentStream>,
}

/// Kind payload of a relationship.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipData {
    pub source: ObjectId,
    pub target: ObjectId,
}

/// The per-kind payload of a stored object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObjectKind {
    Folder(FolderData),
    Document(DocumentData),
    VersionSeries(VersionSeriesData),
    Relationship(RelationshipData),
}

/// One record in the repository: common core plus kind payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub core: ObjectCore,
    pub kind: ObjectKind,
}

impl StoredObject {
    /// The assigned id, if persisted.
    pub fn id(&self) -> Option<&ObjectId> {
        self.core.id.as_ref()
    }

    /// The object name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The object type id.
    pub fn type_id(&self) -> &str {
        &self.core.type_id
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ObjectKind::Folder(_))
    }

    pub fn is_document(&self) -> bool {
        matches!(self.kind, ObjectKind::Document(_))
    }

    pub fn is_version_series(&self) -> bool {
        matches!(self.kind, ObjectKind::VersionSeries(_))
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self.kind, ObjectKind::Relationship(_))
    }

    /// The folder payload, if this is a folder.
    pub fn as_folder(&self) -> Option<&FolderData> {
        match &self.kind {
            ObjectKind::Folder(data) => Some(data),
            _ => None,
        }
    }

    /// The document payload, if this is an unversioned document.
    pub fn as_document(&self) -> Option<&DocumentData> {
        match &self.kind {
            ObjectKind::Document(data) => Some(data),
            _ => None,
        }
    }

    /// The series payload, if this is a versioned document.
    pub fn as_version_series(&self) -> Option<&VersionSeriesData> {
        match &self.kind {
            ObjectKind::VersionSeries(data) => Some(data),
            _ => None,
        }
    }

    /// The relationship payload, if this is a relationship.
    pub fn as_relationship(&self) -> Option<&RelationshipData> {
        match &self.kind {
            ObjectKind::Relationship(data) => Some(data),
            _ => None,
        }
    }

    /// Whether this object participates in the filing graph at all.
    pub fn supports_filing(&self) -> bool {
        !self.is_relationship()
    }

    /// Whether this object may be filed under several parents at once.
    pub fn supports_multi_filing(&self) -> bool {
        self.is_document() || self.is_version_series()
    }

    /// The filing relations of this object. A folder yields at most one
    /// (its name under its parent); documents and series yield one per
    /// parent; relationships yield none.
    pub fn parent_refs(&self) -> Vec<ParentRef> {
        match &self.kind {
            ObjectKind::Folder(data) => data
                .parent
                .iter()
                .map(|p| ParentRef::new(p.clone(), self.core.name.clone()))
                .collect(),
            ObjectKind::Document(data) => data.parents.clone(),
            ObjectKind::VersionSeries(data) => data.parents.clone(),
            ObjectKind::Relationship(_) => Vec::new(),
        }
    }

    /// The name this object carries under `folder_id`, if filed there.
    pub fn segment_under(&self, folder_id: &ObjectId) -> Option<String> {
        self.parent_refs()
            .into_iter()
            .find(|r| &r.folder_id == folder_id)
            .map(|r| r.segment)
    }

    /// Resolve a property id to its value.
    ///
    /// System property ids resolve from the core fields; everything else
    /// comes from the property map. Absent means NULL.
    pub fn property(&self, property_id: &str) -> Option<PropertyValue> {
        match property_id {
            PROP_NAME => Some(TypedValue::String(self.core.name.clone()).into()),
            PROP_OBJECT_ID => self
                .core
                .id
                .as_ref()
                .map(|id| TypedValue::Id(id.to_string()).into()),
            PROP_OBJECT_TYPE_ID => Some(TypedValue::Id(self.core.type_id.clone()).into()),
            PROP_CREATED_BY => Some(TypedValue::String(self.core.created_by.clone()).into()),
            PROP_CREATION_DATE => Some(TypedValue::DateTime(self.core.created_at).into()),
            PROP_LAST_MODIFIED_BY => {
                Some(TypedValue::String(self.core.modified_by.clone()).into())
            }
            PROP_LAST_MODIFICATION_DATE => {
                Some(TypedValue::DateTime(self.core.modified_at).into())
            }
            PROP_CHANGE_TOKEN => Some(TypedValue::String(self.core.change_token.clone()).into()),
            _ => self.core.properties.get(property_id).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(name: &str, parent: Option<ObjectId>) -> StoredObject {
        StoredObject {
            core: ObjectCore::transient(name, "cmis:folder", "repo", "alice", Acl::new()),
            kind: ObjectKind::Folder(FolderData {
                parent,
                children: Vec::new(),
            }),
        }
    }

    fn document(name: &str, parents: Vec<ParentRef>) -> StoredObject {
        StoredObject {
            core: ObjectCore::transient(name, "cmis:document", "repo", "alice", Acl::new()),
            kind: ObjectKind::Document(DocumentData {
                parents,
                content: None,
            }),
        }
    }

    #[test]
    fn kind_predicates() {
        let f = folder("stuff", None);
        assert!(f.is_folder());
        assert!(f.supports_filing());
        assert!(!f.supports_multi_filing());
        assert!(f.as_folder().is_some());
        assert!(f.as_document().is_none());

        let d = document("a.txt", Vec::new());
        assert!(d.is_document());
        assert!(d.supports_multi_filing());
    }

    #[test]
    fn folder_parent_ref_uses_its_own_name() {
        let parent_id = ObjectId::generate();
        let f = folder("reports", Some(parent_id.clone()));
        let refs = f.parent_refs();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].folder_id, parent_id);
        assert_eq!(refs[0].segment, "reports");
    }

    #[test]
    fn document_segments_differ_per_parent() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        let d = document(
            "draft.txt",
            vec![
                ParentRef::new(a.clone(), "draft.txt"),
                ParentRef::new(b.clone(), "final.txt"),
            ],
        );
        assert_eq!(d.segment_under(&a).as_deref(), Some("draft.txt"));
        assert_eq!(d.segment_under(&b).as_deref(), Some("final.txt"));
        assert!(d.segment_under(&ObjectId::generate()).is_none());
    }

    #[test]
    fn system_properties_resolve_from_core() {
        let mut d = document("a.txt", Vec::new());
        d.core.id = Some(ObjectId::new("obj-1"));

        assert_eq!(
            d.property(PROP_NAME),
            Some(TypedValue::String("a.txt".into()).into())
        );
        assert_eq!(
            d.property(PROP_OBJECT_ID),
            Some(TypedValue::Id("obj-1".into()).into())
        );
        assert_eq!(
            d.property(PROP_OBJECT_TYPE_ID),
            Some(TypedValue::Id("cmis:document".into()).into())
        );
        assert!(d.property(PROP_CREATION_DATE).is_some());
    }

    #[test]
    fn transient_object_has_no_object_id_property() {
        let d = document("a.txt", Vec::new());
        assert!(d.property(PROP_OBJECT_ID).is_none());
    }

    #[test]
    fn custom_properties_come_from_the_map() {
        let mut d = document("a.txt", Vec::new());
        d.core.properties.insert(
            "doc:rating".to_string(),
            TypedValue::Integer(5).into(),
        );
        assert_eq!(
            d.property("doc:rating"),
            Some(TypedValue::Integer(5).into())
        );
        assert!(d.property("doc:missing").is_none());
    }

    #[test]
    fn touch_regenerates_the_change_token() {
        let mut d = document("a.txt", Vec::new());
        let before = d.core.change_token.clone();
        d.core.touch("bob");
        assert_ne!(d.core.change_token, before);
        assert_eq!(d.core.modified_by, "bob");
    }
}
