//! The repository-wide object store.
//!
//! [`ObjectStore`] owns every stored object of one repository behind a
//! single `RwLock`: lookups and query snapshots take the shared lock,
//! mutations the exclusive lock, so an in-flight tree traversal never
//! observes a half-applied mutation. All calls run to completion
//! synchronously on the caller's thread.
//!
//! # Invariants
//!
//! - Object ids are unique within the repository and never reused.
//! - A folder's direct children have pairwise-distinct names.
//! - A version series has zero or one private working copy.
//! - Deleting the sole remaining version of a series deletes the series.
//! - The filing graph is acyclic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use tracing::debug;

use cmr_types::{
    Ace, Acl, AclPropagation, ObjectId, OrderBy, PropertyValue, RepoResult, RepositoryError,
    TypedValue, BASE_TYPE_DOCUMENT, BASE_TYPE_FOLDER, BASE_TYPE_RELATIONSHIP, PROP_NAME,
    compare_for_order,
};

use crate::content::ContentStream;
use crate::filing::{split_path, validate_segment, ParentRef};
use crate::object::{
    DocumentData, FolderData, ObjectCore, ObjectKind, RelationshipData, StoredObject,
};
use crate::versioning::{DocumentVersion, VersionSeriesData, VersioningState};

/// One entry of the checked-out-documents listing: the private working
/// copy, plus the relationships touching its series when requested.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckedOutDocument {
    pub document: StoredObject,
    pub relationships: Vec<StoredObject>,
}

#[derive(Default)]
struct StoreState {
    /// Top-level objects (folders, documents, series, relationships).
    objects: HashMap<ObjectId, StoredObject>,
    /// Version id (including PWC ids) → owning series id.
    version_index: HashMap<ObjectId, ObjectId>,
}

/// The authoritative object collection of one repository.
pub struct ObjectStore {
    repository_id: String,
    root_id: ObjectId,
    inner: RwLock<StoreState>,
}

impl ObjectStore {
    /// Create a store for `repository_id` with a fresh root folder.
    pub fn new(repository_id: impl Into<String>) -> Self {
        let repository_id = repository_id.into();
        let root_id = ObjectId::generate();
        let mut state = StoreState::default();
        state
            .objects
            .insert(root_id.clone(), Self::root_object(&repository_id, &root_id));
        Self {
            repository_id,
            root_id,
            inner: RwLock::new(state),
        }
    }

    fn root_object(repository_id: &str, root_id: &ObjectId) -> StoredObject {
        let mut core = ObjectCore::transient("", BASE_TYPE_FOLDER, repository_id, "system", Acl::new());
        core.id = Some(root_id.clone());
        StoredObject {
            core,
            kind: ObjectKind::Folder(FolderData {
                parent: None,
                children: Vec::new(),
            }),
        }
    }

    /// The repository this store belongs to.
    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    /// Id of the root folder.
    pub fn root_id(&self) -> &ObjectId {
        &self.root_id
    }

    /// The root folder object.
    pub fn root_folder(&self) -> StoredObject {
        self.get_object_by_id(&self.root_id)
            .expect("root folder always exists")
    }

    /// Number of top-level objects (the root folder included).
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").objects.len()
    }

    /// Returns `true` if only the root folder exists.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Remove every object and re-create the root folder under its
    /// original id.
    pub fn clear(&self) {
        let mut state = self.inner.write().expect("lock poisoned");
        state.objects.clear();
        state.version_index.clear();
        state.objects.insert(
            self.root_id.clone(),
            Self::root_object(&self.repository_id, &self.root_id),
        );
        debug!(repository = %self.repository_id, "store cleared");
    }

    // -----------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------

    /// Look up an object by id. Version ids resolve to a document-shaped
    /// view of that snapshot.
    pub fn get_object_by_id(&self, id: &ObjectId) -> RepoResult<StoredObject> {
        let state = self.inner.read().expect("lock poisoned");
        if let Some(obj) = state.objects.get(id) {
            return Ok(obj.clone());
        }
        if let Some(series_id) = state.version_index.get(id) {
            if let Some(series) = state.objects.get(series_id) {
                if let ObjectKind::VersionSeries(data) = &series.kind {
                    if let Some(version) = data.version(id) {
                        return Ok(Self::version_view(series, data, version));
                    }
                }
            }
        }
        Err(RepositoryError::NotFound(format!("object '{id}'")))
    }

    /// Resolve an absolute path to an object, walking the folder chain
    /// segment by segment. The leaf must be visible to `user`.
    pub fn get_object_by_path(&self, path: &str, user: &str) -> RepoResult<StoredObject> {
        let segments = split_path(path)?;
        let state = self.inner.read().expect("lock poisoned");

        let mut current_id = self.root_id.clone();
        for segment in segments {
            let folder_obj = state
                .objects
                .get(&current_id)
                .ok_or_else(|| RepositoryError::NotFound(format!("path '{path}'")))?;
            let ObjectKind::Folder(folder) = &folder_obj.kind else {
                return Err(RepositoryError::NotFound(format!("path '{path}'")));
            };
            let next = folder
                .children
                .iter()
                .find(|child_id| {
                    state
                        .objects
                        .get(child_id)
                        .and_then(|child| child.segment_under(&current_id))
                        .as_deref()
                        == Some(segment)
                })
                .cloned()
                .ok_or_else(|| RepositoryError::NotFound(format!("path '{path}'")))?;
            current_id = next;
        }

        let object = state
            .objects
            .get(&current_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("path '{path}'")))?;
        if !object.core.acl.is_visible_to(user) {
            return Err(RepositoryError::NotFound(format!("path '{path}'")));
        }
        Ok(object.clone())
    }

    /// Direct children of a folder, in filing order.
    pub fn children(&self, folder_id: &ObjectId) -> RepoResult<Vec<StoredObject>> {
        let state = self.inner.read().expect("lock poisoned");
        let folder = Self::require_folder(&state, folder_id)?;
        Ok(folder
            .children
            .iter()
            .filter_map(|id| state.objects.get(id).cloned())
            .collect())
    }

    /// The parent folders of an object.
    pub fn parents_of(&self, id: &ObjectId) -> RepoResult<Vec<StoredObject>> {
        let state = self.inner.read().expect("lock poisoned");
        let object = Self::require(&state, id)?;
        Ok(object
            .parent_refs()
            .iter()
            .filter_map(|r| state.objects.get(&r.folder_id).cloned())
            .collect())
    }

    /// The absolute path of an object, following its first parent chain.
    pub fn path_of(&self, id: &ObjectId) -> RepoResult<String> {
        let state = self.inner.read().expect("lock poisoned");
        if id == &self.root_id {
            return Ok("/".to_string());
        }

        let mut segments = Vec::new();
        let mut visited = HashSet::new();
        let mut current_id = id.clone();
        while current_id != self.root_id {
            if !visited.insert(current_id.clone()) {
                return Err(RepositoryError::ConstraintViolation(format!(
                    "filing cycle detected while resolving the path of '{id}'"
                )));
            }
            let object = Self::require(&state, &current_id)?;
            let first = object.parent_refs().into_iter().next().ok_or_else(|| {
                RepositoryError::NotFound(format!("object '{current_id}' has no folder path"))
            })?;
            segments.push(first.segment);
            current_id = first.folder_id;
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    /// All relationships whose source or target is `id`.
    pub fn relationships_of(&self, id: &ObjectId) -> RepoResult<Vec<StoredObject>> {
        let state = self.inner.read().expect("lock poisoned");
        Self::require(&state, id)?;
        Ok(Self::relationships_in(&state, id))
    }

    /// The ACL of an object.
    pub fn get_acl(&self, id: &ObjectId) -> RepoResult<Acl> {
        Ok(self.get_object_by_id(id)?.core.acl)
    }

    /// Returns `true` iff any stored object currently has type `type_id`.
    pub fn is_type_in_use(&self, type_id: &str) -> bool {
        let state = self.inner.read().expect("lock poisoned");
        state.objects.values().any(|o| o.core.type_id == type_id)
    }

    /// A consistent copy of the object collection for lock-free
    /// traversal (query evaluation).
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.inner.read().expect("lock poisoned");
        StoreSnapshot {
            root_id: self.root_id.clone(),
            objects: state.objects.clone(),
        }
    }

    // -----------------------------------------------------------------
    // Factories (transient objects) and persist
    // -----------------------------------------------------------------

    /// A transient folder under `parent`.
    pub fn create_folder(
        &self,
        name: &str,
        type_id: Option<&str>,
        properties: HashMap<String, PropertyValue>,
        user: &str,
        parent: &ObjectId,
        add_aces: &[Ace],
        remove_aces: &[Ace],
    ) -> RepoResult<StoredObject> {
        validate_segment(name)?;
        let state = self.inner.read().expect("lock poisoned");
        Self::require_folder(&state, parent)?;

        let mut core = ObjectCore::transient(
            name,
            type_id.unwrap_or(BASE_TYPE_FOLDER),
            &self.repository_id,
            user,
            Acl::new().merged(add_aces, remove_aces),
        );
        core.properties = properties;
        Ok(StoredObject {
            core,
            kind: ObjectKind::Folder(FolderData {
                parent: Some(parent.clone()),
                children: Vec::new(),
            }),
        })
    }

    /// A transient unversioned document, filed under `parent` when given.
    pub fn create_document(
        &self,
        name: &str,
        type_id: Option<&str>,
        properties: HashMap<String, PropertyValue>,
        user: &str,
        parent: Option<&ObjectId>,
        content: Option<ContentStream>,
        add_aces: &[Ace],
        remove_aces: &[Ace],
    ) -> RepoResult<StoredObject> {
        validate_segment(name)?;
        let state = self.inner.read().expect("lock poisoned");
        let parents = match parent {
            Some(folder_id) => {
                Self::require_folder(&state, folder_id)?;
                vec![ParentRef::new(folder_id.clone(), name)]
            }
            None => Vec::new(),
        };

        let mut core = ObjectCore::transient(
            name,
            type_id.unwrap_or(BASE_TYPE_DOCUMENT),
            &self.repository_id,
            user,
            Acl::new().merged(add_aces, remove_aces),
        );
        core.properties = properties;
        Ok(StoredObject {
            core,
            kind: ObjectKind::Document(DocumentData { parents, content }),
        })
    }

    /// A transient versioned document. `versioning_state` decides whether
    /// the series starts with a persisted version or an immediate PWC.
    #[allow(clippy::too_many_arguments)]
    pub fn create_versioned_document(
        &self,
        name: &str,
        type_id: Option<&str>,
        properties: HashMap<String, PropertyValue>,
        user: &str,
        parent: Option<&ObjectId>,
        content: Option<ContentStream>,
        versioning_state: VersioningState,
        add_aces: &[Ace],
        remove_aces: &[Ace],
    ) -> RepoResult<StoredObject> {
        validate_segment(name)?;
        let state = self.inner.read().expect("lock poisoned");
        let parents = match parent {
            Some(folder_id) => {
                Self::require_folder(&state, folder_id)?;
                vec![ParentRef::new(folder_id.clone(), name)]
            }
            None => Vec::new(),
        };

        let mut core = ObjectCore::transient(
            name,
            type_id.unwrap_or(BASE_TYPE_DOCUMENT),
            &self.repository_id,
            user,
            Acl::new().merged(add_aces, remove_aces),
        );
        core.properties = properties.clone();

        let mut data = VersionSeriesData::new(parents);
        match versioning_state {
            VersioningState::Major => {
                data.versions
                    .push(DocumentVersion::new(true, "1.0", properties, content, user));
            }
            VersioningState::Minor => {
                data.versions
                    .push(DocumentVersion::new(false, "0.1", properties, content, user));
            }
            VersioningState::CheckedOut => {
                data.pwc = Some(DocumentVersion::new(false, "", properties, content, user));
                data.checked_out_by = Some(user.to_string());
            }
        }
        Ok(StoredObject {
            core,
            kind: ObjectKind::VersionSeries(data),
        })
    }

    /// A transient relationship between two existing objects.
    pub fn create_relationship(
        &self,
        name: &str,
        type_id: Option<&str>,
        properties: HashMap<String, PropertyValue>,
        user: &str,
        source: &ObjectId,
        target: &ObjectId,
        add_aces: &[Ace],
        remove_aces: &[Ace],
    ) -> RepoResult<StoredObject> {
        let state = self.inner.read().expect("lock poisoned");
        Self::require(&state, source)?;
        Self::require(&state, target)?;

        let mut core = ObjectCore::transient(
            name,
            type_id.unwrap_or(BASE_TYPE_RELATIONSHIP),
            &self.repository_id,
            user,
            Acl::new().merged(add_aces, remove_aces),
        );
        core.properties = properties;
        Ok(StoredObject {
            core,
            kind: ObjectKind::Relationship(RelationshipData {
                source: source.clone(),
                target: target.clone(),
            }),
        })
    }

    /// Persist a transient object: assign its id and creation metadata,
    /// link it into its parent folders, and make it visible to lookups.
    ///
    /// Persisting an already-persisted object is an error; ids are
    /// assigned exactly once.
    pub fn persist(&self, mut object: StoredObject) -> RepoResult<ObjectId> {
        if object.core.id.is_some() {
            return Err(RepositoryError::InvalidArgument(
                "object is already persisted".to_string(),
            ));
        }
        if object.core.repository_id != self.repository_id {
            return Err(RepositoryError::InvalidArgument(format!(
                "object belongs to repository '{}', not '{}'",
                object.core.repository_id, self.repository_id
            )));
        }

        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;

        // Re-validate filing before linking: parents must still exist and
        // the name must stay unique among each parent's children.
        let parent_refs = object.parent_refs();
        if object.is_folder() && parent_refs.is_empty() {
            return Err(RepositoryError::InvalidArgument(
                "a folder must be created under a parent folder".to_string(),
            ));
        }
        for parent_ref in &parent_refs {
            Self::require_folder(state, &parent_ref.folder_id)?;
            if Self::name_in_use(state, &parent_ref.folder_id, &parent_ref.segment, None) {
                return Err(RepositoryError::ConstraintViolation(format!(
                    "name '{}' is already used by a sibling",
                    parent_ref.segment
                )));
            }
        }
        if let ObjectKind::Relationship(rel) = &object.kind {
            Self::require(state, &rel.source)?;
            Self::require(state, &rel.target)?;
        }

        let id = ObjectId::generate();
        let creator = object.core.created_by.clone();
        object.core.id = Some(id.clone());
        object.core.touch(&creator);
        object.core.created_at = object.core.modified_at;

        if let ObjectKind::VersionSeries(data) = &object.kind {
            for version in data.all_versions() {
                state.version_index.insert(version.id.clone(), id.clone());
            }
        }
        for parent_ref in &parent_refs {
            if let Some(folder) = Self::folder_data_mut(state, &parent_ref.folder_id) {
                folder.children.push(id.clone());
            }
        }

        debug!(id = %id, name = %object.core.name, type_id = %object.core.type_id, "object persisted");
        state.objects.insert(id.clone(), object);
        Ok(id)
    }

    // -----------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------

    /// Apply a property delta. A supplied `change_token` must match the
    /// stored one; a `cmis:name` entry renames the object.
    pub fn update_properties(
        &self,
        id: &ObjectId,
        properties: HashMap<String, PropertyValue>,
        change_token: Option<&str>,
        user: &str,
    ) -> RepoResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;

        if !state.objects.contains_key(id) && state.version_index.contains_key(id) {
            return Err(RepositoryError::InvalidArgument(
                "versions are modified through check-out and check-in".to_string(),
            ));
        }

        let current_token = Self::require(state, id)?.core.change_token.clone();
        if let Some(token) = change_token {
            if token != current_token {
                return Err(RepositoryError::Conflict(format!(
                    "change token mismatch on object '{id}'"
                )));
            }
        }

        let mut new_name = None;
        for (property_id, value) in &properties {
            if property_id == PROP_NAME {
                let Some(TypedValue::String(name)) = value.single() else {
                    return Err(RepositoryError::InvalidArgument(
                        "cmis:name must be a single string value".to_string(),
                    ));
                };
                new_name = Some(name.clone());
            } else if property_id.starts_with("cmis:") {
                return Err(RepositoryError::InvalidArgument(format!(
                    "property '{property_id}' is read-only"
                )));
            }
        }

        if let Some(name) = &new_name {
            Self::rename_in_state(state, id, name)?;
        }

        let object = Self::require_mut(state, id)?;
        for (property_id, value) in properties {
            if property_id != PROP_NAME {
                object.core.properties.insert(property_id, value);
            }
        }
        object.core.touch(user);
        Ok(())
    }

    /// Rename an object, re-checking sibling uniqueness under every
    /// parent.
    pub fn rename(&self, id: &ObjectId, new_name: &str, user: &str) -> RepoResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        Self::rename_in_state(&mut state, id, new_name)?;
        Self::require_mut(&mut state, id)?.core.touch(user);
        Ok(())
    }

    /// Move an object from one folder to another. Atomic from the
    /// caller's perspective: validation happens before any link changes.
    pub fn move_object(
        &self,
        id: &ObjectId,
        from: &ObjectId,
        to: &ObjectId,
        user: &str,
    ) -> RepoResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;

        let object = Self::require(state, id)?;
        if !object.supports_filing() {
            return Err(RepositoryError::InvalidArgument(format!(
                "object '{id}' cannot be filed"
            )));
        }
        let segment = object.segment_under(from).ok_or_else(|| {
            RepositoryError::InvalidArgument(format!(
                "object '{id}' is not filed in folder '{from}'"
            ))
        })?;
        let is_folder = object.is_folder();

        Self::require_folder(state, to)?;
        if is_folder && (to == id || Self::is_descendant_of(state, to, id)) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "moving '{id}' under '{to}' would make a folder its own ancestor"
            )));
        }
        if Self::name_in_use(state, to, &segment, Some(id)) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "name '{segment}' is already used by a sibling in the target folder"
            )));
        }

        if let Some(folder) = Self::folder_data_mut(state, from) {
            folder.children.retain(|c| c != id);
        }
        if let Some(folder) = Self::folder_data_mut(state, to) {
            folder.children.push(id.clone());
        }
        let object = Self::require_mut(state, id)?;
        match &mut object.kind {
            ObjectKind::Folder(data) => data.parent = Some(to.clone()),
            ObjectKind::Document(data) => Self::repoint_parent(&mut data.parents, from, to),
            ObjectKind::VersionSeries(data) => Self::repoint_parent(&mut data.parents, from, to),
            ObjectKind::Relationship(_) => unreachable!("filing was checked above"),
        }
        object.core.touch(user);
        debug!(id = %id, from = %from, to = %to, "object moved");
        Ok(())
    }

    /// File a document under an additional parent folder (multi-filing).
    pub fn add_parent(&self, id: &ObjectId, folder_id: &ObjectId, user: &str) -> RepoResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;

        let object = Self::require(state, id)?;
        if !object.supports_multi_filing() {
            return Err(RepositoryError::InvalidArgument(format!(
                "object '{id}' does not support multi-filing"
            )));
        }
        let name = object.core.name.clone();
        if object.segment_under(folder_id).is_some() {
            return Err(RepositoryError::InvalidArgument(format!(
                "object '{id}' is already filed in folder '{folder_id}'"
            )));
        }
        Self::require_folder(state, folder_id)?;
        if Self::name_in_use(state, folder_id, &name, None) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "name '{name}' is already used by a sibling"
            )));
        }

        if let Some(folder) = Self::folder_data_mut(state, folder_id) {
            folder.children.push(id.clone());
        }
        let object = Self::require_mut(state, id)?;
        match &mut object.kind {
            ObjectKind::Document(data) => {
                data.parents.push(ParentRef::new(folder_id.clone(), name));
            }
            ObjectKind::VersionSeries(data) => {
                data.parents.push(ParentRef::new(folder_id.clone(), name));
            }
            _ => unreachable!("multi-filing was checked above"),
        }
        object.core.touch(user);
        Ok(())
    }

    /// Unfile a document from one of its parent folders. Removing the
    /// last parent leaves the document unfiled.
    pub fn remove_parent(&self, id: &ObjectId, folder_id: &ObjectId, user: &str) -> RepoResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;

        let object = Self::require(state, id)?;
        if !object.supports_multi_filing() {
            return Err(RepositoryError::InvalidArgument(format!(
                "object '{id}' does not support multi-filing"
            )));
        }
        if object.segment_under(folder_id).is_none() {
            return Err(RepositoryError::NotFound(format!(
                "object '{id}' is not filed in folder '{folder_id}'"
            )));
        }

        if let Some(folder) = Self::folder_data_mut(state, folder_id) {
            folder.children.retain(|c| c != id);
        }
        let object = Self::require_mut(state, id)?;
        match &mut object.kind {
            ObjectKind::Document(data) => data.parents.retain(|r| &r.folder_id != folder_id),
            ObjectKind::VersionSeries(data) => {
                data.parents.retain(|r| &r.folder_id != folder_id)
            }
            _ => unreachable!("multi-filing was checked above"),
        }
        object.core.touch(user);
        Ok(())
    }

    /// Delete an object.
    ///
    /// Folders must be empty. For a version id, `all_versions` decides
    /// between deleting the whole series and deleting just that version;
    /// deleting the private working copy cancels the checkout instead.
    pub fn delete_object(&self, id: &ObjectId, all_versions: bool, user: &str) -> RepoResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;

        if let Some(object) = state.objects.get(id) {
            if let ObjectKind::Folder(folder) = &object.kind {
                if id == &self.root_id {
                    return Err(RepositoryError::InvalidArgument(
                        "the root folder cannot be deleted".to_string(),
                    ));
                }
                if !folder.children.is_empty() {
                    return Err(RepositoryError::Conflict(format!(
                        "folder '{id}' is not empty"
                    )));
                }
            }
            Self::remove_object(state, id);
            debug!(id = %id, "object deleted");
            return Ok(());
        }

        let Some(series_id) = state.version_index.get(id).cloned() else {
            return Err(RepositoryError::NotFound(format!("object '{id}'")));
        };

        if all_versions {
            Self::remove_object(state, &series_id);
            debug!(id = %series_id, "version series deleted");
            return Ok(());
        }

        let series = Self::require_mut(state, &series_id)?;
        let ObjectKind::VersionSeries(data) = &mut series.kind else {
            return Err(RepositoryError::NotFound(format!("object '{id}'")));
        };

        let now_empty = if data.pwc.as_ref().is_some_and(|pwc| &pwc.id == id) {
            // Deleting the PWC is a cancel-checkout.
            data.cancel_check_out()?;
            data.versions.is_empty()
        } else {
            data.delete_version(id)?
        };
        state.version_index.remove(id);

        if now_empty {
            Self::remove_object(state, &series_id);
            debug!(id = %series_id, "last version deleted, series removed");
        } else {
            Self::require_mut(state, &series_id)?.core.touch(user);
            debug!(id = %id, series = %series_id, "version deleted");
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // ACL application
    // -----------------------------------------------------------------

    /// Merge ACE deltas into an object's ACL, optionally propagating to
    /// the folder's descendant subtree.
    pub fn apply_acl(
        &self,
        id: &ObjectId,
        add_aces: &[Ace],
        remove_aces: &[Ace],
        propagation: AclPropagation,
        user: &str,
    ) -> RepoResult<Acl> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;
        Self::require(state, id)?;

        let indirect_adds: Vec<Ace> = add_aces
            .iter()
            .map(|a| Ace::propagated(a.principal_id.clone(), a.permissions.clone()))
            .collect();

        for (depth, target_id) in Self::acl_targets(state, id, propagation) {
            let object = Self::require_mut(state, &target_id)?;
            let adds = if depth == 0 {
                add_aces
            } else {
                indirect_adds.as_slice()
            };
            object.core.acl = object.core.acl.merged(adds, remove_aces);
            object.core.touch(user);
        }
        debug!(id = %id, ?propagation, "acl merged");
        Ok(Self::require(state, id)?.core.acl.clone())
    }

    /// Replace an object's ACL wholesale, optionally propagating to the
    /// folder's descendant subtree.
    pub fn set_acl(
        &self,
        id: &ObjectId,
        aces: Vec<Ace>,
        propagation: AclPropagation,
        user: &str,
    ) -> RepoResult<Acl> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;
        Self::require(state, id)?;

        let indirect: Vec<Ace> = aces
            .iter()
            .map(|a| Ace::propagated(a.principal_id.clone(), a.permissions.clone()))
            .collect();

        for (depth, target_id) in Self::acl_targets(state, id, propagation) {
            let object = Self::require_mut(state, &target_id)?;
            let list = if depth == 0 { aces.clone() } else { indirect.clone() };
            object.core.acl = Acl::from_aces(list);
            object.core.touch(user);
        }
        debug!(id = %id, ?propagation, "acl replaced");
        Ok(Self::require(state, id)?.core.acl.clone())
    }

    // -----------------------------------------------------------------
    // Versioning operations
    // -----------------------------------------------------------------

    /// Check out a version series: NONE → CHECKED_OUT. Returns the id of
    /// the new private working copy.
    ///
    /// The PWC starts as a copy of the latest version unless `content`
    /// supplies a replacement stream. A concurrent second checkout is
    /// rejected with Conflict; nothing queues or blocks.
    pub fn check_out(
        &self,
        id: &ObjectId,
        content: Option<ContentStream>,
        user: &str,
    ) -> RepoResult<ObjectId> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;
        let series_id = Self::resolve_series_id(state, id)?;

        let series = Self::require_mut(state, &series_id)?;
        let ObjectKind::VersionSeries(data) = &mut series.kind else {
            return Err(RepositoryError::InvalidArgument(format!(
                "object '{id}' is not a versioned document"
            )));
        };

        let mut pwc = match data.latest_version(false) {
            Some(latest) => {
                let mut copy = DocumentVersion::new(
                    false,
                    "",
                    latest.properties.clone(),
                    latest.content.clone(),
                    user,
                );
                copy.checkin_comment = None;
                copy
            }
            None => DocumentVersion::new(false, "", HashMap::new(), None, user),
        };
        if let Some(stream) = content {
            pwc.content = Some(stream);
        }
        let pwc_id = pwc.id.clone();

        data.check_out(pwc, user)?;
        series.core.touch(user);
        state.version_index.insert(pwc_id.clone(), series_id.clone());
        debug!(series = %series_id, pwc = %pwc_id, user = %user, "checked out");
        Ok(pwc_id)
    }

    /// Discard the private working copy: CHECKED_OUT → NONE.
    ///
    /// If the PWC was the only version the series ever had, the whole
    /// series is removed.
    pub fn cancel_check_out(&self, id: &ObjectId, user: &str) -> RepoResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;
        let series_id = Self::resolve_series_id(state, id)?;

        let (pwc_id, now_empty) = {
            let series = Self::require_mut(state, &series_id)?;
            let ObjectKind::VersionSeries(data) = &mut series.kind else {
                return Err(RepositoryError::InvalidArgument(format!(
                    "object '{id}' is not a versioned document"
                )));
            };
            let pwc = data.cancel_check_out()?;
            let now_empty = data.versions.is_empty();
            if !now_empty {
                series.core.touch(user);
            }
            (pwc.id, now_empty)
        };

        state.version_index.remove(&pwc_id);
        if now_empty {
            Self::remove_object(state, &series_id);
            debug!(series = %series_id, "checkout cancelled, never-versioned series removed");
        } else {
            debug!(series = %series_id, "checkout cancelled");
        }
        Ok(())
    }

    /// Promote the private working copy to the new latest version:
    /// CHECKED_OUT → NONE. Returns the new version's id.
    pub fn check_in(
        &self,
        id: &ObjectId,
        is_major: bool,
        properties: Option<HashMap<String, PropertyValue>>,
        content: Option<ContentStream>,
        comment: Option<&str>,
        user: &str,
    ) -> RepoResult<ObjectId> {
        let mut state = self.inner.write().expect("lock poisoned");
        let state = &mut *state;
        let series_id = Self::resolve_series_id(state, id)?;

        let series = Self::require_mut(state, &series_id)?;
        let ObjectKind::VersionSeries(data) = &mut series.kind else {
            return Err(RepositoryError::InvalidArgument(format!(
                "object '{id}' is not a versioned document"
            )));
        };

        let version_id = data.check_in(is_major, properties, content, comment, user)?;
        // The series reflects its latest version's properties.
        if let Some(latest) = data.latest_version(false) {
            series.core.properties = latest.properties.clone();
        }
        series.core.touch(user);
        debug!(series = %series_id, version = %version_id, major = is_major, "checked in");
        Ok(version_id)
    }

    /// The newest version of a series, optionally restricted to major
    /// versions, as a document-shaped view.
    pub fn get_latest_version(
        &self,
        id: &ObjectId,
        major: bool,
    ) -> RepoResult<Option<StoredObject>> {
        let state = self.inner.read().expect("lock poisoned");
        let series_id = Self::resolve_series_id(&state, id)?;
        let series = Self::require(&state, &series_id)?;
        let ObjectKind::VersionSeries(data) = &series.kind else {
            return Err(RepositoryError::InvalidArgument(format!(
                "object '{id}' is not a versioned document"
            )));
        };
        Ok(data
            .latest_version(major)
            .map(|v| Self::version_view(series, data, v)))
    }

    /// Every version of a series, newest first (the PWC first while
    /// checked out), as document-shaped views.
    pub fn get_all_versions(&self, id: &ObjectId) -> RepoResult<Vec<StoredObject>> {
        let state = self.inner.read().expect("lock poisoned");
        let series_id = Self::resolve_series_id(&state, id)?;
        let series = Self::require(&state, &series_id)?;
        let ObjectKind::VersionSeries(data) = &series.kind else {
            return Err(RepositoryError::InvalidArgument(format!(
                "object '{id}' is not a versioned document"
            )));
        };
        Ok(data
            .all_versions()
            .into_iter()
            .map(|v| Self::version_view(series, data, v))
            .collect())
    }

    /// Every checked-out document visible to `user`, as PWC views,
    /// optionally ordered by a single property and carrying the
    /// relationships that touch each series.
    pub fn get_checked_out_documents(
        &self,
        order_by: Option<&OrderBy>,
        user: &str,
        include_relationships: bool,
    ) -> Vec<CheckedOutDocument> {
        let state = self.inner.read().expect("lock poisoned");
        let mut entries: Vec<CheckedOutDocument> = state
            .objects
            .values()
            .filter_map(|object| {
                let ObjectKind::VersionSeries(data) = &object.kind else {
                    return None;
                };
                let pwc = data.pwc.as_ref()?;
                if !object.core.acl.is_visible_to(user) {
                    return None;
                }
                let relationships = if include_relationships {
                    let series_id = object.core.id.as_ref()?;
                    Self::relationships_in(&state, series_id)
                } else {
                    Vec::new()
                };
                Some(CheckedOutDocument {
                    document: Self::version_view(object, data, pwc),
                    relationships,
                })
            })
            .collect();

        if let Some(spec) = order_by {
            entries.sort_by(|a, b| {
                let key_a = a
                    .document
                    .property(&spec.property)
                    .and_then(|p| p.single().cloned());
                let key_b = b
                    .document
                    .property(&spec.property)
                    .and_then(|p| p.single().cloned());
                compare_for_order(key_a.as_ref(), key_b.as_ref(), spec.ascending)
            });
        }
        entries
    }

    // -----------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------

    fn require<'a>(state: &'a StoreState, id: &ObjectId) -> RepoResult<&'a StoredObject> {
        state
            .objects
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("object '{id}'")))
    }

    fn require_mut<'a>(
        state: &'a mut StoreState,
        id: &ObjectId,
    ) -> RepoResult<&'a mut StoredObject> {
        state
            .objects
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("object '{id}'")))
    }

    fn require_folder<'a>(state: &'a StoreState, id: &ObjectId) -> RepoResult<&'a FolderData> {
        let object = Self::require(state, id)?;
        match &object.kind {
            ObjectKind::Folder(data) => Ok(data),
            _ => Err(RepositoryError::InvalidArgument(format!(
                "object '{id}' is not a folder"
            ))),
        }
    }

    fn folder_data_mut<'a>(
        state: &'a mut StoreState,
        id: &ObjectId,
    ) -> Option<&'a mut FolderData> {
        match state.objects.get_mut(id).map(|o| &mut o.kind) {
            Some(ObjectKind::Folder(data)) => Some(data),
            _ => None,
        }
    }

    /// Whether `segment` is already taken among `folder_id`'s children,
    /// ignoring `exclude`.
    fn name_in_use(
        state: &StoreState,
        folder_id: &ObjectId,
        segment: &str,
        exclude: Option<&ObjectId>,
    ) -> bool {
        let Some(object) = state.objects.get(folder_id) else {
            return false;
        };
        let ObjectKind::Folder(folder) = &object.kind else {
            return false;
        };
        folder.children.iter().any(|child_id| {
            if exclude == Some(child_id) {
                return false;
            }
            state
                .objects
                .get(child_id)
                .and_then(|child| child.segment_under(folder_id))
                .as_deref()
                == Some(segment)
        })
    }

    /// Whether `id` lies in the subtree rooted at `ancestor` (walking
    /// upward from `id` with cycle defense).
    fn is_descendant_of(state: &StoreState, id: &ObjectId, ancestor: &ObjectId) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        queue.push_back(id.clone());
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(object) = state.objects.get(&current) else {
                continue;
            };
            for parent_ref in object.parent_refs() {
                if &parent_ref.folder_id == ancestor {
                    return true;
                }
                queue.push_back(parent_ref.folder_id);
            }
        }
        false
    }

    /// The ACL application targets: the object itself at depth 0, plus
    /// its descendant subtree when propagation asks for it.
    /// RepositoryDetermined resolves to the store's default, which is to
    /// propagate.
    fn acl_targets(
        state: &StoreState,
        id: &ObjectId,
        propagation: AclPropagation,
    ) -> Vec<(usize, ObjectId)> {
        let mut targets = vec![(0, id.clone())];
        if matches!(propagation, AclPropagation::ObjectOnly) {
            return targets;
        }

        let mut visited = HashSet::new();
        visited.insert(id.clone());
        let mut queue: VecDeque<(usize, ObjectId)> = VecDeque::new();
        queue.push_back((0, id.clone()));
        while let Some((depth, current)) = queue.pop_front() {
            let Some(object) = state.objects.get(&current) else {
                continue;
            };
            let ObjectKind::Folder(folder) = &object.kind else {
                continue;
            };
            for child_id in &folder.children {
                if visited.insert(child_id.clone()) {
                    targets.push((depth + 1, child_id.clone()));
                    queue.push_back((depth + 1, child_id.clone()));
                }
            }
        }
        targets
    }

    fn relationships_in(state: &StoreState, id: &ObjectId) -> Vec<StoredObject> {
        state
            .objects
            .values()
            .filter(|o| {
                matches!(&o.kind, ObjectKind::Relationship(rel)
                    if &rel.source == id || &rel.target == id)
            })
            .cloned()
            .collect()
    }

    /// Map any of a series id, a version id, or a PWC id to the series id.
    fn resolve_series_id(state: &StoreState, id: &ObjectId) -> RepoResult<ObjectId> {
        if let Some(object) = state.objects.get(id) {
            return if object.is_version_series() {
                Ok(id.clone())
            } else {
                Err(RepositoryError::InvalidArgument(format!(
                    "object '{id}' is not a versioned document"
                )))
            };
        }
        state
            .version_index
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("object '{id}'")))
    }

    /// Remove an object outright: unlink it from its parents and drop all
    /// of its version-index entries.
    fn remove_object(state: &mut StoreState, id: &ObjectId) {
        let Some(object) = state.objects.remove(id) else {
            return;
        };
        for parent_ref in object.parent_refs() {
            if let Some(folder) = Self::folder_data_mut(state, &parent_ref.folder_id) {
                folder.children.retain(|c| c != id);
            }
        }
        if let ObjectKind::VersionSeries(data) = &object.kind {
            for version in data.all_versions() {
                state.version_index.remove(&version.id);
            }
        }
    }

    fn repoint_parent(parents: &mut [ParentRef], from: &ObjectId, to: &ObjectId) {
        for parent_ref in parents.iter_mut() {
            if &parent_ref.folder_id == from {
                parent_ref.folder_id = to.clone();
            }
        }
    }

    fn rename_in_state(state: &mut StoreState, id: &ObjectId, new_name: &str) -> RepoResult<()> {
        validate_segment(new_name)?;
        let object = Self::require(state, id)?;
        if object.core.name == new_name {
            return Ok(());
        }
        for parent_ref in object.parent_refs() {
            if Self::name_in_use(state, &parent_ref.folder_id, new_name, Some(id)) {
                return Err(RepositoryError::ConstraintViolation(format!(
                    "name '{new_name}' is already used by a sibling"
                )));
            }
        }
        let object = Self::require_mut(state, id)?;
        object.core.name = new_name.to_string();
        match &mut object.kind {
            ObjectKind::Document(data) => {
                for parent_ref in &mut data.parents {
                    parent_ref.segment = new_name.to_string();
                }
            }
            ObjectKind::VersionSeries(data) => {
                for parent_ref in &mut data.parents {
                    parent_ref.segment = new_name.to_string();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// A document-shaped view of one version snapshot.
    fn version_view(
        series: &StoredObject,
        data: &VersionSeriesData,
        version: &DocumentVersion,
    ) -> StoredObject {
        StoredObject {
            core: ObjectCore {
                id: Some(version.id.clone()),
                name: series.core.name.clone(),
                type_id: series.core.type_id.clone(),
                repository_id: series.core.repository_id.clone(),
                properties: version.properties.clone(),
                created_by: version.created_by.clone(),
                created_at: version.created_at,
                modified_by: version.created_by.clone(),
                modified_at: version.created_at,
                change_token: series.core.change_token.clone(),
                acl: series.core.acl.clone(),
            },
            kind: ObjectKind::Document(DocumentData {
                parents: data.parents.clone(),
                content: version.content.clone(),
            }),
        }
    }
}

/// A consistent, lock-free copy of the object collection, used by the
/// query evaluator so graph-shape traversals (IN_TREE) never race with
/// mutations.
pub struct StoreSnapshot {
    root_id: ObjectId,
    objects: HashMap<ObjectId, StoredObject>,
}

impl StoreSnapshot {
    /// Id of the root folder.
    pub fn root_id(&self) -> &ObjectId {
        &self.root_id
    }

    /// Iterate over every object, in scan order (no stable ordering is
    /// guaranteed).
    pub fn objects(&self) -> impl Iterator<Item = &StoredObject> {
        self.objects.values()
    }

    /// Look up an object by id.
    pub fn get(&self, id: &ObjectId) -> Option<&StoredObject> {
        self.objects.get(id)
    }

    /// Number of objects in the snapshot.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` for an empty snapshot.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether `ancestor` equals or is an ancestor of any of `object`'s
    /// parent folders, over all parent chains (multi-filing included).
    /// Cycle-defended even though filing is acyclic by invariant.
    pub fn in_tree(&self, object: &StoredObject, ancestor: &ObjectId) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        for parent_ref in object.parent_refs() {
            queue.push_back(parent_ref.folder_id);
        }
        while let Some(current) = queue.pop_front() {
            if &current == ancestor {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(folder) = self.objects.get(&current) {
                for parent_ref in folder.parent_refs() {
                    queue.push_back(parent_ref.folder_id);
                }
            }
        }
        false
    }
}
