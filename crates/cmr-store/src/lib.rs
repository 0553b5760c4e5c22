//! The CMR object store: the authoritative, in-process object collection
//! of one CMIS repository.
//!
//! This crate implements the stored-object model (folders, documents,
//! version series, relationships), filing and multi-filing, the
//! versioning state machine, and ACL application with propagation. The
//! store hands the query evaluator a consistent [`StoreSnapshot`] so tree
//! traversals never race with mutations.
//!
//! # Design Rules
//!
//! 1. Objects are created transient and become visible at `persist()`,
//!    which assigns the id exactly once.
//! 2. Every mutation goes through the store, is serialized behind one
//!    exclusive lock, and bumps the modification stamp and change token.
//! 3. Graph invariants (unique sibling names, acyclic filing, one PWC per
//!    series) are re-checked at the mutation that could break them.
//! 4. Failures are typed [`cmr_types::RepositoryError`] values; nothing
//!    is silently ignored.

pub mod content;
pub mod filing;
pub mod object;
pub mod store;
pub mod versioning;

pub use content::ContentStream;
pub use filing::{split_path, validate_segment, ParentRef, PATH_SEPARATOR};
pub use object::{
    DocumentData, FolderData, ObjectCore, ObjectKind, RelationshipData, StoredObject,
};
pub use store::{CheckedOutDocument, ObjectStore, StoreSnapshot};
pub use versioning::{DocumentVersion, VersionSeriesData, VersioningState};
