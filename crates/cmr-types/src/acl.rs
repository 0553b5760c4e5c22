//! Access control entries, lists, and merge rules.
//!
//! An [`Acl`] is an ordered set of [`Ace`]s, at most one per principal.
//! Merging is additive per principal: adding an ACE unions its permissions
//! into the existing entry, removing an ACE subtracts them and drops the
//! entry once no permissions remain. Replacement swaps the whole list.

use serde::{Deserialize, Serialize};

/// Well-known principal matching every caller.
pub const PRINCIPAL_ANYONE: &str = "anyone";

/// Basic permission: read object state and content.
pub const PERMISSION_READ: &str = "cmis:read";
/// Basic permission: modify object state and content.
pub const PERMISSION_WRITE: &str = "cmis:write";
/// Basic permission: full control, including ACL changes.
pub const PERMISSION_ALL: &str = "cmis:all";

/// How an ACL change spreads from the target object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclPropagation {
    /// Change the target object only.
    ObjectOnly,
    /// Change the target object and every descendant.
    Propagate,
    /// Let the repository pick its default policy.
    RepositoryDetermined,
}

/// One access control entry: a principal and its permissions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ace {
    pub principal_id: String,
    pub permissions: Vec<String>,
    /// Direct entries were applied to the object itself; indirect ones
    /// arrived through propagation from an ancestor.
    pub direct: bool,
}

impl Ace {
    /// A direct ACE.
    pub fn new(principal_id: impl Into<String>, permissions: Vec<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            permissions,
            direct: true,
        }
    }

    /// An ACE recorded as the result of propagation.
    pub fn propagated(principal_id: impl Into<String>, permissions: Vec<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            permissions,
            direct: false,
        }
    }
}

/// An ordered access control list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub aces: Vec<Ace>,
}

impl Acl {
    /// An empty ACL (visible to everyone).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an ACL from a list of entries, merging duplicates.
    pub fn from_aces(aces: Vec<Ace>) -> Self {
        let mut acl = Self::new();
        for ace in aces {
            acl.add(ace);
        }
        acl
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.aces.len()
    }

    /// Returns `true` if the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.aces.is_empty()
    }

    /// The entry for `principal_id`, if present.
    pub fn ace_for(&self, principal_id: &str) -> Option<&Ace> {
        self.aces.iter().find(|a| a.principal_id == principal_id)
    }

    /// Union `ace`'s permissions into the list, keeping entry order and
    /// deduplicating permission strings.
    pub fn add(&mut self, ace: Ace) {
        match self
            .aces
            .iter_mut()
            .find(|a| a.principal_id == ace.principal_id)
        {
            Some(existing) => {
                for perm in ace.permissions {
                    if !existing.permissions.contains(&perm) {
                        existing.permissions.push(perm);
                    }
                }
                existing.direct = existing.direct || ace.direct;
            }
            None => self.aces.push(ace),
        }
    }

    /// Subtract `ace`'s permissions from its principal's entry; the entry
    /// is dropped once it holds no permissions.
    pub fn remove(&mut self, ace: &Ace) {
        if let Some(existing) = self
            .aces
            .iter_mut()
            .find(|a| a.principal_id == ace.principal_id)
        {
            existing.permissions.retain(|p| !ace.permissions.contains(p));
        }
        self.aces.retain(|a| !a.permissions.is_empty());
    }

    /// The list that results from applying `add` and `remove` deltas to
    /// this ACL, in that order.
    pub fn merged(&self, add: &[Ace], remove: &[Ace]) -> Acl {
        let mut result = self.clone();
        for ace in add {
            result.add(ace.clone());
        }
        for ace in remove {
            result.remove(ace);
        }
        result
    }

    /// Whether `principal` may see the object guarded by this ACL.
    ///
    /// An empty ACL guards nothing. Otherwise the principal (or the
    /// well-known `anyone` principal) must hold at least one permission.
    pub fn is_visible_to(&self, principal: &str) -> bool {
        if self.aces.is_empty() {
            return true;
        }
        self.aces.iter().any(|a| {
            (a.principal_id == principal || a.principal_id == PRINCIPAL_ANYONE)
                && !a.permissions.is_empty()
        })
    }
}
