//! The versioning state machine for version series.
//!
//! A series is in one of two states: NONE (no private working copy) or
//! CHECKED_OUT (a PWC exists and `checked_out_by` is set). Transitions:
//!
//! - `check_out`: NONE → CHECKED_OUT, rejected with Conflict when a PWC
//!   already exists. The second caller of a checkout race loses outright;
//!   nothing queues or blocks.
//! - `check_in`: CHECKED_OUT → NONE, the PWC becomes the new latest
//!   version (prepended, newest first).
//! - `cancel_check_out`: CHECKED_OUT → NONE, the PWC is discarded.
//! - `delete_version`: only in state NONE; removing the last version
//!   empties the series, which the store then deletes outright.
//!
//! The methods here mutate series payload data only; id assignment and
//! index bookkeeping stay with the store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cmr_types::{ObjectId, PropertyValue, RepoResult, RepositoryError};

use crate::content::ContentStream;
use crate::filing::ParentRef;

/// Initial versioning state requested when a versioned document is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningState {
    /// Create an initial major version.
    Major,
    /// Create an initial minor version.
    Minor,
    /// Create the series already checked out, with the PWC as its only
    /// content.
    CheckedOut,
}

/// One immutable snapshot in a version series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: ObjectId,
    /// Major-version flag; the PWC carries `false` until check-in decides.
    pub major: bool,
    /// Human-readable version label ("1.0", "1.1", "2.0", ...).
    pub label: String,
    /// Id of the version this one superseded, if any.
    pub predecessor: Option<ObjectId>,
    pub properties: HashMap<String, PropertyValue>,
    pub content: Option<ContentStream>,
    pub checkin_comment: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl DocumentVersion {
    /// A fresh snapshot with a generated id and no predecessor.
    pub fn new(
        major: bool,
        label: impl Into<String>,
        properties: HashMap<String, PropertyValue>,
        content: Option<ContentStream>,
        user: &str,
    ) -> Self {
        Self {
            id: ObjectId::generate(),
            major,
            label: label.into(),
            predecessor: None,
            properties,
            content,
            checkin_comment: None,
            created_by: user.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Kind payload of a version series: filing state, the persisted version
/// list (newest first), and the checkout state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionSeriesData {
    pub parents: Vec<ParentRef>,
    /// Persisted versions, newest first.
    pub versions: Vec<DocumentVersion>,
    /// The private working copy, present iff the series is checked out.
    pub pwc: Option<DocumentVersion>,
    /// The principal holding the checkout, present iff `pwc` is.
    pub checked_out_by: Option<String>,
}

impl VersionSeriesData {
    /// An empty series with the given filing state.
    pub fn new(parents: Vec<ParentRef>) -> Self {
        Self {
            parents,
            versions: Vec::new(),
            pwc: None,
            checked_out_by: None,
        }
    }

    /// Returns `true` while a private working copy exists.
    pub fn is_checked_out(&self) -> bool {
        self.pwc.is_some()
    }

    /// The newest persisted version, optionally restricted to major
    /// versions. The PWC is never a candidate.
    pub fn latest_version(&self, major: bool) -> Option<&DocumentVersion> {
        if major {
            self.versions.iter().find(|v| v.major)
        } else {
            self.versions.first()
        }
    }

    /// Every version, newest first, with the PWC (if any) at the front.
    pub fn all_versions(&self) -> Vec<&DocumentVersion> {
        self.pwc.iter().chain(self.versions.iter()).collect()
    }

    /// Look up a version (or the PWC) by id.
    pub fn version(&self, id: &ObjectId) -> Option<&DocumentVersion> {
        self.all_versions().into_iter().find(|v| &v.id == id)
    }

    /// The label the next check-in would receive.
    fn next_label(&self, major: bool) -> String {
        let (cur_major, cur_minor) = self
            .versions
            .first()
            .and_then(|v| v.label.split_once('.'))
            .and_then(|(a, b)| Some((a.parse::<u32>().ok()?, b.parse::<u32>().ok()?)))
            .unwrap_or((0, 0));
        if major {
            format!("{}.0", cur_major + 1)
        } else {
            format!("{cur_major}.{}", cur_minor + 1)
        }
    }

    /// NONE → CHECKED_OUT with the supplied working copy.
    pub(crate) fn check_out(&mut self, pwc: DocumentVersion, user: &str) -> RepoResult<()> {
        if self.pwc.is_some() {
            return Err(RepositoryError::Conflict(format!(
                "version series is already checked out by '{}'",
                self.checked_out_by.as_deref().unwrap_or("unknown")
            )));
        }
        self.pwc = Some(pwc);
        self.checked_out_by = Some(user.to_string());
        Ok(())
    }

    /// CHECKED_OUT → NONE, discarding the working copy. Returns the
    /// discarded PWC so the store can unregister its id.
    pub(crate) fn cancel_check_out(&mut self) -> RepoResult<DocumentVersion> {
        let pwc = self.pwc.take().ok_or_else(|| {
            RepositoryError::Conflict("version series has no private working copy".to_string())
        })?;
        self.checked_out_by = None;
        Ok(pwc)
    }

    /// CHECKED_OUT → NONE, promoting the working copy to the new latest
    /// version. Returns the id of the new version.
    pub(crate) fn check_in(
        &mut self,
        major: bool,
        properties: Option<HashMap<String, PropertyValue>>,
        content: Option<ContentStream>,
        comment: Option<&str>,
        user: &str,
    ) -> RepoResult<ObjectId> {
        let label = self.next_label(major);
        let predecessor = self.versions.first().map(|v| v.id.clone());

        let mut pwc = self.pwc.take().ok_or_else(|| {
            RepositoryError::Conflict("version series has no private working copy".to_string())
        })?;
        self.checked_out_by = None;

        pwc.major = major;
        pwc.label = label;
        pwc.predecessor = predecessor;
        if let Some(props) = properties {
            pwc.properties.extend(props);
        }
        if let Some(stream) = content {
            pwc.content = Some(stream);
        }
        pwc.checkin_comment = comment.map(str::to_string);
        pwc.created_by = user.to_string();
        pwc.created_at = Utc::now();

        let id = pwc.id.clone();
        self.versions.insert(0, pwc);
        Ok(id)
    }

    /// Remove one persisted version. Returns `true` when the series is
    /// left with no versions (the caller must then delete the series).
    pub(crate) fn delete_version(&mut self, id: &ObjectId) -> RepoResult<bool> {
        if self.is_checked_out() {
            return Err(RepositoryError::Conflict(
                "cannot delete a version while the series is checked out".to_string(),
            ));
        }
        let position = self
            .versions
            .iter()
            .position(|v| &v.id == id)
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("version '{id}' in this series"))
            })?;
        self.versions.remove(position);
        Ok(self.versions.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_with_one_version() -> VersionSeriesData {
        let mut series = VersionSeriesData::new(Vec::new());
        series.versions.insert(
            0,
            DocumentVersion::new(true, "1.0", HashMap::new(), None, "alice"),
        );
        series
    }

    fn working_copy(user: &str) -> DocumentVersion {
        DocumentVersion::new(false, "", HashMap::new(), None, user)
    }

    #[test]
    fn check_out_then_check_in_adds_one_version() {
        let mut series = series_with_one_version();
        let prior_latest = series.versions[0].id.clone();

        series.check_out(working_copy("bob"), "bob").unwrap();
        assert!(series.is_checked_out());
        assert_eq!(series.checked_out_by.as_deref(), Some("bob"));

        let new_id = series
            .check_in(false, None, None, Some("tweak"), "bob")
            .unwrap();

        assert!(!series.is_checked_out());
        assert!(series.checked_out_by.is_none());
        assert_eq!(series.versions.len(), 2);
        assert_eq!(series.versions[0].id, new_id);
        assert_eq!(series.versions[0].predecessor, Some(prior_latest));
        assert_eq!(series.versions[0].label, "1.1");
        assert_eq!(series.versions[0].checkin_comment.as_deref(), Some("tweak"));
    }

    #[test]
    fn second_check_out_is_a_conflict() {
        let mut series = series_with_one_version();
        series.check_out(working_copy("bob"), "bob").unwrap();

        let err = series
            .check_out(working_copy("carol"), "carol")
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        // The first checkout holds.
        assert_eq!(series.checked_out_by.as_deref(), Some("bob"));
    }

    #[test]
    fn cancel_check_out_discards_the_pwc() {
        let mut series = series_with_one_version();
        series.check_out(working_copy("bob"), "bob").unwrap();

        series.cancel_check_out().unwrap();
        assert!(!series.is_checked_out());
        assert!(series.checked_out_by.is_none());
        assert_eq!(series.versions.len(), 1);
    }

    #[test]
    fn cancel_without_checkout_is_a_conflict() {
        let mut series = series_with_one_version();
        let err = series.cancel_check_out().unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[test]
    fn major_check_in_bumps_the_major_label() {
        let mut series = series_with_one_version();
        series.check_out(working_copy("bob"), "bob").unwrap();
        series.check_in(true, None, None, None, "bob").unwrap();

        assert_eq!(series.versions[0].label, "2.0");
        assert!(series.versions[0].major);
    }

    #[test]
    fn latest_version_honors_the_major_filter() {
        let mut series = series_with_one_version();
        series.check_out(working_copy("bob"), "bob").unwrap();
        series.check_in(false, None, None, None, "bob").unwrap();

        let latest = series.latest_version(false).unwrap();
        assert_eq!(latest.label, "1.1");

        let latest_major = series.latest_version(true).unwrap();
        assert_eq!(latest_major.label, "1.0");
    }

    #[test]
    fn all_versions_lists_the_pwc_first() {
        let mut series = series_with_one_version();
        series.check_out(working_copy("bob"), "bob").unwrap();

        let all = series.all_versions();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, series.pwc.as_ref().unwrap().id);
    }

    #[test]
    fn delete_version_while_checked_out_is_a_conflict() {
        let mut series = series_with_one_version();
        let version_id = series.versions[0].id.clone();
        series.check_out(working_copy("bob"), "bob").unwrap();

        let err = series.delete_version(&version_id).unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[test]
    fn delete_unknown_version_is_not_found() {
        let mut series = series_with_one_version();
        let err = series.delete_version(&ObjectId::generate()).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[test]
    fn deleting_the_last_version_empties_the_series() {
        let mut series = series_with_one_version();
        let version_id = series.versions[0].id.clone();
        let now_empty = series.delete_version(&version_id).unwrap();
        assert!(now_empty);
    }

    #[test]
    fn deleting_one_of_two_versions_recomputes_latest() {
        let mut series = series_with_one_version();
        series.check_out(working_copy("bob"), "bob").unwrap();
        let newer = series.check_in(false, None, None, None, "bob").unwrap();

        let now_empty = series.delete_version(&newer).unwrap();
        assert!(!now_empty);
        assert_eq!(series.latest_version(false).unwrap().label, "1.0");
    }

    #[test]
    fn check_in_applies_property_and_content_updates() {
        use cmr_types::TypedValue;

        let mut series = series_with_one_version();
        series.check_out(working_copy("bob"), "bob").unwrap();

        let mut props = HashMap::new();
        props.insert(
            "doc:status".to_string(),
            TypedValue::String("final".into()).into(),
        );
        let content = ContentStream::new("text/plain", b"v2".to_vec());

        series
            .check_in(false, Some(props), Some(content), None, "bob")
            .unwrap();

        let latest = series.latest_version(false).unwrap();
        assert_eq!(
            latest.properties.get("doc:status"),
            Some(&TypedValue::String("final".into()).into())
        );
        assert_eq!(latest.content.as_ref().unwrap().data, b"v2");
    }
}
