//! Filing primitives: parent references and path handling.
//!
//! A filed object carries one [`ParentRef`] per parent folder. Each
//! reference has its own path segment, so a multi-filed document can
//! appear under a different name in each of its folders. Path strings are
//! absolute, `/`-separated, with the root folder spelled `/`.

use serde::{Deserialize, Serialize};

use cmr_types::{ObjectId, RepoResult, RepositoryError};

/// Path separator for folder paths.
pub const PATH_SEPARATOR: char = '/';

/// One filing relation: the parent folder and the name the object carries
/// under that parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub folder_id: ObjectId,
    pub segment: String,
}

impl ParentRef {
    /// Create a parent reference.
    pub fn new(folder_id: ObjectId, segment: impl Into<String>) -> Self {
        Self {
            folder_id,
            segment: segment.into(),
        }
    }
}

/// Split an absolute path into its segments.
///
/// `/` yields an empty segment list (the root itself). Paths must be
/// absolute and must not contain empty segments.
pub fn split_path(path: &str) -> RepoResult<Vec<&str>> {
    if !path.starts_with(PATH_SEPARATOR) {
        return Err(RepositoryError::InvalidArgument(format!(
            "path '{path}' is not absolute"
        )));
    }
    let trimmed = path.trim_matches(PATH_SEPARATOR);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = trimmed.split(PATH_SEPARATOR).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(RepositoryError::InvalidArgument(format!(
            "path '{path}' contains an empty segment"
        )));
    }
    Ok(segments)
}

/// Check that `name` is usable as a path segment.
pub fn validate_segment(name: &str) -> RepoResult<()> {
    if name.is_empty() {
        return Err(RepositoryError::InvalidArgument(
            "object name must not be empty".to_string(),
        ));
    }
    if name.contains(PATH_SEPARATOR) {
        return Err(RepositoryError::InvalidArgument(format!(
            "object name '{name}' must not contain '{PATH_SEPARATOR}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_has_no_segments() {
        assert!(split_path("/").unwrap().is_empty());
    }

    #[test]
    fn nested_path_splits_in_order() {
        let segments = split_path("/projects/2024/report.txt").unwrap();
        assert_eq!(segments, vec!["projects", "2024", "report.txt"]);
    }

    #[test]
    fn trailing_separator_is_tolerated() {
        let segments = split_path("/projects/").unwrap();
        assert_eq!(segments, vec!["projects"]);
    }

    #[test]
    fn relative_path_is_rejected() {
        let err = split_path("projects/2024").unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidArgument(_)));
    }

    #[test]
    fn empty_segment_is_rejected() {
        let err = split_path("/projects//2024").unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidArgument(_)));
    }

    #[test]
    fn segment_validation() {
        validate_segment("report.txt").unwrap();
        assert!(validate_segment("").is_err());
        assert!(validate_segment("a/b").is_err());
    }
}
