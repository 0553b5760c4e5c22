//! The query evaluator: matches stored objects against a parsed WHERE
//! tree, orders the matches, and assembles the result.
//!
//! Evaluation scans a [`StoreSnapshot`] object by object:
//!
//! 1. **Type filter** — the object's type id is walked up its parent
//!    chain (via the [`TypeManager`]) until it equals the queried FROM
//!    type; subtype instances therefore match a supertype query.
//! 2. **Expression evaluation** — recursive over the node tree, with
//!    per-family comparison semantics. A genuine evaluation error (type
//!    mismatch, unsupported operator) is never converted into a silent
//!    non-match.
//! 3. Matches are collected in scan order, sorted by the first ORDER BY
//!    specification only, and projected through the row renderer.
//!
//! Evaluation is O(number of objects) per call, runs to completion with
//! no cancellation, and never mutates the store.

use std::cmp::Ordering;

use tracing::warn;

use cmr_store::{StoreSnapshot, StoredObject};
use cmr_types::{
    compare_for_order, OrderBy, PropertyValue, RepoResult, RepositoryError, TypeManager,
};

use crate::ast::{ComparisonOp, Paging, Query, WhereExpr};
use crate::like::like_to_regex;
use crate::result::{JsonRenderer, QueryResult, RowRenderer};

/// Evaluates queries against one snapshot of the object store.
pub struct QueryEvaluator<'a> {
    snapshot: &'a StoreSnapshot,
    types: &'a dyn TypeManager,
    user: &'a str,
}

impl<'a> QueryEvaluator<'a> {
    /// Create an evaluator for `user` over `snapshot`.
    pub fn new(snapshot: &'a StoreSnapshot, types: &'a dyn TypeManager, user: &'a str) -> Self {
        Self {
            snapshot,
            types,
            user,
        }
    }

    /// Execute a query with the default JSON renderer.
    pub fn execute(&self, query: &Query, paging: Paging) -> RepoResult<QueryResult> {
        self.execute_with(query, paging, &JsonRenderer)
    }

    /// Execute a query, projecting rows through `renderer`.
    ///
    /// Paging bounds are accepted but not applied: the match list is
    /// returned whole, `num_items` is the full match count, and
    /// `has_more_items` stays `false`. A diagnostic fires when bounds are
    /// supplied so the limitation is visible.
    pub fn execute_with(
        &self,
        query: &Query,
        paging: Paging,
        renderer: &dyn RowRenderer,
    ) -> RepoResult<QueryResult> {
        if self.types.type_definition(&query.from_type).is_none() {
            return Err(RepositoryError::NotFound(format!(
                "type '{}'",
                query.from_type
            )));
        }

        let mut matches: Vec<&StoredObject> = Vec::new();
        for object in self.snapshot.objects() {
            if !self.types.is_subtype_of(object.type_id(), &query.from_type) {
                continue;
            }
            if !object.core.acl.is_visible_to(self.user) {
                continue;
            }
            if let Some(expr) = &query.where_clause {
                if !self.eval(expr, object)? {
                    continue;
                }
            }
            matches.push(object);
        }

        self.sort(&mut matches, &query.order_by);

        if paging.max_items.is_some() || paging.skip_count.is_some() {
            warn!(
                max_items = ?paging.max_items,
                skip_count = ?paging.skip_count,
                "paging bounds accepted but not applied to the match list"
            );
        }

        let rows = matches
            .iter()
            .map(|object| renderer.render(object, &query.select))
            .collect();
        Ok(QueryResult {
            rows,
            num_items: matches.len(),
            has_more_items: false,
        })
    }

    /// Recursive expression evaluation. Both operands of a boolean
    /// connective are always evaluated; there are no side effects to
    /// elide and errors on either side must surface.
    fn eval(&self, expr: &WhereExpr, object: &StoredObject) -> RepoResult<bool> {
        match expr {
            WhereExpr::Comparison {
                op,
                property,
                literal,
            } => self.eval_comparison(*op, property, literal, object),

            WhereExpr::IsNull { property, negated } => {
                let is_null = object.property(property).is_none();
                Ok(is_null != *negated)
            }

            WhereExpr::Like {
                property,
                pattern,
                negated,
            } => self.eval_like(property, pattern, *negated, object),

            WhereExpr::InFolder { folder_id } => {
                if !object.supports_filing() {
                    return Ok(false);
                }
                Ok(object
                    .parent_refs()
                    .iter()
                    .any(|r| &r.folder_id == folder_id))
            }

            WhereExpr::InTree { folder_id } => {
                if !object.supports_filing() {
                    return Ok(false);
                }
                Ok(self.snapshot.in_tree(object, folder_id))
            }

            WhereExpr::And(left, right) => {
                let l = self.eval(left, object)?;
                let r = self.eval(right, object)?;
                Ok(l && r)
            }

            WhereExpr::Or(left, right) => {
                let l = self.eval(left, object)?;
                let r = self.eval(right, object)?;
                Ok(l || r)
            }

            WhereExpr::Not(inner) => Ok(!self.eval(inner, object)?),

            WhereExpr::In { negated, .. } => Err(RepositoryError::Unsupported(format!(
                "{} is not supported",
                if *negated { "NOT IN" } else { "IN" }
            ))),

            WhereExpr::InAny { negated, .. } => Err(RepositoryError::Unsupported(format!(
                "{} is not supported",
                if *negated { "ANY ... NOT IN" } else { "ANY ... IN" }
            ))),

            WhereExpr::EqAny { .. } => Err(RepositoryError::Unsupported(
                "= ANY is not supported".to_string(),
            )),

            WhereExpr::Contains { .. } => Err(RepositoryError::Unsupported(
                "CONTAINS() is not supported".to_string(),
            )),

            WhereExpr::Score => Err(RepositoryError::Unsupported(
                "SCORE() is not supported".to_string(),
            )),
        }
    }

    fn eval_comparison(
        &self,
        op: ComparisonOp,
        property: &str,
        literal: &cmr_types::TypedValue,
        object: &StoredObject,
    ) -> RepoResult<bool> {
        let Some(value) = object.property(property) else {
            // NULL compares as no-match, not as an error.
            return Ok(false);
        };
        let single = match &value {
            PropertyValue::Single(v) => v,
            PropertyValue::Multi(_) => {
                return Err(RepositoryError::InvalidArgument(format!(
                    "cannot apply {op} to multi-valued property '{property}'"
                )));
            }
        };

        let ordering = single.compare(literal)?;
        Ok(match op {
            ComparisonOp::Eq => ordering == Ordering::Equal,
            ComparisonOp::Ne => ordering != Ordering::Equal,
            ComparisonOp::Lt => ordering == Ordering::Less,
            ComparisonOp::Le => ordering != Ordering::Greater,
            ComparisonOp::Gt => ordering == Ordering::Greater,
            ComparisonOp::Ge => ordering != Ordering::Less,
        })
    }

    fn eval_like(
        &self,
        property: &str,
        pattern: &str,
        negated: bool,
        object: &StoredObject,
    ) -> RepoResult<bool> {
        let Some(value) = object.property(property) else {
            return Ok(false);
        };
        let single = match &value {
            PropertyValue::Single(v) => v,
            PropertyValue::Multi(_) => {
                return Err(RepositoryError::InvalidArgument(format!(
                    "cannot apply LIKE to multi-valued property '{property}'"
                )));
            }
        };
        let Some(text) = single.as_text() else {
            return Err(RepositoryError::InvalidArgument(format!(
                "LIKE requires a string-family property, '{property}' holds {}",
                single.property_type()
            )));
        };

        let regex = like_to_regex(pattern)?;
        Ok(regex.is_match(text) != negated)
    }

    /// Sort the matches by the first ORDER BY specification. Additional
    /// specifications are ignored with a diagnostic. Null keys sort
    /// before non-null keys ascending; descending reverses everything,
    /// null placement included.
    fn sort(&self, matches: &mut [&StoredObject], order_by: &[OrderBy]) {
        let Some(spec) = order_by.first() else {
            return;
        };
        if order_by.len() > 1 {
            warn!(
                ignored = order_by.len() - 1,
                "only the first ORDER BY specification is honored"
            );
        }
        matches.sort_by(|a, b| {
            let key_a = a.property(&spec.property).and_then(|p| p.single().cloned());
            let key_b = b.property(&spec.property).and_then(|p| p.single().cloned());
            compare_for_order(key_a.as_ref(), key_b.as_ref(), spec.ascending)
        });
    }
}
