//! The CMR query evaluator.
//!
//! Answers a parsed CMISQL WHERE clause over the object store: type
//! filtering along the parent-type chain, typed predicate evaluation
//! (comparisons, NULL checks, LIKE, IN_FOLDER/IN_TREE), single-column
//! ordering with nulls first, and projection into protocol-facing rows.
//!
//! The lexer/parser is an external collaborator: this crate consumes a
//! [`WhereExpr`] tree plus [`Query`] selector metadata and reads (never
//! mutates) a [`cmr_store::StoreSnapshot`]. Set-membership and full-text
//! operators are recognized nodes that fail with
//! [`cmr_types::RepositoryError::Unsupported`] rather than silently
//! matching nothing.

pub mod ast;
pub mod eval;
pub mod like;
pub mod result;

pub use ast::{ComparisonOp, Paging, Query, SelectItem, WhereExpr};
pub use eval::QueryEvaluator;
pub use like::like_to_regex;
pub use result::{JsonRenderer, QueryResult, RowRenderer};
