//! The parsed query representation handed to the evaluator.
//!
//! The lexer/parser lives outside this core; what arrives here is a
//! [`WhereExpr`] tree plus [`Query`] selector metadata. The node set is
//! closed: adding or removing an operator is a compile-time-checked
//! change in the evaluator's match. Operators the evaluator refuses
//! (IN, ANY-quantified membership, CONTAINS, SCORE) are still distinct
//! nodes so refusal is explicit rather than a parse failure.

use std::fmt;

use serde::{Deserialize, Serialize};

use cmr_types::{ObjectId, OrderBy, TypedValue};

/// A comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        write!(f, "{symbol}")
    }
}

/// One node of a parsed WHERE clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WhereExpr {
    /// `property <op> literal`. The left operand is always a property
    /// reference, the right always a literal.
    Comparison {
        op: ComparisonOp,
        property: String,
        literal: TypedValue,
    },
    /// `property IS [NOT] NULL`.
    IsNull { property: String, negated: bool },
    /// `property [NOT] LIKE pattern`.
    Like {
        property: String,
        pattern: String,
        negated: bool,
    },
    /// `IN_FOLDER('<id>')`: direct containment.
    InFolder { folder_id: ObjectId },
    /// `IN_TREE('<id>')`: transitive containment.
    InTree { folder_id: ObjectId },
    And(Box<WhereExpr>, Box<WhereExpr>),
    Or(Box<WhereExpr>, Box<WhereExpr>),
    Not(Box<WhereExpr>),
    /// `property [NOT] IN (literals)` — recognized, refused at
    /// evaluation time.
    In {
        property: String,
        values: Vec<TypedValue>,
        negated: bool,
    },
    /// `ANY property [NOT] IN (literals)` — recognized, refused at
    /// evaluation time.
    InAny {
        property: String,
        values: Vec<TypedValue>,
        negated: bool,
    },
    /// `literal = ANY property` — recognized, refused at evaluation time.
    EqAny {
        property: String,
        literal: TypedValue,
    },
    /// `CONTAINS('<text>')` — recognized, refused at evaluation time.
    Contains { query: String },
    /// `SCORE()` — recognized, refused at evaluation time.
    Score,
}

impl WhereExpr {
    /// `self AND other`.
    pub fn and(self, other: WhereExpr) -> WhereExpr {
        WhereExpr::And(Box::new(self), Box::new(other))
    }

    /// `self OR other`.
    pub fn or(self, other: WhereExpr) -> WhereExpr {
        WhereExpr::Or(Box::new(self), Box::new(other))
    }

    /// `NOT self`.
    pub fn negated(self) -> WhereExpr {
        WhereExpr::Not(Box::new(self))
    }
}

/// One item of the SELECT list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectItem {
    /// `SELECT *`.
    AllProperties,
    /// A named property.
    Property(String),
}

/// Selector metadata for one query: the queried type, the requested
/// properties, the optional WHERE tree, and the ORDER BY list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub from_type: String,
    pub select: Vec<SelectItem>,
    pub where_clause: Option<WhereExpr>,
    pub order_by: Vec<OrderBy>,
}

impl Query {
    /// `SELECT * FROM <from_type>` with no WHERE and no ORDER BY.
    pub fn new(from_type: impl Into<String>) -> Self {
        Self {
            from_type: from_type.into(),
            select: vec![SelectItem::AllProperties],
            where_clause: None,
            order_by: Vec::new(),
        }
    }

    /// Set the SELECT list (builder style).
    pub fn with_select(mut self, select: Vec<SelectItem>) -> Self {
        self.select = select;
        self
    }

    /// Set the WHERE clause (builder style).
    pub fn with_where(mut self, expr: WhereExpr) -> Self {
        self.where_clause = Some(expr);
        self
    }

    /// Append one ORDER BY specification (builder style).
    pub fn with_order_by(mut self, spec: OrderBy) -> Self {
        self.order_by.push(spec);
        self
    }
}

/// Paging bounds, as handed in by the protocol layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub max_items: Option<u64>,
    pub skip_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_compose() {
        let query = Query::new("cmis:document")
            .with_where(
                WhereExpr::IsNull {
                    property: "doc:status".into(),
                    negated: true,
                }
                .and(WhereExpr::InFolder {
                    folder_id: ObjectId::new("f1"),
                }),
            )
            .with_order_by(OrderBy::asc("cmis:name"))
            .with_order_by(OrderBy::desc("cmis:creationDate"));

        assert_eq!(query.from_type, "cmis:document");
        assert!(matches!(query.where_clause, Some(WhereExpr::And(_, _))));
        assert_eq!(query.order_by.len(), 2);
        assert_eq!(query.select, vec![SelectItem::AllProperties]);
    }

    #[test]
    fn comparison_ops_display_as_sql() {
        assert_eq!(ComparisonOp::Ne.to_string(), "<>");
        assert_eq!(ComparisonOp::Le.to_string(), "<=");
    }

    #[test]
    fn default_paging_is_unbounded() {
        let paging = Paging::default();
        assert!(paging.max_items.is_none());
        assert!(paging.skip_count.is_none());
    }
}
