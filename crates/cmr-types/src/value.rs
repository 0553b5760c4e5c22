//! Typed property values and their comparison semantics.
//!
//! CMIS properties carry one of eight value families. Comparison is only
//! defined within a family (with two deliberate exceptions: the numeric
//! families compare against each other, and the four string-backed families
//! compare ordinally against each other). Everything else is an
//! `InvalidArgument` failure, never a silent non-match.
//!
//! Ordering rules:
//! - boolean: `false < true`
//! - integer: 64-bit signed comparison
//! - decimal: floating comparison (total order, so NaN is well-behaved)
//! - datetime: calendar-instant comparison
//! - string / id / uri / html: ordinal string comparison

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RepoResult, RepositoryError};

/// The value family of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Boolean,
    Integer,
    Decimal,
    DateTime,
    String,
    Id,
    Uri,
    Html,
}

impl PropertyType {
    /// The four families backed by a string payload.
    pub fn is_string_family(&self) -> bool {
        matches!(self, Self::String | Self::Id | Self::Uri | Self::Html)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::DateTime => "datetime",
            Self::String => "string",
            Self::Id => "id",
            Self::Uri => "uri",
            Self::Html => "html",
        };
        write!(f, "{name}")
    }
}

/// A single typed value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    DateTime(DateTime<Utc>),
    String(String),
    Id(String),
    Uri(String),
    Html(String),
}

impl TypedValue {
    /// The family this value belongs to.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Integer(_) => PropertyType::Integer,
            Self::Decimal(_) => PropertyType::Decimal,
            Self::DateTime(_) => PropertyType::DateTime,
            Self::String(_) => PropertyType::String,
            Self::Id(_) => PropertyType::Id,
            Self::Uri(_) => PropertyType::Uri,
            Self::Html(_) => PropertyType::Html,
        }
    }

    /// The string payload, for string-family values only.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Id(s) | Self::Uri(s) | Self::Html(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values using the family-specific ordering.
    ///
    /// Numeric families coerce against each other (integer widens to
    /// decimal); string families compare ordinally against each other.
    /// Any other cross-family pairing fails with `InvalidArgument`.
    pub fn compare(&self, other: &TypedValue) -> RepoResult<Ordering> {
        use TypedValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => Ok(a.cmp(b)),
            (Integer(a), Integer(b)) => Ok(a.cmp(b)),
            (Decimal(a), Decimal(b)) => Ok(a.total_cmp(b)),
            (Integer(a), Decimal(b)) => Ok((*a as f64).total_cmp(b)),
            (Decimal(a), Integer(b)) => Ok(a.total_cmp(&(*b as f64))),
            (DateTime(a), DateTime(b)) => Ok(a.cmp(b)),
            (a, b) => match (a.as_text(), b.as_text()) {
                (Some(x), Some(y)) => Ok(x.cmp(y)),
                _ => Err(RepositoryError::InvalidArgument(format!(
                    "cannot compare {} value against {} value",
                    a.property_type(),
                    b.property_type()
                ))),
            },
        }
    }

    /// Protocol-facing JSON representation of this value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::Number((*i).into()),
            Self::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::String(s) | Self::Id(s) | Self::Uri(s) | Self::Html(s) => {
                serde_json::Value::String(s.clone())
            }
        }
    }
}

/// A property slot: a single value or an ordered multi-value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Single(TypedValue),
    Multi(Vec<TypedValue>),
}

impl PropertyValue {
    /// Returns `true` for the multi-valued form.
    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }

    /// The value, if single-valued.
    pub fn single(&self) -> Option<&TypedValue> {
        match self {
            Self::Single(v) => Some(v),
            Self::Multi(_) => None,
        }
    }

    /// Protocol-facing JSON representation of this slot.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Single(v) => v.to_json(),
            Self::Multi(vs) => {
                serde_json::Value::Array(vs.iter().map(TypedValue::to_json).collect())
            }
        }
    }
}

impl From<TypedValue> for PropertyValue {
    fn from(v: TypedValue) -> Self {
        Self::Single(v)
    }
}

/// One ORDER BY specification: a property id and a direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub property: String,
    pub ascending: bool,
}

impl OrderBy {
    /// Ascending order on `property`.
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: true,
        }
    }

    /// Descending order on `property`.
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ascending: false,
        }
    }
}

/// Ordering comparator for sort keys, shared by the query evaluator and
/// the checked-out-documents listing.
///
/// Null (absent) keys sort before all non-null keys in ascending order;
/// descending reverses the comparison including null placement. Keys of
/// incomparable families compare equal rather than failing: sort keys are
/// expected to share a property definition across objects.
pub fn compare_for_order(
    a: Option<&TypedValue>,
    b: Option<&TypedValue>,
    ascending: bool,
) -> Ordering {
    let forward = match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
    };
    if ascending {
        forward
    } else {
        forward.reverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn boolean_orders_false_before_true() {
        let f = TypedValue::Boolean(false);
        let t = TypedValue::Boolean(true);
        assert_eq!(f.compare(&t).unwrap(), Ordering::Less);
        assert_eq!(t.compare(&t).unwrap(), Ordering::Equal);
    }

    #[test]
    fn integer_comparison_is_signed() {
        let neg = TypedValue::Integer(-5);
        let pos = TypedValue::Integer(3);
        assert_eq!(neg.compare(&pos).unwrap(), Ordering::Less);
    }

    #[test]
    fn decimal_comparison_is_total() {
        let a = TypedValue::Decimal(1.5);
        let b = TypedValue::Decimal(2.25);
        assert_eq!(a.compare(&b).unwrap(), Ordering::Less);

        let nan = TypedValue::Decimal(f64::NAN);
        // total_cmp places NaN after all finite values; the point is that
        // the comparison is deterministic, not that NaN is meaningful.
        assert_eq!(b.compare(&nan).unwrap(), Ordering::Less);
    }

    #[test]
    fn integer_coerces_against_decimal() {
        let i = TypedValue::Integer(2);
        let d = TypedValue::Decimal(2.5);
        assert_eq!(i.compare(&d).unwrap(), Ordering::Less);
        assert_eq!(d.compare(&i).unwrap(), Ordering::Greater);
    }

    #[test]
    fn datetime_comparison_is_calendar_order() {
        let early = TypedValue::DateTime(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let late = TypedValue::DateTime(Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0).unwrap());
        assert_eq!(early.compare(&late).unwrap(), Ordering::Less);
    }

    #[test]
    fn string_family_members_compare_ordinally() {
        let s = TypedValue::String("alpha".into());
        let id = TypedValue::Id("beta".into());
        assert_eq!(s.compare(&id).unwrap(), Ordering::Less);
    }

    #[test]
    fn cross_family_comparison_is_invalid() {
        let s = TypedValue::String("1".into());
        let i = TypedValue::Integer(1);
        let err = s.compare(&i).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidArgument(_)));

        let b = TypedValue::Boolean(true);
        assert!(i.compare(&b).is_err());
    }

    #[test]
    fn property_type_reporting() {
        assert_eq!(
            TypedValue::Uri("http://example.org".into()).property_type(),
            PropertyType::Uri
        );
        assert!(PropertyType::Html.is_string_family());
        assert!(!PropertyType::Decimal.is_string_family());
    }

    #[test]
    fn null_sorts_first_ascending_and_last_descending() {
        let v = TypedValue::String("x".into());
        assert_eq!(compare_for_order(None, Some(&v), true), Ordering::Less);
        assert_eq!(compare_for_order(Some(&v), None, true), Ordering::Greater);
        assert_eq!(compare_for_order(None, Some(&v), false), Ordering::Greater);
        assert_eq!(compare_for_order(None, None, true), Ordering::Equal);
    }

    #[test]
    fn multi_value_json_is_an_array() {
        let multi = PropertyValue::Multi(vec![
            TypedValue::Integer(1),
            TypedValue::Integer(2),
        ]);
        assert!(multi.is_multi());
        assert_eq!(multi.to_json(), serde_json::json!([1, 2]));
        assert!(multi.single().is_none());
    }

    #[test]
    fn single_value_json_is_a_scalar() {
        let single: PropertyValue = TypedValue::Boolean(true).into();
        assert_eq!(single.to_json(), serde_json::json!(true));
        assert_eq!(single.single(), Some(&TypedValue::Boolean(true)));
    }

    #[test]
    fn datetime_json_is_rfc3339() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let json = TypedValue::DateTime(dt).to_json();
        assert_eq!(json, serde_json::json!("2024-03-01T09:30:00+00:00"));
    }

    #[test]
    fn order_by_constructors() {
        let asc = OrderBy::asc("cmis:name");
        assert!(asc.ascending);
        let desc = OrderBy::desc("cmis:name");
        assert!(!desc.ascending);
        assert_eq!(asc.property, desc.property);
    }
}
