//! Module: value
//! Responsibility: the polymorphic property value model and its canonical
//! ordering.
//! Does not own: byte encoding (see `db::codec`).

use crate::key::EntityKey;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strata_primitives::ValueTag;

///
/// Value
///
/// Property value as stored on an entity. Ordering across types follows the
/// tag order; within one type it follows the type's natural order.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Null,
    Int64(i64),
    Boolean(bool),
    String(String),
    Double(f64),
    Point(PointValue),
    User(UserValue),
    Reference(EntityKey),
}

impl Value {
    #[must_use]
    pub const fn tag(&self) -> ValueTag {
        match self {
            Self::Null => ValueTag::Null,
            Self::Int64(_) => ValueTag::Int64,
            Self::Boolean(_) => ValueTag::Boolean,
            Self::String(_) => ValueTag::String,
            Self::Double(_) => ValueTag::Double,
            Self::Point(_) => ValueTag::Point,
            Self::User(_) => ValueTag::User,
            Self::Reference(_) => ValueTag::Reference,
        }
    }

    /// Total order consistent with the ascending byte encoding.
    ///
    /// Doubles use IEEE total ordering, so `-0.0 < 0.0` and NaNs sort at the
    /// extremes by sign.
    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Point(a), Self::Point(b)) => a.canonical_cmp(b),
            (Self::User(a), Self::User(b)) => a.cmp(b),
            (Self::Reference(a), Self::Reference(b)) => a.cmp(b),
            _ => self.tag().cmp(&other.tag()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

///
/// PointValue
///

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct PointValue {
    pub x: f64,
    pub y: f64,
}

impl PointValue {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
    }
}

///
/// UserValue
///
/// Absent optional fields sort before present ones.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct UserValue {
    pub email: String,
    pub auth_domain: String,
    pub nickname: Option<String>,
    pub federated_identity: Option<String>,
    pub federated_provider: Option<String>,
}

impl UserValue {
    #[must_use]
    pub fn new(email: impl Into<String>, auth_domain: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            auth_domain: auth_domain.into(),
            ..Self::default()
        }
    }
}

///
/// TESTS
///
