//! Module: db::query
//! Responsibility: query shape normalization, composite index matching and
//! the index scan that answers a query.
//! Does not own: index key layout (see `db::index`) or result assembly.

mod cursor;
mod filter;
mod iterator;
mod plan;


use crate::{
    KEY_PROPERTY,
    db::direction::Direction,
    key::KeyPath,
    value::Value,
};
use std::collections::BTreeSet;

// re-exports
pub use cursor::{CursorPosition, QueryCursor, decode_cursor_entity};
pub use filter::{FilterProperty, group_filters, order_info, scan_direction};
pub use iterator::IndexIterator;
pub use plan::{IndexRequirement, PropertySpec, find_index_to_use, index_requirement};

///
/// FilterOp
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FilterOp {
    Equal,
    In,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Exists,
}

impl FilterOp {
    #[must_use]
    pub const fn is_inequality(self) -> bool {
        matches!(
            self,
            Self::LessThan | Self::LessThanOrEqual | Self::GreaterThan | Self::GreaterThanOrEqual
        )
    }

    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Equal | Self::In)
    }

    /// The same bound seen from a descending column.
    #[must_use]
    pub const fn mirrored(self) -> Self {
        match self {
            Self::LessThan => Self::GreaterThan,
            Self::LessThanOrEqual => Self::GreaterThanOrEqual,
            Self::GreaterThan => Self::LessThan,
            Self::GreaterThanOrEqual => Self::LessThanOrEqual,
            other => other,
        }
    }
}

///
/// Filter
///
/// One predicate on one property. `In` carries any number of values,
/// `Exists` none, every other operation exactly one.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub property: String,
    pub op: FilterOp,
    pub values: Vec<Value>,
}

impl Filter {
    #[must_use]
    pub fn new(property: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            op,
            values: vec![value.into()],
        }
    }

    #[must_use]
    pub fn in_values(property: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            property: property.into(),
            op: FilterOp::In,
            values,
        }
    }

    #[must_use]
    pub fn exists(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            op: FilterOp::Exists,
            values: Vec::new(),
        }
    }
}

///
/// Order
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

impl Order {
    #[must_use]
    pub fn new(property: impl Into<String>, direction: Direction) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }

    #[must_use]
    pub fn asc(property: impl Into<String>) -> Self {
        Self::new(property, Direction::Asc)
    }

    #[must_use]
    pub fn desc(property: impl Into<String>) -> Self {
        Self::new(property, Direction::Desc)
    }
}

///
/// Query
///
/// One datastore query over a single project and namespace.
///
/// `property_names` is the projection and `group_by` the distinct-on list;
/// both only matter for index selection here. Cursors are positions taken
/// from an earlier run of the same query.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub project_id: String,
    pub namespace: String,
    pub kind: Option<String>,
    pub ancestor: Option<KeyPath>,
    pub filters: Vec<Filter>,
    pub orders: Vec<Order>,
    pub property_names: Vec<String>,
    pub group_by: Vec<String>,
    pub keys_only: bool,
    pub compiled_cursor: Option<QueryCursor>,
    pub end_compiled_cursor: Option<QueryCursor>,
}

impl Query {
    #[must_use]
    pub fn new(project_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn with_ancestor(mut self, ancestor: KeyPath) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    #[must_use]
    pub fn project<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.property_names.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn distinct_on<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.group_by.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub const fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    #[must_use]
    pub fn start_at(mut self, cursor: QueryCursor) -> Self {
        self.compiled_cursor = Some(cursor);
        self
    }

    #[must_use]
    pub fn end_at(mut self, cursor: QueryCursor) -> Self {
        self.end_compiled_cursor = Some(cursor);
        self
    }

    /// Canonical form of this query's filters and orders.
    ///
    /// - A single-value `In` becomes `Equal`.
    /// - Orders on equality-only properties, and repeated orders, are dropped.
    /// - Projected properties not otherwise constrained become `Exists`
    ///   filters; redundant `Exists` filters are dropped.
    /// - An equality filter on `__key__` drops every order.
    /// - Orders after a `__key__` order are dropped.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut filters = self.filters.clone();
        for filter in &mut filters {
            if filter.op == FilterOp::In && filter.values.len() == 1 {
                filter.op = FilterOp::Equal;
            }
        }

        let inequality: BTreeSet<&str> = filters
            .iter()
            .filter(|f| f.op.is_inequality())
            .map(|f| f.property.as_str())
            .collect();
        let equality: BTreeSet<&str> = filters
            .iter()
            .filter(|f| f.op.is_equality() && !inequality.contains(f.property.as_str()))
            .map(|f| f.property.as_str())
            .collect();

        let mut covered = equality.clone();
        let mut orders = Vec::new();
        for order in &self.orders {
            if covered.insert(order.property.as_str()) {
                orders.push(order.clone());
            }
        }
        covered.extend(inequality.iter().copied());

        let mut exists: BTreeSet<String> = BTreeSet::new();
        for name in self
            .filters
            .iter()
            .filter(|f| f.op == FilterOp::Exists)
            .map(|f| f.property.as_str())
            .chain(self.property_names.iter().map(String::as_str))
            .chain(self.group_by.iter().map(String::as_str))
        {
            if name != KEY_PROPERTY && !covered.contains(name) {
                exists.insert(name.to_string());
            }
        }

        let mut filters: Vec<Filter> = filters
            .into_iter()
            .filter(|f| f.op != FilterOp::Exists)
            .collect();
        filters.extend(exists.into_iter().map(Filter::exists));

        let key_equality = filters
            .iter()
            .any(|f| f.property == KEY_PROPERTY && f.op.is_equality());
        if key_equality {
            orders.clear();
        }
        if let Some(position) = orders.iter().position(|o| o.property == KEY_PROPERTY) {
            orders.truncate(position + 1);
        }

        Self {
            filters,
            orders,
            ..self.clone()
        }
    }
}

/// Orders that fully determine result order for a normalized query.
///
/// Without explicit orders the first inequality property is ordered
/// ascending. `Exists` properties follow in name order, and `__key__`
/// ascending closes the list unless it already ends on the key.
#[must_use]
pub fn guess_orders(query: &Query) -> Vec<Order> {
    let mut orders = query.orders.clone();

    if orders.is_empty()
        && let Some(filter) = query.filters.iter().find(|f| f.op.is_inequality())
    {
        orders.push(Order::asc(filter.property.clone()));
    }

    let exists: BTreeSet<&str> = query
        .filters
        .iter()
        .filter(|f| f.op == FilterOp::Exists)
        .map(|f| f.property.as_str())
        .collect();
    for name in exists {
        if !orders.iter().any(|o| o.property == name) {
            orders.push(Order::asc(name));
        }
    }

    if orders.last().is_none_or(|o| o.property != KEY_PROPERTY) {
        orders.push(Order::asc(KEY_PROPERTY));
    }

    orders
}
