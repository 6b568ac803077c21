use super::{FilterOp, Query, guess_orders};
use crate::{
    KEY_PROPERTY,
    db::{direction::Direction, index::QueryIndex},
    error::InternalError,
    value::Value,
};

///
/// FilterProperty
///
/// Every filter on one property, in query order. A multi-valued `In`
/// contributes one `Equal` per value.
///

#[derive(Clone, Debug, PartialEq)]
pub struct FilterProperty {
    pub name: String,
    pub filters: Vec<(FilterOp, Value)>,
}

impl FilterProperty {
    /// True if every filter on the property is an equality.
    #[must_use]
    pub fn equality(&self) -> bool {
        self.filters.iter().all(|(op, _)| *op == FilterOp::Equal)
    }
}

/// Group a normalized query's filters by property, in the order an index
/// scan applies them: equality properties first, then the one inequality
/// property, then `__key__`.
///
/// Fails if anything but the last group is on `__key__` or carries an
/// inequality. `Exists` filters constrain nothing and are skipped.
pub fn group_filters(query: &Query) -> Result<Vec<FilterProperty>, InternalError> {
    let mut props: Vec<FilterProperty> = Vec::new();
    for filter in query.filters.iter().filter(|f| f.op != FilterOp::Exists) {
        let op = if filter.op == FilterOp::In {
            FilterOp::Equal
        } else {
            filter.op
        };
        let pairs = filter.values.iter().map(|value| (op, value.clone()));

        match props.iter_mut().find(|prop| prop.name == filter.property) {
            Some(prop) => prop.filters.extend(pairs),
            None => props.push(FilterProperty {
                name: filter.property.clone(),
                filters: pairs.collect(),
            }),
        }
    }

    if let Some(position) = props.iter().position(|prop| !prop.equality()) {
        let inequality = props.remove(position);
        props.push(inequality);
    }
    if let Some(position) = props.iter().position(|prop| prop.name == KEY_PROPERTY) {
        let key = props.remove(position);
        props.push(key);
    }

    if let Some((_, head)) = props.split_last() {
        for prop in head {
            if prop.name == KEY_PROPERTY {
                return Err(InternalError::bad_query(
                    "only the last filter property can be on __key__",
                ));
            }
            if !prop.equality() {
                return Err(InternalError::bad_query(
                    "all but the last filter property must be equality filters",
                ));
            }
        }
    }

    Ok(props)
}

/// Effective `(property, direction)` order of a normalized query's results.
#[must_use]
pub fn order_info(query: &Query) -> Vec<(String, Direction)> {
    guess_orders(query)
        .into_iter()
        .map(|order| (order.property, order.direction))
        .collect()
}

/// Whether `index` must be scanned backwards to produce `orders`, judged by
/// the first order against its column direction.
#[must_use]
pub fn scan_direction(orders: &[(String, Direction)], index: &QueryIndex) -> bool {
    orders.first().is_some_and(|(name, direction)| {
        index
            .direction_of(name)
            .is_some_and(|column| column != *direction)
    })
}
