use super::{FilterOp, Query};
use crate::{
    KEY_PROPERTY,
    db::{
        direction::Direction,
        index::{CompositeIndexDefinition, IndexProperty},
    },
    error::InternalError,
    obs::sink::{self, MatchKind, MetricsEvent},
};
use std::{collections::BTreeSet, fmt};

///
/// PropertySpec
///
/// One ordered column of an index requirement. A `None` direction comes
/// from an inequality without an explicit order and matches either
/// direction.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropertySpec {
    pub name: String,
    pub direction: Option<Direction>,
}

///
/// IndexRequirement
///
/// Shape of the composite index a query needs: an unordered equality
/// prefix, an ordered postfix, then distinct-on and plain existence
/// properties.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexRequirement {
    pub required: bool,
    pub kind: String,
    pub ancestor: bool,
    pub prefix: BTreeSet<String>,
    pub postfix: Vec<PropertySpec>,
    pub group_by: BTreeSet<String>,
    pub unordered: BTreeSet<String>,
}

impl IndexRequirement {
    #[must_use]
    pub fn property_count(&self) -> usize {
        self.prefix.len() + self.postfix.len() + self.group_by.len() + self.unordered.len()
    }

    /// Columns of the index that satisfies this requirement: the prefix in
    /// name order, the postfix as ordered, then the rest in name order.
    /// Unspecified directions default to ascending.
    #[must_use]
    pub fn recommended_properties(&self) -> Vec<IndexProperty> {
        let mut props: Vec<IndexProperty> = self.prefix.iter().map(IndexProperty::asc).collect();
        props.extend(
            self.postfix
                .iter()
                .map(|spec| {
                    IndexProperty::new(spec.name.clone(), spec.direction.unwrap_or_default())
                }),
        );
        props.extend(self.group_by.iter().map(IndexProperty::asc));
        props.extend(self.unordered.iter().map(IndexProperty::asc));

        props
    }

    /// The definition an application would declare for this requirement.
    #[must_use]
    pub fn definition(&self, project_id: &str) -> CompositeIndexDefinition {
        CompositeIndexDefinition::new(
            project_id,
            self.kind.clone(),
            self.ancestor,
            self.recommended_properties(),
        )
    }

    // Whether `definition` has this requirement's shape without being its
    // literal recommendation.
    fn matches_structurally(&self, definition: &CompositeIndexDefinition) -> bool {
        if !self.group_by.is_empty() || self.unordered.len() > 1 {
            return false;
        }
        if definition.kind != self.kind
            || definition.ancestor != self.ancestor
            || definition.properties.len() != self.property_count()
        {
            return false;
        }

        let (head, tail) = definition.properties.split_at(self.prefix.len());
        let head_names: BTreeSet<&str> = head.iter().map(|p| p.name.as_str()).collect();
        if head_names.len() != self.prefix.len()
            || !self.prefix.iter().all(|name| head_names.contains(name.as_str()))
        {
            return false;
        }

        let unordered = self.unordered.iter().map(|name| PropertySpec {
            name: name.clone(),
            direction: None,
        });
        tail.iter()
            .zip(self.postfix.iter().cloned().chain(unordered))
            .all(|(column, spec)| {
                column.name == spec.name
                    && spec.direction.is_none_or(|direction| direction == column.direction)
            })
    }
}

impl fmt::Display for IndexRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind '{}'", self.kind)?;
        if self.ancestor {
            write!(f, " with ancestor")?;
        }
        write!(f, " on (")?;
        for (i, prop) in self.recommended_properties().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let direction = match prop.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            write!(f, "{} {direction}", prop.name)?;
        }
        write!(f, ")")
    }
}

/// Composite index shape needed by `query`.
///
/// Components the kind index answers natively are removed first: a trailing
/// ascending `__key__` order, and `__key__` filters when no other property
/// carries an inequality and the key is not ordered descending. Neither
/// applies once the query has existence filters.
pub fn index_requirement(query: &Query) -> Result<IndexRequirement, InternalError> {
    let query = query.normalized();
    let mut filters = query.filters.clone();
    let mut orders = query.orders.clone();

    let has_exists = filters.iter().any(|f| f.op == FilterOp::Exists);
    if !has_exists {
        let mut key_descending = false;
        if let Some(last) = orders.last()
            && last.property == KEY_PROPERTY
        {
            if last.direction == Direction::Asc {
                orders.pop();
            } else {
                key_descending = true;
            }
        }

        let other_inequality = filters
            .iter()
            .any(|f| f.op.is_inequality() && f.property != KEY_PROPERTY);
        if !key_descending && !other_inequality {
            filters.retain(|f| f.property != KEY_PROPERTY);
        }
    }

    let kind = query.kind.clone().unwrap_or_default();
    let mut required = query.kind.is_some();

    let inequality: BTreeSet<&str> = filters
        .iter()
        .filter(|f| f.op.is_inequality())
        .map(|f| f.property.as_str())
        .collect();
    let prefix: BTreeSet<String> = filters
        .iter()
        .filter(|f| f.op.is_equality() && !inequality.contains(f.property.as_str()))
        .map(|f| f.property.clone())
        .collect();

    if required && inequality.is_empty() && !has_exists && orders.is_empty() {
        required = prefix.contains(KEY_PROPERTY);
    }

    let mut inequality = inequality.into_iter();
    let inequality_prop = inequality.next();
    if inequality.next().is_some() {
        return Err(InternalError::bad_query(
            "inequality filters are limited to a single property",
        ));
    }

    let mut postfix: Vec<PropertySpec> = orders
        .iter()
        .map(|order| PropertySpec {
            name: order.property.clone(),
            direction: Some(order.direction),
        })
        .collect();
    if let Some(name) = inequality_prop {
        match orders.first() {
            Some(first) if first.property != name => {
                return Err(InternalError::bad_query(format!(
                    "the inequality property '{name}' must be ordered first"
                )));
            }
            Some(_) => {}
            None => postfix.push(PropertySpec {
                name: name.to_string(),
                direction: None,
            }),
        }
    }

    let grouped: BTreeSet<&str> = query.group_by.iter().map(String::as_str).collect();
    let (group_by, unordered): (BTreeSet<String>, BTreeSet<String>) = filters
        .iter()
        .filter(|f| f.op == FilterOp::Exists)
        .map(|f| f.property.clone())
        .partition(|name| grouped.contains(name.as_str()));

    let mut requirement = IndexRequirement {
        required,
        kind,
        ancestor: query.ancestor.is_some(),
        prefix,
        postfix,
        group_by,
        unordered,
    };

    if query.kind.is_some() && !requirement.ancestor && requirement.property_count() <= 1 {
        requirement.required = requirement.postfix.first().is_some_and(|spec| {
            spec.name == KEY_PROPERTY && spec.direction == Some(Direction::Desc)
        });
    }

    Ok(requirement)
}

/// Ready definition that answers `query`.
///
/// An exact match on the recommended definition wins over a structural
/// match. Returns `None` when nothing matches and no composite index is
/// required; otherwise the failure is a needs-index error.
pub fn find_index_to_use(
    query: &Query,
    definitions: &[CompositeIndexDefinition],
) -> Result<Option<CompositeIndexDefinition>, InternalError> {
    let requirement = index_requirement(query)?;
    let ready: Vec<&CompositeIndexDefinition> = definitions.iter().filter(|d| d.ready).collect();

    let wanted = requirement.definition(&query.project_id).encoded_def();
    if let Some(definition) = ready.iter().find(|d| d.encoded_def() == wanted) {
        sink::record(MetricsEvent::IndexMatch {
            kind: MatchKind::Exact,
        });
        return Ok(Some((*definition).clone()));
    }

    if let Some(definition) = ready.iter().find(|d| requirement.matches_structurally(d)) {
        sink::record(MetricsEvent::IndexMatch {
            kind: MatchKind::Structural,
        });
        tracing::debug!(
            project_id = %query.project_id,
            index_id = ?definition.id,
            "using structurally matching index"
        );
        return Ok(Some((*definition).clone()));
    }

    if !requirement.required {
        return Ok(None);
    }

    sink::record(MetricsEvent::NeedsIndex);
    Err(InternalError::needs_index(requirement))
}
