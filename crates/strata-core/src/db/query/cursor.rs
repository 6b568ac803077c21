use super::{Query, order_info};
use crate::{
    KEY_PROPERTY,
    db::{
        codec::{decode_cursor, encode_cursor},
        data::{Entity, Property},
    },
    error::InternalError,
    key::EntityKey,
    serialize::{deserialize, serialize},
    value::Value,
};
use serde::{Deserialize, Serialize};

///
/// CursorPosition
///
/// Where a scan stopped: the entity key, the values of the properties the
/// query orders by, and whether the scan resumes at that entity (inclusive)
/// or just past it.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CursorPosition {
    pub key: EntityKey,
    pub index_values: Vec<(String, Value)>,
    pub start_inclusive: bool,
}

///
/// QueryCursor
///
/// Stateless resume point handed to clients as an opaque token.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct QueryCursor {
    pub position: CursorPosition,
}

impl QueryCursor {
    #[must_use]
    pub const fn new(position: CursorPosition) -> Self {
        Self { position }
    }

    pub fn to_token(&self) -> Result<String, InternalError> {
        Ok(encode_cursor(&serialize(self)?))
    }

    pub fn from_token(token: &str) -> Result<Self, InternalError> {
        let payload = decode_cursor(token)?;

        deserialize(&payload)
            .map_err(|err| InternalError::bad_query(format!("invalid cursor payload: {err}")))
    }
}

/// Comparison entity for `cursor`: its key plus the value of every
/// property `query` orders by, other than the key itself.
///
/// Fails when the cursor lacks one of those properties, which means it was
/// taken from a different query.
pub fn decode_cursor_entity(query: &Query, cursor: &QueryCursor) -> Result<Entity, InternalError> {
    let position = &cursor.position;
    let mut properties = Vec::new();

    for (name, _) in order_info(&query.normalized()) {
        if name == KEY_PROPERTY {
            continue;
        }
        let Some((_, value)) = position.index_values.iter().find(|(prop, _)| *prop == name) else {
            return Err(InternalError::bad_query(format!(
                "cursor does not match this query: no value for '{name}'"
            )));
        };
        properties.push(Property::new(name, value.clone()));
    }

    Ok(Entity::new(position.key.clone(), properties))
}
