use super::{
    CompositeIndexDefinition, IndexEntry, decode_deleted, key_filter_path, slice::SliceBounds,
    split_commit_vs,
};
use crate::{
    KEY_PROPERTY,
    db::{
        codec::{ByteReader, encode_path, encode_value},
        data::Entity,
        query::{CursorPosition, FilterProperty},
        store::{KeySelector, KeyValue, Subspace, Versionstamp},
    },
    error::{ErrorOrigin, InternalError},
    key::{EntityKey, KeyPath},
    value::Value,
};

///
/// CompositeIndex
///
/// Entries of one composite index definition within one namespace.
///
/// Plain layout:    `values.. | path | commit_vs`
/// Ancestor layout: `ancestor path | values.. | remaining path | commit_vs`
///
/// Ancestor indexes hold one row per proper ancestor of the entity, so a scan
/// under any ancestor finds all of its descendants. Each value is encoded
/// in its column's direction; multi-valued properties yield one row per
/// combination of values.
///

#[derive(Clone, Debug)]
pub struct CompositeIndex {
    subspace: Subspace,
    namespace: String,
    definition: CompositeIndexDefinition,
}

impl CompositeIndex {
    #[must_use]
    pub fn new(
        subspace: Subspace,
        namespace: impl Into<String>,
        definition: CompositeIndexDefinition,
    ) -> Self {
        Self {
            subspace,
            namespace: namespace.into(),
            definition,
        }
    }

    #[must_use]
    pub const fn subspace(&self) -> &Subspace {
        &self.subspace
    }

    #[must_use]
    pub const fn definition(&self) -> &CompositeIndexDefinition {
        &self.definition
    }

    /// Every key this index holds for `entity` at `commit_vs`. Empty when
    /// the entity lacks one of the indexed properties.
    pub fn encode_keys(
        &self,
        entity: &Entity,
        commit_vs: Option<Versionstamp>,
    ) -> Result<Vec<Vec<u8>>, InternalError> {
        let mut columns = Vec::with_capacity(self.definition.properties.len());
        for prop in &self.definition.properties {
            let descending = prop.direction.is_descending();
            let encoded = entity
                .values(&prop.name)
                .map(|value| encode_value(value, descending))
                .collect::<Result<Vec<_>, _>>()?;
            if encoded.is_empty() {
                return Ok(Vec::new());
            }
            columns.push(encoded);
        }

        let combos = cartesian(&columns);
        let stamp = commit_vs.unwrap_or_else(Versionstamp::incomplete);
        let path = &entity.key.path;

        let mut keys = Vec::new();
        if !self.definition.ancestor {
            let packed_path = encode_path(path)?;
            for values in &combos {
                keys.push(self.pack_entry(&[], values, &packed_path, stamp));
            }

            return Ok(keys);
        }

        for depth in 1..path.len() {
            let ancestor = encode_path(&path.prefix(depth))?;
            let remaining = encode_path(&path.suffix(depth))?;
            for values in &combos {
                keys.push(self.pack_entry(&ancestor, values, &remaining, stamp));
            }
        }

        Ok(keys)
    }

    pub fn decode(&self, kv: &KeyValue) -> Result<IndexEntry, InternalError> {
        let body = self
            .subspace
            .unpack(kv.key())
            .ok_or_else(|| InternalError::index_corruption("key outside the composite index"))?;
        let (packed, commit_vs) = split_commit_vs(body)?;
        let corrupt = |err| {
            InternalError::index_corruption(format!(
                "undecodable entry in composite index {:?}: {err}",
                self.definition.id
            ))
        };

        let mut reader = ByteReader::new(packed);
        let ancestor = if self.definition.ancestor {
            Some(reader.read_path().map_err(corrupt)?)
        } else {
            None
        };

        let mut properties = Vec::with_capacity(self.definition.properties.len());
        for prop in &self.definition.properties {
            let value = reader
                .read_value(prop.direction.is_descending())
                .map_err(corrupt)?;
            properties.push((prop.name.clone(), value));
        }

        let remaining = reader.read_path().map_err(corrupt)?;
        reader.finish().map_err(corrupt)?;

        let path = match ancestor {
            Some(ancestor) => join_paths(ancestor, remaining),
            None => remaining,
        };

        Ok(IndexEntry {
            key: EntityKey::new(
                self.definition.project_id.clone(),
                self.namespace.clone(),
                path,
            ),
            properties,
            commit_vs,
            deleted_vs: decode_deleted(kv.value())?,
        })
    }

    /// Selectors for a scan honouring equality prefixes, one inequality
    /// range, ancestor scoping and cursors.
    ///
    /// Filters are applied in column order with `__key__` last; an equality
    /// filter may not follow an inequality.
    pub fn get_slice(
        &self,
        filter_props: &[FilterProperty],
        ancestor: Option<&KeyPath>,
        start_cursor: Option<&CursorPosition>,
        end_cursor: Option<&CursorPosition>,
        reverse: bool,
    ) -> Result<(KeySelector, KeySelector), InternalError> {
        if self.definition.ancestor && ancestor.is_none() {
            return Err(InternalError::bad_query(
                "an ancestor index can only answer ancestor queries",
            ));
        }

        let mut base = self.subspace.clone();
        if let Some(ancestor) = ancestor {
            base = base.subspace(&encode_path(ancestor)?);
        }

        for filter_prop in filter_props {
            if filter_prop.name != KEY_PROPERTY
                && self.definition.direction_of(&filter_prop.name).is_none()
            {
                return Err(InternalError::bad_query(format!(
                    "unexpected filter on '{}' for composite index {:?}",
                    filter_prop.name, self.definition.id
                )));
            }
        }

        let mut subspace = base.clone();
        let mut bounds = SliceBounds::default();
        let mut equalities: Vec<(&str, &Value)> = Vec::new();
        let mut ranged = false;

        let columns = self
            .definition
            .properties
            .iter()
            .map(|prop| (prop.name.as_str(), prop.direction.is_descending()))
            .chain(std::iter::once((KEY_PROPERTY, false)));
        for (name, descending) in columns {
            let Some(filter_prop) = filter_props.iter().find(|fp| fp.name == name) else {
                continue;
            };

            if filter_prop.equality() {
                if ranged {
                    return Err(InternalError::bad_query(format!(
                        "equality filter on '{name}' follows an inequality"
                    )));
                }
                let value = single_equality(filter_prop)?;
                subspace =
                    subspace.subspace(&self.encode_column(name, value, descending, ancestor)?);
                equalities.push((name, value));
                continue;
            }

            ranged = true;
            for (op, value) in &filter_prop.filters {
                let packed = subspace.pack(&self.encode_column(name, value, descending, ancestor)?);
                let op = if descending { op.mirrored() } else { *op };
                bounds.apply_filter(op, &packed)?;
            }
        }

        if let Some(cursor) = start_cursor {
            let packed = self.cursor_key(&base, cursor, &equalities, ancestor)?;
            bounds.apply_start_cursor(&packed, cursor.start_inclusive, reverse);
        }
        if let Some(cursor) = end_cursor {
            let packed = self.cursor_key(&base, cursor, &equalities, ancestor)?;
            bounds.apply_end_cursor(&packed, cursor.start_inclusive, reverse);
        }

        Ok(bounds.finish(&subspace))
    }

    fn pack_entry(
        &self,
        ancestor: &[u8],
        values: &[&[u8]],
        path: &[u8],
        stamp: Versionstamp,
    ) -> Vec<u8> {
        let mut key = self.subspace.pack(ancestor);
        for value in values {
            key.extend_from_slice(value);
        }
        key.extend_from_slice(path);
        key.extend_from_slice(stamp.as_bytes());

        key
    }

    // Bytes of one column: an encoded value, or the entity path relative to
    // the ancestor for `__key__`.
    fn encode_column(
        &self,
        name: &str,
        value: &Value,
        descending: bool,
        ancestor: Option<&KeyPath>,
    ) -> Result<Vec<u8>, InternalError> {
        if name == KEY_PROPERTY {
            return self.encode_entity_path(key_filter_path(value)?, ancestor);
        }

        Ok(encode_value(value, descending)?)
    }

    fn encode_entity_path(
        &self,
        path: &KeyPath,
        ancestor: Option<&KeyPath>,
    ) -> Result<Vec<u8>, InternalError> {
        match ancestor {
            Some(ancestor) if self.definition.ancestor => {
                if !path.starts_with(ancestor) || path.len() <= ancestor.len() {
                    return Err(InternalError::bad_query(
                        "key is not a descendant of the query ancestor",
                    ));
                }
                Ok(encode_path(&path.suffix(ancestor.len()))?)
            }
            _ => Ok(encode_path(path)?),
        }
    }

    // Packed position of a cursor: every column value, taken from the
    // cursor or else from the equality filter on that column, then the key.
    fn cursor_key(
        &self,
        base: &Subspace,
        cursor: &CursorPosition,
        equalities: &[(&str, &Value)],
        ancestor: Option<&KeyPath>,
    ) -> Result<Vec<u8>, InternalError> {
        let mut packed = base.prefix().to_vec();
        for prop in &self.definition.properties {
            let value = cursor
                .index_values
                .iter()
                .find(|(name, _)| *name == prop.name)
                .map(|(_, value)| value)
                .or_else(|| {
                    equalities
                        .iter()
                        .find(|(name, _)| *name == prop.name)
                        .map(|(_, value)| *value)
                })
                .ok_or_else(|| {
                    InternalError::bad_query(format!(
                        "cursor carries no value for index property '{}'",
                        prop.name
                    ))
                })?;
            packed.extend(encode_value(value, prop.direction.is_descending())?);
        }
        packed.extend(self.encode_entity_path(&cursor.key.path, ancestor)?);

        Ok(packed)
    }
}

// One entry per combination of column values, in column order.
fn cartesian(columns: &[Vec<Vec<u8>>]) -> Vec<Vec<&[u8]>> {
    columns.iter().fold(vec![Vec::new()], |combos, column| {
        combos
            .iter()
            .flat_map(|prefix| {
                column.iter().map(move |value| {
                    let mut combo = prefix.clone();
                    combo.push(value.as_slice());
                    combo
                })
            })
            .collect()
    })
}

fn join_paths(ancestor: KeyPath, remaining: KeyPath) -> KeyPath {
    let mut path = ancestor;
    for element in remaining.elements() {
        path.push(element.clone());
    }

    path
}

// The one value of an equality-only filter group.
fn single_equality(filter_prop: &FilterProperty) -> Result<&Value, InternalError> {
    match filter_prop.filters.as_slice() {
        [(_, value)] => Ok(value),
        _ => Err(InternalError::unsupported(
            ErrorOrigin::Index,
            format!(
                "multiple equality values for '{}' need a merge join",
                filter_prop.name
            ),
        )),
    }
}
