use super::{IndexEntry, decode_deleted, key_filter_path, slice::SliceBounds, split_commit_vs};
use crate::{
    KEY_PROPERTY,
    db::{
        codec::{ancestor_range, decode_path, encode_path},
        query::{CursorPosition, FilterProperty},
        store::{KeySelector, KeyValue, Subspace, Versionstamp},
    },
    error::{ErrorOrigin, InternalError},
    key::{EntityKey, KeyPath},
};

///
/// KindIndex
///
/// Every version of every entity of one kind in one namespace. Keys are the
/// packed entity path followed by the commit versionstamp; the value is the
/// versionstamp of the write that superseded the version, or empty.
///

#[derive(Clone, Debug)]
pub struct KindIndex {
    subspace: Subspace,
    project_id: String,
    namespace: String,
    kind: String,
}

impl KindIndex {
    #[must_use]
    pub fn new(
        subspace: Subspace,
        project_id: impl Into<String>,
        namespace: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            subspace,
            project_id: project_id.into(),
            namespace: namespace.into(),
            kind: kind.into(),
        }
    }

    #[must_use]
    pub const fn subspace(&self) -> &Subspace {
        &self.subspace
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Key for `path` at `commit_vs`; `None` leaves the stamp incomplete for
    /// a versionstamped write.
    pub fn encode_key(
        &self,
        path: &KeyPath,
        commit_vs: Option<Versionstamp>,
    ) -> Result<Vec<u8>, InternalError> {
        let mut key = self.subspace.pack(&encode_path(path)?);
        key.extend_from_slice(commit_vs.unwrap_or_else(Versionstamp::incomplete).as_bytes());

        Ok(key)
    }

    pub fn decode(&self, kv: &KeyValue) -> Result<IndexEntry, InternalError> {
        let body = self
            .subspace
            .unpack(kv.key())
            .ok_or_else(|| InternalError::index_corruption("key outside the kind index"))?;
        let (packed_path, commit_vs) = split_commit_vs(body)?;
        let path = decode_path(packed_path).map_err(|err| {
            InternalError::index_corruption(format!("undecodable kind index path: {err}"))
        })?;

        Ok(IndexEntry {
            key: EntityKey::new(self.project_id.clone(), self.namespace.clone(), path),
            properties: Vec::new(),
            commit_vs,
            deleted_vs: decode_deleted(kv.value())?,
        })
    }

    /// Selectors for a scan that honours `__key__` filters, ancestor scoping
    /// and cursors. Any other filter is a bad query for this index.
    pub fn get_slice(
        &self,
        filter_props: &[FilterProperty],
        ancestor: Option<&KeyPath>,
        start_cursor: Option<&CursorPosition>,
        end_cursor: Option<&CursorPosition>,
        reverse: bool,
    ) -> Result<(KeySelector, KeySelector), InternalError> {
        let mut subspace = self.subspace.clone();
        let mut bounds = SliceBounds::default();
        if let Some(ancestor) = ancestor {
            let (start, stop) = ancestor_range(subspace.prefix(), ancestor)?;
            bounds.set(start, stop);
        }

        for filter_prop in filter_props {
            if filter_prop.name != KEY_PROPERTY {
                return Err(InternalError::bad_query(format!(
                    "unexpected filter on '{}' for a kind index",
                    filter_prop.name
                )));
            }

            if filter_prop.equality() {
                let path = single_equality(filter_prop)?;
                if ancestor.is_some_and(|ancestor| !path.starts_with(ancestor)) {
                    return Ok(SliceBounds::empty(&subspace));
                }
                subspace = subspace.subspace(&encode_path(path)?);
                bounds = SliceBounds::default();
                continue;
            }

            for (op, value) in &filter_prop.filters {
                let packed = subspace.pack(&encode_path(key_filter_path(value)?)?);
                bounds.apply_filter(*op, &packed)?;
            }
        }

        if let Some(cursor) = start_cursor {
            let packed = self.subspace.pack(&encode_path(&cursor.key.path)?);
            bounds.apply_start_cursor(&packed, cursor.start_inclusive, reverse);
        }
        if let Some(cursor) = end_cursor {
            let packed = self.subspace.pack(&encode_path(&cursor.key.path)?);
            bounds.apply_end_cursor(&packed, cursor.start_inclusive, reverse);
        }

        Ok(bounds.finish(&subspace))
    }
}

// The one path of an equality-only `__key__` filter group.
fn single_equality(filter_prop: &FilterProperty) -> Result<&KeyPath, InternalError> {
    match filter_prop.filters.as_slice() {
        [(_, value)] => key_filter_path(value),
        _ => Err(InternalError::unsupported(
            ErrorOrigin::Index,
            format!(
                "multiple equality values for '{}' need a merge join",
                filter_prop.name
            ),
        )),
    }
}
