use crate::{
    db::{
        index::{IndexEntry, QueryIndex},
        iter::ResultIterator,
        store::{KeySelector, Transaction, Versionstamp},
    },
    error::InternalError,
};

///
/// IndexIterator
///
/// Pages of decoded index entries visible at one read versionstamp.
/// Skipped entries do not count toward the fetch limit: each one extends
/// the underlying scan by a row.
///

pub struct IndexIterator<'a, T: Transaction + ?Sized> {
    index: QueryIndex,
    inner: ResultIterator<'a, T>,
    read_vs: Option<Versionstamp>,
}

impl<'a, T: Transaction + ?Sized> IndexIterator<'a, T> {
    #[must_use]
    pub fn new(
        tr: &'a T,
        index: QueryIndex,
        begin: KeySelector,
        end: KeySelector,
        fetch_limit: usize,
        reverse: bool,
        read_vs: Option<Versionstamp>,
    ) -> Self {
        let inner = ResultIterator::new(tr, begin, end)
            .with_limit(fetch_limit)
            .reversed(reverse)
            .snapshot(true);

        Self {
            index,
            inner,
            read_vs,
        }
    }

    #[must_use]
    pub const fn index(&self) -> &QueryIndex {
        &self.index
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// Next page of visible entries and whether another page may follow.
    pub async fn next_page(&mut self) -> Result<(Vec<IndexEntry>, bool), InternalError> {
        let page = self.inner.next_page().await?;

        let mut entries = Vec::with_capacity(page.kvs.len());
        for kv in &page.kvs {
            let entry = self.index.decode(kv)?;
            if entry.is_visible(self.read_vs) {
                entries.push(entry);
            } else if self.inner.limit() > 0 {
                self.inner.increase_limit(1);
            }
        }

        Ok((entries, !self.inner.is_done()))
    }

    /// Every remaining visible entry.
    pub async fn list(mut self) -> Result<Vec<IndexEntry>, InternalError> {
        let mut entries = Vec::new();
        while !self.inner.is_done() {
            let (page, _) = self.next_page().await?;
            entries.extend(page);
        }

        Ok(entries)
    }
}
