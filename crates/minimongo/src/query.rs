//! Query builder and typed cursor for model collections

use crate::collection::Collection;
use crate::model::Model;
use crate::Result;
use bson::Document as BsonDocument;
use futures::TryStreamExt;
use mongodb::options::{CountOptions, FindOptions};
use std::ops::{Bound, RangeBounds};

/// Query builder for find operations, returning model instances
pub struct Find<M: Model> {
    collection: Collection<M>,
    filter: BsonDocument,
    sort: Option<BsonDocument>,
    skip: Option<u64>,
    limit: Option<i64>,
    projection: Option<BsonDocument>,
    /// Set by an empty `range`; the query matches nothing
    empty: bool,
}

impl<M: Model> Find<M> {
    pub(crate) fn new(collection: Collection<M>, filter: BsonDocument) -> Self {
        Self {
            collection,
            filter,
            sort: None,
            skip: None,
            limit: None,
            projection: None,
            empty: false,
        }
    }

    /// Set the filter document
    pub fn filter(mut self, filter: BsonDocument) -> Self {
        self.filter = filter;
        self
    }

    /// Set the sort order
    pub fn sort(mut self, sort: BsonDocument) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the number of documents to skip
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the maximum number of documents to return
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Only return these fields
    pub fn projection(mut self, projection: BsonDocument) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Restrict results by position, like slicing a list:
    /// `..2` keeps the first two, `2..` drops them. An empty or inverted
    /// range matches nothing.
    pub fn range(mut self, range: impl RangeBounds<u64>) -> Self {
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => Some(n.saturating_add(1)),
            Bound::Excluded(&n) => Some(n),
            Bound::Unbounded => None,
        };

        self.skip = (start > 0).then_some(start);
        self.limit = None;
        self.empty = false;
        if let Some(end) = end {
            // A limit of 0 means "no limit" to the server
            match end.checked_sub(start) {
                Some(len) if len > 0 => {
                    self.limit = Some(i64::try_from(len).unwrap_or(i64::MAX));
                }
                _ => self.empty = true,
            }
        }
        self
    }

    /// Get the collection name
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Get the filter document
    pub fn get_filter(&self) -> &BsonDocument {
        &self.filter
    }

    /// Get the sort document
    pub fn get_sort(&self) -> Option<&BsonDocument> {
        self.sort.as_ref()
    }

    /// Get the skip value
    pub fn get_skip(&self) -> Option<u64> {
        self.skip
    }

    /// Get the limit value
    pub fn get_limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn get_projection(&self) -> Option<&BsonDocument> {
        self.projection.as_ref()
    }

    /// True when the query was restricted to an empty range
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    fn find_options(&self) -> FindOptions {
        let mut options = FindOptions::default();
        options.sort = self.sort.clone();
        options.skip = self.skip;
        options.limit = self.limit;
        options.projection = self.projection.clone();
        options
    }

    /// Execute the query and return a cursor over model instances
    pub async fn cursor(self) -> Result<Cursor<M>> {
        let binding = self.collection.binding();
        let collection = binding.driver_collection("find")?;
        if self.empty {
            return Ok(Cursor {
                inner: None,
                collection: self.collection,
            });
        }
        binding.prepare().await?;

        let options = self.find_options();
        let inner = collection.find(self.filter).with_options(options).await?;

        Ok(Cursor {
            inner: Some(inner),
            collection: self.collection,
        })
    }

    /// Execute the query and return all matching documents
    pub async fn to_list(self) -> Result<Vec<M>> {
        self.cursor().await?.collect().await
    }

    /// First matching document, if any
    pub async fn first(self) -> Result<Option<M>> {
        self.limit(1).cursor().await?.next().await
    }

    /// Document at position `index` within the results, if any
    pub async fn nth(self, index: u64) -> Result<Option<M>> {
        if let Some(limit) = self.limit {
            if limit > 0 && index >= limit.unsigned_abs() {
                return Ok(None);
            }
        }
        let Some(skip) = self.skip.unwrap_or(0).checked_add(index) else {
            return Ok(None);
        };
        self.skip(skip).first().await
    }

    /// Count matching documents.
    ///
    /// With `with_limit_and_skip`, skip and limit set on this query are
    /// taken into account.
    pub async fn count(&self, with_limit_and_skip: bool) -> Result<u64> {
        let binding = self.collection.binding();
        let collection = binding.driver_collection("count")?;
        if self.empty && with_limit_and_skip {
            return Ok(0);
        }
        binding.prepare().await?;

        let mut options = CountOptions::default();
        if with_limit_and_skip {
            options.skip = self.skip;
            options.limit = self.limit.map(|limit| limit.unsigned_abs());
        }

        let count = collection
            .count_documents(self.filter.clone())
            .with_options(options)
            .await?;
        Ok(count)
    }
}

/// Cursor yielding model instances.
///
/// Each document goes through the model's field map on the way out.
pub struct Cursor<M: Model> {
    /// `None` for queries that match nothing by construction
    inner: Option<mongodb::Cursor<BsonDocument>>,
    collection: Collection<M>,
}

impl<M: Model> Cursor<M> {
    /// Next model instance, or `None` when exhausted
    pub async fn next(&mut self) -> Result<Option<M>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        match inner.try_next().await? {
            Some(doc) => Ok(Some(self.collection.wrap(doc))),
            None => Ok(None),
        }
    }

    /// Drain the cursor
    pub async fn collect(mut self) -> Result<Vec<M>> {
        let mut results = Vec::new();
        while let Some(item) = self.next().await? {
            results.push(item);
        }
        Ok(results)
    }
}
