//! Document container with both item and attribute access
//!
//! `AttrDict` keeps a single BSON document behind two views. Item access
//! (`item`, `set_item`, `del_item`) reports a missing key as
//! [`MinimongoError::Key`]; attribute access (`attr`, `set_attr`,
//! `del_attr`) reports it as [`MinimongoError::Attribute`]. Both views read
//! and write the same storage.
//!
//! Every write goes through the optional [`FieldMap`], including documents
//! loaded from the database.

use crate::validation::ValidatedFieldName;
use crate::Result;
use bson::{Bson, Document as BsonDocument};
use minimongo_common::MinimongoError;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&str, &Bson) -> bool + Send + Sync>;
type Transform = Arc<dyn Fn(Bson) -> Bson + Send + Sync>;

#[derive(Clone)]
struct FieldRule {
    matches: Predicate,
    apply: Transform,
}

/// Ordered list of value rewrites applied on every write.
///
/// Each rule is a predicate over `(key, value)` and a transform over the
/// value. Rules run in declaration order; a rule sees the output of the
/// rules before it.
#[derive(Clone, Default)]
pub struct FieldMap {
    rules: Vec<FieldRule>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule
    pub fn rule<P, T>(mut self, matches: P, apply: T) -> Self
    where
        P: Fn(&str, &Bson) -> bool + Send + Sync + 'static,
        T: Fn(Bson) -> Bson + Send + Sync + 'static,
    {
        self.rules.push(FieldRule {
            matches: Arc::new(matches),
            apply: Arc::new(apply),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Runs every matching rule over `value`
    pub fn map(&self, key: &str, value: Bson) -> Bson {
        self.rules.iter().fold(value, |value, rule| {
            if (rule.matches)(key, &value) {
                (rule.apply)(value)
            } else {
                value
            }
        })
    }
}

impl fmt::Debug for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMap")
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// A BSON document with dict-style and attribute-style access
#[derive(Clone, Default)]
pub struct AttrDict {
    inner: BsonDocument,
    field_map: FieldMap,
}

impl AttrDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a container whose writes go through `field_map`.
    ///
    /// The initial document is written entry by entry, so the mapping
    /// applies to it as well.
    pub fn with_field_map(doc: BsonDocument, field_map: FieldMap) -> Self {
        let mut dict = Self {
            inner: BsonDocument::new(),
            field_map,
        };
        dict.update(doc);
        dict
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    // Item access

    /// Returns the value under `key`
    pub fn item(&self, key: &str) -> Result<&Bson> {
        self.inner
            .get(key)
            .ok_or_else(|| MinimongoError::Key(key.to_string()))
    }

    /// Stores `value` under `key` after field mapping
    pub fn set_item(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        let key = key.into();
        let value = self.field_map.map(&key, value.into());
        self.inner.insert(key, value);
    }

    /// Removes `key`, returning its value
    pub fn del_item(&mut self, key: &str) -> Result<Bson> {
        self.inner
            .remove(key)
            .ok_or_else(|| MinimongoError::Key(key.to_string()))
    }

    // Attribute access

    /// Returns the value of attribute `name`
    pub fn attr(&self, name: &str) -> Result<&Bson> {
        self.inner
            .get(name)
            .ok_or_else(|| MinimongoError::Attribute(name.to_string()))
    }

    /// Sets attribute `name`
    pub fn set_attr(&mut self, name: &str, value: impl Into<Bson>) -> Result<()> {
        let name = ValidatedFieldName::attribute(name)
            .map_err(|e| MinimongoError::Attribute(e.to_string()))?;
        self.set_item(name.into_string(), value);
        Ok(())
    }

    /// Removes attribute `name`, returning its value
    pub fn del_attr(&mut self, name: &str) -> Result<Bson> {
        self.inner
            .remove(name)
            .ok_or_else(|| MinimongoError::Attribute(name.to_string()))
    }

    /// Returns attribute `name` as a nested container.
    ///
    /// The nested container shares this container's field map.
    pub fn attr_dict(&self, name: &str) -> Result<AttrDict> {
        match self.attr(name)? {
            Bson::Document(doc) => Ok(AttrDict {
                inner: doc.clone(),
                field_map: self.field_map.clone(),
            }),
            other => Err(MinimongoError::Attribute(format!(
                "'{}' is not a document (found {:?})",
                name,
                other.element_type()
            ))),
        }
    }

    /// Walks a dotted path through nested documents, `"y.z"` for `d.y.z`
    pub fn path(&self, path: &str) -> Result<&Bson> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.attr(first)?;

        for segment in segments {
            current = match current {
                Bson::Document(doc) => doc
                    .get(segment)
                    .ok_or_else(|| MinimongoError::Attribute(path.to_string()))?,
                _ => return Err(MinimongoError::Attribute(path.to_string())),
            };
        }

        Ok(current)
    }

    /// Writes through a dotted path, creating missing intermediate
    /// documents. The field map sees the top-level key.
    pub fn set_path(&mut self, path: &str, value: impl Into<Bson>) -> Result<()> {
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments {
            ValidatedFieldName::attribute(segment)
                .map_err(|e| MinimongoError::Attribute(e.to_string()))?;
        }

        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => return Err(MinimongoError::Attribute(path.to_string())),
        };

        if parents.is_empty() {
            self.set_item(*last, value);
            return Ok(());
        }

        let top = parents[0];
        let mut root = match self.inner.get(top) {
            Some(Bson::Document(doc)) => doc.clone(),
            Some(_) => return Err(MinimongoError::Attribute(path.to_string())),
            None => BsonDocument::new(),
        };

        let mut current = &mut root;
        for segment in &parents[1..] {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Bson::Document(BsonDocument::new()));
            current = match entry {
                Bson::Document(doc) => doc,
                _ => return Err(MinimongoError::Attribute(path.to_string())),
            };
        }
        current.insert(*last, value.into());

        self.set_item(top, root);
        Ok(())
    }

    /// Merges `other` into this container; values from `other` win
    pub fn update(&mut self, other: BsonDocument) {
        for (key, value) in other {
            self.set_item(key, value);
        }
    }

    pub fn as_document(&self) -> &BsonDocument {
        &self.inner
    }

    pub fn into_document(self) -> BsonDocument {
        self.inner
    }

    /// Merges values that already went through the field map
    pub(crate) fn merge_mapped(&mut self, doc: BsonDocument) {
        for (key, value) in doc {
            self.inner.insert(key, value);
        }
    }
}

impl Deref for AttrDict {
    type Target = BsonDocument;

    fn deref(&self) -> &BsonDocument {
        &self.inner
    }
}

impl From<BsonDocument> for AttrDict {
    fn from(doc: BsonDocument) -> Self {
        Self {
            inner: doc,
            field_map: FieldMap::default(),
        }
    }
}

impl From<AttrDict> for BsonDocument {
    fn from(dict: AttrDict) -> Self {
        dict.inner
    }
}

impl From<AttrDict> for Bson {
    fn from(dict: AttrDict) -> Self {
        Bson::Document(dict.inner)
    }
}

impl<K: Into<String>> FromIterator<(K, Bson)> for AttrDict {
    fn from_iter<I: IntoIterator<Item = (K, Bson)>>(iter: I) -> Self {
        let mut dict = AttrDict::new();
        for (key, value) in iter {
            dict.set_item(key, value);
        }
        dict
    }
}

impl IntoIterator for AttrDict {
    type Item = (String, Bson);
    type IntoIter = bson::document::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl PartialEq for AttrDict {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl PartialEq<BsonDocument> for AttrDict {
    fn eq(&self, other: &BsonDocument) -> bool {
        &self.inner == other
    }
}

impl fmt::Debug for AttrDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttrDict({:?})", self.inner)
    }
}

impl fmt::Display for AttrDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}
