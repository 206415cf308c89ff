//! In-memory [`DocumentStore`] backed by [`DashMap`].
//!
//! Evaluates the subset of the filter language the document renderer
//! emits (`$and`, `$or`, comparisons, `$in`, `$regex`), sorts with the
//! server's cross-type ordering and windows with skip/limit.

use std::cmp::Ordering;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use dashmap::DashMap;
use quarry_core::compile::document::{DocumentQuery, IDENTITY_FIELD};
use quarry_core::sanitize::bson_to_json;
use rand::seq::IndexedRandom;
use regex::RegexBuilder;

use crate::traits::{DocumentStore, IndexInfo, StorageStats};

const DEFAULT_INDEX: &str = "_id_";

/// Collections of documents held in memory.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, Vec<Document>>,
    indexes: DashMap<String, Vec<IndexInfo>>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Canonical type rank, lowest first.
fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null | Bson::Undefined) => 0,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => 1,
        Some(Bson::String(_) | Bson::Symbol(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::ObjectId(_)) => 5,
        Some(Bson::Boolean(_)) => 6,
        Some(Bson::DateTime(_)) => 7,
        Some(_) => 8,
    }
}

/// Orders two values of the same rank; `None` for ranks it cannot order.
fn compare_same_rank(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => as_f64(a).zip(as_f64(b)).and_then(|(x, y)| x.partial_cmp(&y)),
    }
}

fn sort_order(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_same_rank(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Comparison operators only match values of the same type class.
fn compare(value: Option<&Bson>, operand: &Bson) -> Option<Ordering> {
    let value = value?;
    if type_rank(Some(value)) != type_rank(Some(operand)) {
        return None;
    }
    compare_same_rank(value, operand)
}

fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
    match (value, operand) {
        (None | Some(Bson::Null), Bson::Null) => true,
        (None, _) => false,
        (Some(v), o) => compare(Some(v), o) == Some(Ordering::Equal) || v == o,
    }
}

fn regex_matches(value: Option<&Bson>, pattern: &Bson, options: &str) -> bool {
    let (Some(Bson::String(text)), Bson::String(pattern)) = (value, pattern) else {
        return false;
    };
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .build()
        .is_ok_and(|re| re.is_match(text))
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> bool {
    let Bson::Document(ops) = condition else {
        return equals(value, condition);
    };
    if !ops.keys().any(|key| key.starts_with('$')) {
        return equals(value, condition);
    }

    let options = ops.get_str("$options").unwrap_or("");
    ops.iter().all(|(op, operand)| match op.as_str() {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => compare(value, operand) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$lt" => compare(value, operand) == Some(Ordering::Less),
        "$lte" => matches!(compare(value, operand), Some(Ordering::Less | Ordering::Equal)),
        "$in" => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equals(value, item))),
        "$regex" => regex_matches(value, operand, options),
        "$options" => true,
        _ => false,
    })
}

fn subfilters(value: &Bson) -> impl Iterator<Item = &Document> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Bson::as_document)
}

/// Whether `doc` satisfies `filter`.
#[must_use]
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => subfilters(condition).all(|sub| matches(doc, sub)),
        "$or" => subfilters(condition).any(|sub| matches(doc, sub)),
        field => field_matches(doc.get(field), condition),
    })
}

fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let order = sort_order(a.get(field), b.get(field));
            let descending = as_f64(direction).is_some_and(|d| d < 0.0);
            let order = if descending { order.reverse() } else { order };
            if order != Ordering::Equal {
                return order;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn sample_field_names(
        &self,
        collection: &str,
        sample_size: u32,
    ) -> anyhow::Result<Vec<String>> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut names: Vec<String> = Vec::new();
        for doc in docs.choose_multiple(&mut rand::rng(), sample_size as usize) {
            for key in doc.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        Ok(names)
    }

    async fn find_one(&self, collection: &str) -> anyhow::Result<Option<Document>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.first().cloned()))
    }

    async fn count(&self, collection: &str, filter: &Document) -> anyhow::Result<u64> {
        Ok(self.collections.get(collection).map_or(0, |docs| {
            docs.iter().filter(|doc| matches(doc, filter)).count() as u64
        }))
    }

    async fn find(&self, collection: &str, query: &DocumentQuery) -> anyhow::Result<Vec<Document>> {
        let mut hits: Vec<Document> = self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches(doc, &query.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        sort_documents(&mut hits, &query.sort);

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = if query.limit > 0 {
            usize::try_from(query.limit).unwrap_or(usize::MAX)
        } else {
            usize::MAX
        };
        Ok(hits.into_iter().skip(skip).take(limit).collect())
    }

    async fn list_collections(&self) -> anyhow::Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> anyhow::Result<u64> {
        let count = documents.len() as u64;
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        for mut doc in documents {
            if !doc.contains_key(IDENTITY_FIELD) {
                doc.insert(IDENTITY_FIELD, ObjectId::new());
            }
            docs.push(doc);
        }
        Ok(count)
    }

    async fn storage_stats(&self, collection: &str) -> anyhow::Result<StorageStats> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(StorageStats::default());
        };
        let mut size = 0_i64;
        for doc in docs.iter() {
            size += i64::try_from(bson::to_vec(doc)?.len())?;
        }
        let count = i64::try_from(docs.len())?;
        Ok(StorageStats {
            size_bytes: size,
            storage_size_bytes: size,
            avg_doc_size: if count == 0 { 0 } else { size / count },
        })
    }

    async fn list_indexes(&self, collection: &str) -> anyhow::Result<Vec<IndexInfo>> {
        let mut key = Document::new();
        key.insert(IDENTITY_FIELD, 1);
        let mut indexes = vec![IndexInfo {
            name: Some(DEFAULT_INDEX.to_string()),
            key: bson_to_json(Bson::Document(key)),
            unique: false,
            sparse: false,
        }];
        if let Some(created) = self.indexes.get(collection) {
            indexes.extend(created.iter().cloned());
        }
        Ok(indexes)
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        direction: i32,
    ) -> anyhow::Result<String> {
        let name = format!("{field}_{direction}");
        let mut key = Document::new();
        key.insert(field, direction);

        let mut indexes = self.indexes.entry(collection.to_string()).or_default();
        if !indexes.iter().any(|index| index.name.as_deref() == Some(name.as_str())) {
            indexes.push(IndexInfo {
                name: Some(name.clone()),
                key: bson_to_json(Bson::Document(key)),
                unique: false,
                sparse: false,
            });
        }
        Ok(name)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn books() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        store
            .insert_many(
                "books",
                vec![
                    doc! { "title": "Deep Space", "published_year": 2015_i64 },
                    doc! { "title": "Deep Space", "published_year": 2005_i64 },
                    doc! { "title": "Tides", "published_year": 2012_i32 },
                    doc! { "title": "Untitled" },
                ],
            )
            .await
            .unwrap();
        store
    }

    fn query(filter: Document, sort: Document) -> DocumentQuery {
        DocumentQuery {
            filter,
            sort,
            skip: 0,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn evaluates_comparisons_across_integer_widths() {
        let store = books().await;
        let count = store
            .count("books", &doc! { "published_year": { "$gte": 2010_i64 } })
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn evaluates_and_or_regex() {
        let store = books().await;
        let filter = doc! {
            "$and": [
                { "$or": [ { "title": { "$regex": "space", "$options": "i" } } ] },
                { "published_year": { "$gte": 2010_i64 } }
            ]
        };
        let hits = store.find("books", &query(filter, Document::new())).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get_i64("published_year").unwrap(), 2015);
    }

    #[tokio::test]
    async fn null_equality_matches_missing_fields() {
        let store = books().await;
        let count = store
            .count("books", &doc! { "published_year": { "$eq": Bson::Null } })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn sorts_missing_values_first_and_windows() {
        let store = books().await;
        let mut q = query(Document::new(), doc! { "published_year": 1 });
        q.skip = 1;
        q.limit = 2;
        let hits = store.find("books", &q).await.unwrap();
        let years: Vec<i64> = hits
            .iter()
            .map(|d| match d.get("published_year") {
                Some(Bson::Int64(n)) => *n,
                Some(Bson::Int32(n)) => i64::from(*n),
                other => panic!("unexpected year {other:?}"),
            })
            .collect();
        assert_eq!(years, vec![2005, 2012]);
    }

    #[tokio::test]
    async fn assigns_identity_and_lists_collections() {
        let store = books().await;
        let first = store.find_one("books").await.unwrap().unwrap();
        assert!(first.get_object_id(IDENTITY_FIELD).is_ok());
        assert_eq!(store.list_collections().await.unwrap(), vec!["books"]);
        assert!(store.find_one("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn index_creation_is_idempotent() {
        let store = books().await;
        store.create_index("books", "title", 1).await.unwrap();
        store.create_index("books", "title", 1).await.unwrap();
        let indexes = store.list_indexes("books").await.unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[1].name.as_deref(), Some("title_1"));
    }
}
