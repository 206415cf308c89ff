//! Query service for the document store.
//!
//! Fields are discovered per call by sampling, so a collection's schema can
//! drift between requests without any cache to invalidate.

use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_core::compile::document::{self, DocumentQuery};
use quarry_core::sanitize::{bson_to_json, sanitize_documents};
use quarry_core::{PageResult, QueryError, QueryPlan, QueryRequest, Row, SchemaView, SortOrder, StoreKind};
use serde::Serialize;
use tracing::info;

use super::config::GatewayConfig;
use super::observe;
use super::stats::{field_stats, FieldStats};
use crate::traits::{DocumentStore, IndexInfo, StorageStats};

const STORE: StoreKind = StoreKind::Document;
const SYSTEM_PREFIX: &str = "system.";
const INTERNAL_PREFIX: char = '_';

/// Statistics for one collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub collection_name: String,
    pub total_documents: u64,
    pub total_fields: usize,
    pub fields: Vec<String>,
    pub field_stats: BTreeMap<String, FieldStats>,
    #[serde(flatten)]
    pub storage: StorageStats,
}

/// Pagination, search, filter and sort over `MongoDB` collections.
pub struct DocumentQueryService {
    store: Arc<dyn DocumentStore>,
    config: GatewayConfig,
}

fn public_keys<'a>(keys: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut names: Vec<String> = keys
        .into_iter()
        .filter(|key| !key.starts_with(INTERNAL_PREFIX))
        .cloned()
        .collect();
    names.sort();
    names.dedup();
    names
}

impl DocumentQueryService {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: GatewayConfig) -> Self {
        Self { store, config }
    }

    /// Shared store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn failed<'a>(target: &'a str, operation: &'static str) -> impl FnOnce(anyhow::Error) -> QueryError + 'a {
        move |source| QueryError::execution(STORE, target, operation, source)
    }

    /// Top-level field names of `collection`, sorted, without keys that
    /// start with `_`. Samples first, then falls back to one document.
    /// Empty when the collection has no documents.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Execution`] if the store fails.
    pub async fn discover_fields(&self, collection: &str) -> Result<SchemaView, QueryError> {
        let sampled = self
            .store
            .sample_field_names(collection, self.config.discovery_sample_size)
            .await
            .map_err(Self::failed(collection, "sample fields of"))?;

        let mut names = public_keys(&sampled);
        if names.is_empty() {
            let doc = self
                .store
                .find_one(collection)
                .await
                .map_err(Self::failed(collection, "read a document from"))?;
            if let Some(doc) = doc {
                names = public_keys(doc.keys());
            }
        }
        Ok(SchemaView::from_names(names))
    }

    async fn discover_required(&self, collection: &str) -> Result<SchemaView, QueryError> {
        let schema = self.discover_fields(collection).await?;
        if schema.is_empty() {
            return Err(QueryError::not_found(STORE, collection));
        }
        Ok(schema)
    }

    /// Runs one paginated query against `collection`.
    ///
    /// # Errors
    ///
    /// [`QueryError::Validation`] for a malformed request,
    /// [`QueryError::NotFound`] when the collection has no discoverable
    /// fields, [`QueryError::Execution`] when the store fails.
    pub async fn query_collection(
        &self,
        collection: &str,
        request: &QueryRequest,
    ) -> Result<PageResult, QueryError> {
        observe(STORE, collection, "query", async {
            request.validate()?;
            let schema = self.discover_required(collection).await?;
            let plan = QueryPlan::build(request, &schema)?;
            let query = document::compile_query(&plan);

            let total_count = self
                .store
                .count(collection, &query.filter)
                .await
                .map_err(Self::failed(collection, "count documents in"))?;
            let docs = self
                .store
                .find(collection, &query)
                .await
                .map_err(Self::failed(collection, "find documents in"))?;

            Ok(PageResult::assemble(
                sanitize_documents(docs),
                total_count,
                &plan.pagination,
            ))
        })
        .await
    }

    /// Collection names, without `system.` collections.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Execution`] if the store fails.
    pub async fn list_collections(&self) -> Result<Vec<String>, QueryError> {
        let names = self
            .store
            .list_collections()
            .await
            .map_err(Self::failed("*", "list collections of"))?;
        Ok(names
            .into_iter()
            .filter(|name| !name.starts_with(SYSTEM_PREFIX))
            .collect())
    }

    /// Document count, fields and per-field statistics over the first
    /// documents of the collection.
    ///
    /// # Errors
    ///
    /// [`QueryError::NotFound`] when the collection has no discoverable
    /// fields, [`QueryError::Execution`] when the store fails.
    pub async fn collection_stats(&self, collection: &str) -> Result<CollectionStats, QueryError> {
        observe(STORE, collection, "stats", async {
            let schema = self.discover_required(collection).await?;
            let total_documents = self
                .store
                .count(collection, &bson::Document::new())
                .await
                .map_err(Self::failed(collection, "count documents in"))?;

            let sample = DocumentQuery {
                filter: bson::Document::new(),
                sort: bson::Document::new(),
                skip: 0,
                limit: i64::from(self.config.stats_sample_size),
            };
            let docs = self
                .store
                .find(collection, &sample)
                .await
                .map_err(Self::failed(collection, "sample documents in"))?;
            let rows: Vec<Row> = docs
                .into_iter()
                .map(|doc| match bson_to_json(bson::Bson::Document(doc)) {
                    serde_json::Value::Object(row) => row,
                    _ => Row::new(),
                })
                .collect();

            let storage = self
                .store
                .storage_stats(collection)
                .await
                .map_err(Self::failed(collection, "read storage statistics of"))?;

            let fields: Vec<String> = schema.names().map(str::to_string).collect();
            Ok(CollectionStats {
                collection_name: collection.to_string(),
                total_documents,
                total_fields: fields.len(),
                field_stats: field_stats(schema.names(), &rows),
                fields,
                storage,
            })
        })
        .await
    }

    /// Indexes defined on `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Execution`] if the store fails.
    pub async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, QueryError> {
        self.store
            .list_indexes(collection)
            .await
            .map_err(Self::failed(collection, "list indexes of"))
    }

    /// Creates a single-field index.
    ///
    /// # Errors
    ///
    /// [`QueryError::Validation`] for an empty field name,
    /// [`QueryError::Execution`] when the store fails.
    pub async fn create_index(
        &self,
        collection: &str,
        field: &str,
        order: SortOrder,
    ) -> Result<String, QueryError> {
        let field = field.trim();
        if field.is_empty() {
            return Err(QueryError::validation("Field name is required"));
        }
        let name = self
            .store
            .create_index(collection, field, order.as_document_direction())
            .await
            .map_err(Self::failed(collection, "create an index on"))?;
        info!(collection, field, index = %name, "index created");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDocumentStore;
    use bson::{doc, Document};
    use serde_json::json;

    async fn service_with(collection: &str, docs: Vec<Document>) -> DocumentQueryService {
        let store = MemoryDocumentStore::new();
        store.insert_many(collection, docs).await.unwrap();
        DocumentQueryService::new(Arc::new(store), GatewayConfig::default())
    }

    async fn books(n: i64) -> DocumentQueryService {
        let docs = (1..=n)
            .map(|i| doc! { "title": format!("Book {i}"), "n": i, "published_year": 1990 + i })
            .collect();
        service_with("books", docs).await
    }

    fn request(value: serde_json::Value) -> QueryRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn third_page_of_twenty_five() {
        let service = books(25).await;
        let page = service
            .query_collection("books", &request(json!({"page": 3, "limit": 10})))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 5);
        assert_eq!(page.total_count, 25);
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next);
        assert!(page.has_previous);
        assert_eq!(page.data[0]["n"], json!(21));
        assert!(page.data.iter().all(|row| !row.contains_key("_id")));
    }

    #[tokio::test]
    async fn filter_and_search_combine() {
        let service = service_with(
            "books",
            vec![
                doc! { "title": "Deep Space", "published_year": 2015_i64 },
                doc! { "title": "Deep Space", "published_year": 2005_i64 },
                doc! { "title": "Shallow Water", "published_year": 2018_i64 },
            ],
        )
        .await;
        let page = service
            .query_collection(
                "books",
                &request(json!({
                    "filters": {"published_year": {"gte": 2010}},
                    "search": "space",
                    "search_columns": ["title"]
                })),
            )
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0]["published_year"], json!(2015));
    }

    #[tokio::test]
    async fn unknown_fields_change_nothing() {
        let service = books(12).await;
        let with_unknown = service
            .query_collection(
                "books",
                &request(json!({
                    "filters": {"ghost": {"eq": 1}, "n": {"lte": 4}},
                    "search_columns": ["ghost"],
                    "search": "Book",
                    "sort_by": "ghost"
                })),
            )
            .await
            .unwrap();
        let without = service
            .query_collection("books", &request(json!({"filters": {"n": {"lte": 4}}})))
            .await
            .unwrap();
        assert_eq!(with_unknown, without);
        assert_eq!(without.total_count, 4);
    }

    #[tokio::test]
    async fn sort_fallback_is_stable_insertion_order() {
        let service = books(5).await;
        let first = service
            .query_collection("books", &request(json!({"sort_by": "ghost"})))
            .await
            .unwrap();
        let second = service
            .query_collection("books", &request(json!({})))
            .await
            .unwrap();
        assert_eq!(first, second);
        let ns: Vec<_> = first.data.iter().map(|row| row["n"].clone()).collect();
        assert_eq!(ns, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    }

    #[tokio::test]
    async fn explicit_descending_sort() {
        let service = books(5).await;
        let page = service
            .query_collection(
                "books",
                &request(json!({"sort_by": "n", "sort_order": "desc", "limit": 2})),
            )
            .await
            .unwrap();
        assert_eq!(page.data[0]["n"], json!(5));
        assert_eq!(page.data[1]["n"], json!(4));
    }

    #[tokio::test]
    async fn eq_on_every_field_returns_the_row() {
        let service = books(8).await;
        let page = service
            .query_collection(
                "books",
                &request(json!({
                    "filters": {"n": {"eq": 6}, "published_year": {"eq": 1996}, "title": {"eq": "Book 6"}}
                })),
            )
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(
            page.data[0],
            json!({"title": "Book 6", "n": 6, "published_year": 1996})
                .as_object()
                .cloned()
                .unwrap()
        );
    }

    #[tokio::test]
    async fn in_with_non_list_is_ignored() {
        let service = books(3).await;
        let page = service
            .query_collection("books", &request(json!({"filters": {"n": {"in": 2}}})))
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);

        let page = service
            .query_collection("books", &request(json!({"filters": {"n": {"in": [1, 3]}}})))
            .await
            .unwrap();
        assert_eq!(page.total_count, 2);
    }

    #[tokio::test]
    async fn empty_collection_is_not_found() {
        let service = books(0).await;
        let err = service
            .query_collection("books", &QueryRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::NotFound { .. }));
        assert_eq!(err.to_string(), "collection 'books' is empty or not found");
    }

    #[tokio::test]
    async fn invalid_limit_is_rejected() {
        let service = books(3).await;
        let err = service
            .query_collection("books", &request(json!({"limit": 0})))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[tokio::test]
    async fn discovery_skips_internal_keys_and_sorts() {
        let service = service_with(
            "mixed",
            vec![
                doc! { "b": 1, "_meta": 2 },
                doc! { "a": 1, "c": { "nested": true } },
            ],
        )
        .await;
        let schema = service.discover_fields("mixed").await.unwrap();
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stats_report_fields_and_samples() {
        let service = books(3).await;
        let stats = service.collection_stats("books").await.unwrap();
        assert_eq!(stats.total_documents, 3);
        assert_eq!(stats.fields, vec!["n", "published_year", "title"]);
        assert_eq!(stats.field_stats["title"].non_null_count, 3);
        assert_eq!(stats.field_stats["n"].data_type, "integer");
        assert!(stats.storage.size_bytes > 0);
    }

    #[tokio::test]
    async fn list_hides_system_collections() {
        let store = MemoryDocumentStore::new();
        store.insert_many("books", vec![doc! { "a": 1 }]).await.unwrap();
        store.insert_many("system.views", vec![doc! { "a": 1 }]).await.unwrap();
        let service = DocumentQueryService::new(Arc::new(store), GatewayConfig::default());
        assert_eq!(service.list_collections().await.unwrap(), vec!["books"]);
    }

    #[tokio::test]
    async fn index_requires_field_name() {
        let service = books(1).await;
        let err = service
            .create_index("books", "  ", SortOrder::Asc)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        let name = service
            .create_index("books", "title", SortOrder::Desc)
            .await
            .unwrap();
        assert_eq!(name, "title_-1");
        assert_eq!(service.list_indexes("books").await.unwrap().len(), 2);
    }
}
