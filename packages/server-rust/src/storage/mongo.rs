//! [`DocumentStore`] backed by `MongoDB`.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::{Client, Collection, Database, IndexModel};
use quarry_core::compile::document::DocumentQuery;
use quarry_core::sanitize::bson_to_json;
use tracing::info;

use crate::service::config::MongoConfig;
use crate::traits::{DocumentStore, IndexInfo, StorageStats};

/// Shares one long-lived client across all requests.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Parses the URI and builds the client. The driver connects lazily, so
    /// an unreachable server is only reported by the first operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is invalid.
    pub async fn connect(config: &MongoConfig) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(&config.uri).await?;
        info!(database = %config.database, "MongoDB client created");
        Ok(Self {
            db: client.database(&config.database),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number(doc: &Document, key: &str) -> i64 {
    match doc.get(key) {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn sample_field_names(
        &self,
        collection: &str,
        sample_size: u32,
    ) -> anyhow::Result<Vec<String>> {
        let pipeline = vec![
            doc! { "$sample": { "size": i64::from(sample_size) } },
            doc! { "$project": { "pairs": { "$objectToArray": "$$ROOT" } } },
            doc! { "$unwind": "$pairs" },
            doc! { "$group": { "_id": Bson::Null, "keys": { "$addToSet": "$pairs.k" } } },
        ];

        let mut cursor = self.collection(collection).aggregate(pipeline).await?;
        let Some(group) = cursor.try_next().await? else {
            return Ok(Vec::new());
        };

        let keys = group
            .get_array("keys")
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| key.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(keys)
    }

    async fn find_one(&self, collection: &str) -> anyhow::Result<Option<Document>> {
        Ok(self.collection(collection).find_one(doc! {}).await?)
    }

    async fn count(&self, collection: &str, filter: &Document) -> anyhow::Result<u64> {
        Ok(self
            .collection(collection)
            .count_documents(filter.clone())
            .await?)
    }

    async fn find(&self, collection: &str, query: &DocumentQuery) -> anyhow::Result<Vec<Document>> {
        let coll = self.collection(collection);
        let mut find = coll
            .find(query.filter.clone())
            .skip(query.skip)
            .limit(query.limit);
        if !query.sort.is_empty() {
            find = find.sort(query.sort.clone());
        }
        let cursor = find.await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_collections(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.db.list_collection_names().await?)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> anyhow::Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let result = self.collection(collection).insert_many(documents).await?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn storage_stats(&self, collection: &str) -> anyhow::Result<StorageStats> {
        let stats = self.db.run_command(doc! { "collStats": collection }).await?;
        Ok(StorageStats {
            size_bytes: number(&stats, "size"),
            storage_size_bytes: number(&stats, "storageSize"),
            avg_doc_size: number(&stats, "avgObjSize"),
        })
    }

    async fn list_indexes(&self, collection: &str) -> anyhow::Result<Vec<IndexInfo>> {
        let models: Vec<IndexModel> = self
            .collection(collection)
            .list_indexes()
            .await?
            .try_collect()
            .await?;

        Ok(models
            .into_iter()
            .map(|model| {
                let options = model.options.unwrap_or_default();
                IndexInfo {
                    name: options.name,
                    key: bson_to_json(Bson::Document(model.keys)),
                    unique: options.unique.unwrap_or(false),
                    sparse: options.sparse.unwrap_or(false),
                }
            })
            .collect())
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        direction: i32,
    ) -> anyhow::Result<String> {
        let mut keys = Document::new();
        keys.insert(field, direction);
        let model = IndexModel::builder().keys(keys).build();
        let created = self.collection(collection).create_index(model).await?;
        Ok(created.index_name)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
