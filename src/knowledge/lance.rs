// file: src/knowledge/lance.rs
// description: LanceDB knowledge base with one table per tracked repository
// reference: https://docs.rs/lancedb

use crate::config::KnowledgeConfig;
use crate::error::{DocsKbError, Result};
use crate::knowledge::{EmbeddingClient, KnowledgeBase};
use crate::models::{Document, SearchResult, search_result};
use crate::parser::MarkdownParser;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::StreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table, connect};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct LanceKnowledgeBase {
    connection: Connection,
    embeddings: EmbeddingClient,
    parser: MarkdownParser,
    max_embed_chars: usize,
}

impl LanceKnowledgeBase {
    pub async fn new(config: &KnowledgeConfig) -> Result<Self> {
        info!("Connecting to LanceDB at {}", config.uri);

        let connection = connect(&config.uri).execute().await.map_err(|e| {
            DocsKbError::BackendUnavailable(format!("Failed to connect to LanceDB: {}", e))
        })?;

        Ok(Self {
            connection,
            embeddings: EmbeddingClient::new(config)?,
            parser: MarkdownParser::new(),
            max_embed_chars: config.max_embed_chars,
        })
    }

    pub fn documents_schema(embedding_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("repository", DataType::Utf8, false),
            Field::new("branch", DataType::Utf8, false),
            Field::new("path", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, true),
            Field::new("content", DataType::Utf8, false),
            Field::new("sha", DataType::Utf8, false),
            Field::new("size", DataType::UInt64, false),
            Field::new("indexed_at", DataType::Int64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    embedding_dim as i32,
                ),
                false,
            ),
        ]))
    }

    async fn table_exists(&self, base_id: &str) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| DocsKbError::BackendUnavailable(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.iter().any(|name| name == base_id))
    }

    async fn open_table(&self, base_id: &str) -> Result<Table> {
        self.connection
            .open_table(base_id)
            .execute()
            .await
            .map_err(|e| {
                DocsKbError::BackendUnavailable(format!("Failed to open table {}: {}", base_id, e))
            })
    }

    fn create_record_batch(
        schema: Arc<Schema>,
        document: &Document,
        embedding: Vec<f32>,
    ) -> Result<RecordBatch> {
        let dim = embedding.len() as i32;
        let embedding_list =
            FixedSizeListArray::try_new_from_values(Float32Array::from(embedding), dim).map_err(
                |e| DocsKbError::BackendUnavailable(format!("Failed to build embedding: {}", e)),
            )?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![document.id.as_str()])),
                Arc::new(StringArray::from(vec![document.repository.as_str()])),
                Arc::new(StringArray::from(vec![document.branch.as_str()])),
                Arc::new(StringArray::from(vec![document.path.as_str()])),
                Arc::new(StringArray::from(vec![document.name.as_str()])),
                Arc::new(StringArray::from(vec![document.title.as_deref()])),
                Arc::new(StringArray::from(vec![document.content.as_str()])),
                Arc::new(StringArray::from(vec![document.sha.as_str()])),
                Arc::new(UInt64Array::from(vec![document.size])),
                Arc::new(Int64Array::from(vec![document.indexed_at])),
                Arc::new(embedding_list),
            ],
        )
        .map_err(|e| DocsKbError::BackendUnavailable(format!("Failed to build record batch: {}", e)))
    }

    fn results_from_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let paths = string_column(batch, "path")?;
        let names = string_column(batch, "name")?;
        let titles = string_column(batch, "title")?;
        let contents = string_column(batch, "content")?;
        let shas = string_column(batch, "sha")?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut results = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let (score, distance) = match distances {
                Some(dist) => {
                    let d = dist.value(i);
                    (1.0 / (1.0 + d), Some(d))
                }
                None => (1.0, None),
            };

            results.push(SearchResult {
                path: paths.value(i).to_string(),
                name: names.value(i).to_string(),
                title: (!titles.is_null(i)).then(|| titles.value(i).to_string()),
                content: contents.value(i).to_string(),
                sha: shas.value(i).to_string(),
                score,
                distance,
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl KnowledgeBase for LanceKnowledgeBase {
    async fn ensure(&self, base_id: &str) -> Result<()> {
        if self.table_exists(base_id).await? {
            debug!("Table {} already exists", base_id);
            return Ok(());
        }

        let schema = Self::documents_schema(self.embeddings.dimension());
        self.connection
            .create_empty_table(base_id, schema)
            .execute()
            .await
            .map_err(|e| {
                DocsKbError::BackendUnavailable(format!("Failed to create table {}: {}", base_id, e))
            })?;
        info!("Created knowledge base table {}", base_id);
        Ok(())
    }

    async fn upsert(&self, base_id: &str, document: &Document) -> Result<()> {
        let schema = Self::documents_schema(self.embeddings.dimension());
        let text = self
            .parser
            .embedding_text(&document.content, self.max_embed_chars);
        let embedding = self.embeddings.embed(&text).await;
        let batch = Self::create_record_batch(schema.clone(), document, embedding)?;

        if !self.table_exists(base_id).await? {
            self.connection
                .create_table(base_id, RecordBatchIterator::new(vec![Ok(batch)], schema))
                .execute()
                .await
                .map_err(|e| {
                    DocsKbError::BackendUnavailable(format!("Failed to create table: {}", e))
                })?;
            info!("Created knowledge base table {}", base_id);
            return Ok(());
        }

        let table = self.open_table(base_id).await?;
        table
            .delete(&path_predicate(&document.path))
            .await
            .map_err(|e| {
                DocsKbError::BackendUnavailable(format!(
                    "Failed to replace {}: {}",
                    document.path, e
                ))
            })?;
        table
            .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await
            .map_err(|e| {
                DocsKbError::BackendUnavailable(format!("Failed to insert {}: {}", document.path, e))
            })?;

        debug!("Upserted {} into {}", document.path, base_id);
        Ok(())
    }

    async fn remove(&self, base_id: &str, path: &str) -> Result<()> {
        if !self.table_exists(base_id).await? {
            warn!("Table {} does not exist, nothing to remove", base_id);
            return Ok(());
        }

        let table = self.open_table(base_id).await?;
        table.delete(&path_predicate(path)).await.map_err(|e| {
            DocsKbError::BackendUnavailable(format!("Failed to remove {}: {}", path, e))
        })?;

        debug!("Removed {} from {}", path, base_id);
        Ok(())
    }

    async fn search(&self, base_id: &str, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        if !self.table_exists(base_id).await? {
            return Err(DocsKbError::NotFound(format!("knowledge base {}", base_id)));
        }

        let table = self.open_table(base_id).await?;
        let query_embedding = self.embeddings.embed(query).await;

        let mut stream = table
            .vector_search(query_embedding)
            .map_err(|e| {
                DocsKbError::BackendUnavailable(format!("Failed to create vector search: {}", e))
            })?
            .limit(limit)
            .execute()
            .await
            .map_err(|e| DocsKbError::BackendUnavailable(format!("Vector search failed: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream.next().await {
            let batch = batch.map_err(|e| {
                DocsKbError::BackendUnavailable(format!("Failed to read result batch: {}", e))
            })?;
            results.extend(Self::results_from_batch(&batch)?);
        }

        search_result::rank(&mut results);
        info!("Search in {} returned {} results", base_id, results.len());
        Ok(results)
    }

    async fn drop_base(&self, base_id: &str) -> Result<()> {
        if !self.table_exists(base_id).await? {
            debug!("Table {} already absent", base_id);
            return Ok(());
        }

        self.connection.drop_table(base_id).await.map_err(|e| {
            DocsKbError::BackendUnavailable(format!("Failed to drop table {}: {}", base_id, e))
        })?;
        info!("Dropped knowledge base table {}", base_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.connection
            .table_names()
            .execute()
            .await
            .map(|_| ())
            .map_err(|e| DocsKbError::BackendUnavailable(format!("LanceDB unreachable: {}", e)))
    }
}

fn path_predicate(path: &str) -> String {
    format!("path = '{}'", path.replace('\'', "''"))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| DocsKbError::BackendUnavailable(format!("Missing '{}' column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| DocsKbError::BackendUnavailable(format!("Invalid '{}' column type", name)))
}
