//! `SqliteStorage`: a `docsearch_core::storage::Storage` implementation
//! over a pooled `sqlmodel_sqlite` connection.

use std::sync::{Arc, Mutex};

use asupersync::{Cx, Outcome};
use async_trait::async_trait;
use sqlmodel_core::{Row as SqlRow, Value};
use sqlmodel_pool::{Pool, PoolConfig, PooledConnection};
use sqlmodel_query::{raw_execute, raw_query};
use sqlmodel_sqlite::SqliteConnection;

use docsearch_core::error::{StoreError, StoreResult};
use docsearch_core::model::{Collection, DistanceFunction, Document, DocumentId};
use docsearch_core::storage::{ScanHit, ScanRequest, Session, Storage};

use crate::schema::{pack_vector, unpack_vector, CREATE_COLLECTIONS_TABLE_SQL, CREATE_DOCUMENTS_TABLE_SQL};
use crate::vector_index::{scan, ScanCandidate};

fn map_sql_error(e: sqlmodel_core::Error) -> StoreError {
    StoreError::internal(e.to_string())
}

/// A scoped search session. The probe count is recorded for observability
/// only; the brute-force scan below does not consume it (see
/// `vector_index` module docs).
struct SqliteSession {
    id: u64,
    probe_count: Mutex<Option<u32>>,
}

impl Session for SqliteSession {
    fn id(&self) -> u64 {
        self.id
    }
}

/// A pooled sqlite-backed storage engine. Documents for every collection
/// share one physical table; `collections` holds one row per collection.
pub struct SqliteStorage {
    pool: Arc<Pool<SqliteConnection>>,
    path: String,
    next_session_id: std::sync::atomic::AtomicU64,
}

impl SqliteStorage {
    /// Open an in-memory database, initializing schema on first connection.
    ///
    /// # Panics
    ///
    /// Never panics; schema initialization happens lazily via
    /// [`Self::ensure_schema`].
    pub async fn open_memory(cx: &Cx) -> StoreResult<Self> {
        Self::open(cx, ":memory:", 1).await
    }

    /// Open (or create) a file-backed database at `path`.
    pub async fn open_file(cx: &Cx, path: impl Into<String>) -> StoreResult<Self> {
        Self::open(cx, path, 4).await
    }

    async fn open(cx: &Cx, path: impl Into<String>, max_connections: usize) -> StoreResult<Self> {
        let storage = Self {
            pool: Arc::new(Pool::new(PoolConfig::new(max_connections))),
            path: path.into(),
            next_session_id: std::sync::atomic::AtomicU64::new(1),
        };
        storage.ensure_schema(cx).await?;
        Ok(storage)
    }

    async fn acquire(&self, cx: &Cx) -> StoreResult<PooledConnection<SqliteConnection>> {
        let path = self.path.clone();
        self.pool
            .acquire(cx, move || {
                let path = path.clone();
                async move {
                    let opened = if path == ":memory:" {
                        SqliteConnection::open_memory()
                    } else {
                        SqliteConnection::open_file(&path)
                    };
                    match opened {
                        Ok(conn) => Outcome::Ok(conn),
                        Err(e) => Outcome::Err(e),
                    }
                }
            })
            .await
            .into_result()
            .map_err(map_sql_error)
    }

    async fn exec(&self, cx: &Cx, sql: &str, params: &[Value]) -> StoreResult<u64> {
        let conn = self.acquire(cx).await?;
        raw_execute(cx, &*conn, sql, params)
            .await
            .into_result()
            .map_err(map_sql_error)
    }

    async fn query(&self, cx: &Cx, sql: &str, params: &[Value]) -> StoreResult<Vec<SqlRow>> {
        let conn = self.acquire(cx).await?;
        raw_query(cx, &*conn, sql, params)
            .await
            .into_result()
            .map_err(map_sql_error)
    }

    async fn ensure_schema(&self, cx: &Cx) -> StoreResult<()> {
        self.exec(cx, CREATE_COLLECTIONS_TABLE_SQL, &[]).await?;
        self.exec(cx, CREATE_DOCUMENTS_TABLE_SQL, &[]).await?;
        Ok(())
    }
}

fn get_i64(row: &SqlRow, idx: usize) -> i64 {
    row.get(idx)
        .and_then(|v| match v {
            Value::BigInt(n) => Some(*n),
            Value::Int(n) => Some(i64::from(*n)),
            _ => None,
        })
        .unwrap_or(0)
}

fn get_string(row: &SqlRow, idx: usize) -> String {
    row.get(idx)
        .and_then(|v| match v {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn get_opt_string(row: &SqlRow, idx: usize) -> Option<String> {
    row.get(idx).and_then(|v| match v {
        Value::Text(s) => Some(s.clone()),
        Value::Null => None,
        _ => None,
    })
}

fn get_bool(row: &SqlRow, idx: usize) -> bool {
    get_i64(row, idx) != 0
}

fn decode_collection(row: &SqlRow) -> StoreResult<Collection> {
    let metadata = serde_json::from_str(&get_string(row, 8)).unwrap_or(serde_json::Value::Null);
    Ok(Collection {
        name: get_string(row, 0),
        dimension: get_i64(row, 1).max(0) as usize,
        auto_embed: get_bool(row, 2),
        distance_function: match get_string(row, 3).as_str() {
            "cosine" => DistanceFunction::Cosine,
            other => return Err(StoreError::internal(format!("unknown distance function: {other}"))),
        },
        list_count: get_i64(row, 4).max(0) as u32,
        probe_count: get_i64(row, 5).max(0) as u32,
        is_indexed: get_bool(row, 6),
        row_count: get_i64(row, 7).max(0) as u64,
        metadata,
        created_at_micros: get_i64(row, 9),
        updated_at_micros: get_i64(row, 10),
    })
}

fn decode_document(row: &SqlRow) -> StoreResult<Document> {
    let id_text = get_string(row, 0);
    let id = u128::from_str_radix(&id_text, 16)
        .map(DocumentId::from_u128)
        .map_err(|_| StoreError::internal("corrupt document id in storage"))?;
    let embedding = get_opt_string(row, 4).map(|s| unpack_vector(&s));
    let metadata = serde_json::from_str(&get_string(row, 6)).unwrap_or(serde_json::Value::Null);
    Ok(Document {
        id,
        document_id: get_opt_string(row, 2),
        content: get_string(row, 3),
        embedding,
        is_embedded: get_bool(row, 5),
        metadata,
        created_at_micros: get_i64(row, 7),
        updated_at_micros: get_i64(row, 8),
        deleted: get_bool(row, 9),
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_collection_table(&self, cx: &Cx, _collection: &Collection) -> StoreResult<()> {
        self.ensure_schema(cx).await
    }

    async fn drop_collection_table(&self, cx: &Cx, name: &str) -> StoreResult<()> {
        self.exec(
            cx,
            "DELETE FROM documents WHERE collection = ?1",
            &[Value::Text(name.to_string())],
        )
        .await
        .map(|_| ())
    }

    async fn insert_collection_row(&self, cx: &Cx, collection: &Collection) -> StoreResult<()> {
        let metadata = serde_json::to_string(&collection.metadata)?;
        self.exec(
            cx,
            "INSERT INTO collections (name, dimension, auto_embed, distance_function, \
             list_count, probe_count, is_indexed, row_count, metadata, created_at_micros, \
             updated_at_micros) VALUES (?1, ?2, ?3, 'cosine', ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            &[
                Value::Text(collection.name.clone()),
                Value::BigInt(collection.dimension as i64),
                Value::BigInt(i64::from(collection.auto_embed)),
                Value::BigInt(i64::from(collection.list_count)),
                Value::BigInt(i64::from(collection.probe_count)),
                Value::BigInt(i64::from(collection.is_indexed)),
                Value::BigInt(collection.row_count as i64),
                Value::Text(metadata),
                Value::BigInt(collection.created_at_micros),
                Value::BigInt(collection.updated_at_micros),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn update_collection_row(&self, cx: &Cx, collection: &Collection) -> StoreResult<()> {
        let metadata = serde_json::to_string(&collection.metadata)?;
        self.exec(
            cx,
            "UPDATE collections SET dimension = ?2, auto_embed = ?3, list_count = ?4, \
             probe_count = ?5, is_indexed = ?6, row_count = ?7, metadata = ?8, \
             updated_at_micros = ?9 WHERE name = ?1",
            &[
                Value::Text(collection.name.clone()),
                Value::BigInt(collection.dimension as i64),
                Value::BigInt(i64::from(collection.auto_embed)),
                Value::BigInt(i64::from(collection.list_count)),
                Value::BigInt(i64::from(collection.probe_count)),
                Value::BigInt(i64::from(collection.is_indexed)),
                Value::BigInt(collection.row_count as i64),
                Value::Text(metadata),
                Value::BigInt(collection.updated_at_micros),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn get_collection_row(&self, cx: &Cx, name: &str) -> StoreResult<Option<Collection>> {
        let rows = self
            .query(
                cx,
                "SELECT name, dimension, auto_embed, distance_function, list_count, \
                 probe_count, is_indexed, row_count, metadata, created_at_micros, \
                 updated_at_micros FROM collections WHERE name = ?1",
                &[Value::Text(name.to_string())],
            )
            .await?;
        rows.first().map(decode_collection).transpose()
    }

    async fn list_collection_rows(&self, cx: &Cx) -> StoreResult<Vec<Collection>> {
        let rows = self
            .query(
                cx,
                "SELECT name, dimension, auto_embed, distance_function, list_count, \
                 probe_count, is_indexed, row_count, metadata, created_at_micros, \
                 updated_at_micros FROM collections ORDER BY name",
                &[],
            )
            .await?;
        rows.iter().map(decode_collection).collect()
    }

    async fn delete_collection_row(&self, cx: &Cx, name: &str) -> StoreResult<()> {
        self.exec(
            cx,
            "DELETE FROM collections WHERE name = ?1",
            &[Value::Text(name.to_string())],
        )
        .await
        .map(|_| ())
    }

    async fn insert_documents(&self, cx: &Cx, collection: &str, documents: &[Document]) -> StoreResult<()> {
        for document in documents {
            let metadata = serde_json::to_string(&document.metadata)?;
            let embedding = document.embedding.as_deref().map(pack_vector);
            self.exec(
                cx,
                "INSERT INTO documents (id, collection, document_id, content, embedding, \
                 is_embedded, metadata, created_at_micros, updated_at_micros, deleted) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
                &[
                    Value::Text(document.id.to_string()),
                    Value::Text(collection.to_string()),
                    document.document_id.clone().map_or(Value::Null, Value::Text),
                    Value::Text(document.content.clone()),
                    embedding.map_or(Value::Null, Value::Text),
                    Value::BigInt(i64::from(document.is_embedded)),
                    Value::Text(metadata),
                    Value::BigInt(document.created_at_micros),
                    Value::BigInt(document.updated_at_micros),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn update_document(&self, cx: &Cx, collection: &str, document: &Document) -> StoreResult<()> {
        let metadata = serde_json::to_string(&document.metadata)?;
        let embedding = document.embedding.as_deref().map(pack_vector);
        self.exec(
            cx,
            "UPDATE documents SET document_id = ?3, content = ?4, embedding = ?5, \
             is_embedded = ?6, metadata = ?7, updated_at_micros = ?8, deleted = ?9 \
             WHERE id = ?1 AND collection = ?2",
            &[
                Value::Text(document.id.to_string()),
                Value::Text(collection.to_string()),
                document.document_id.clone().map_or(Value::Null, Value::Text),
                Value::Text(document.content.clone()),
                embedding.map_or(Value::Null, Value::Text),
                Value::BigInt(i64::from(document.is_embedded)),
                Value::Text(metadata),
                Value::BigInt(document.updated_at_micros),
                Value::BigInt(i64::from(document.deleted)),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn get_documents(&self, cx: &Cx, collection: &str, ids: &[DocumentId]) -> StoreResult<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (0..ids.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "SELECT id, collection, document_id, content, embedding, is_embedded, metadata, \
             created_at_micros, updated_at_micros, deleted FROM documents \
             WHERE collection = ?1 AND id IN ({}) AND deleted = 0",
            placeholders.join(", ")
        );
        let mut params = vec![Value::Text(collection.to_string())];
        params.extend(ids.iter().map(|id| Value::Text(id.to_string())));
        let rows = self.query(cx, &sql, &params).await?;
        rows.iter().map(decode_document).collect()
    }

    async fn delete_documents(&self, cx: &Cx, collection: &str, ids: &[DocumentId]) -> StoreResult<()> {
        for id in ids {
            self.exec(
                cx,
                "UPDATE documents SET deleted = 1 WHERE id = ?1 AND collection = ?2",
                &[Value::Text(id.to_string()), Value::Text(collection.to_string())],
            )
            .await?;
        }
        Ok(())
    }

    async fn row_count(&self, cx: &Cx, collection: &str) -> StoreResult<u64> {
        let rows = self
            .query(
                cx,
                "SELECT COUNT(*) FROM documents WHERE collection = ?1 AND deleted = 0",
                &[Value::Text(collection.to_string())],
            )
            .await?;
        Ok(rows.first().map(|r| get_i64(r, 0)).unwrap_or(0).max(0) as u64)
    }

    async fn document_id_exists(&self, cx: &Cx, collection: &str, document_id: &str) -> StoreResult<bool> {
        let rows = self
            .query(
                cx,
                "SELECT 1 FROM documents WHERE collection = ?1 AND document_id = ?2 \
                 AND deleted = 0 LIMIT 1",
                &[Value::Text(collection.to_string()), Value::Text(document_id.to_string())],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn rebuild_index(&self, _cx: &Cx, _collection: &str, _list_count: u32) -> StoreResult<()> {
        // Bookkeeping only: every search scans the full candidate set (see
        // `vector_index` module docs), so there is no physical index to
        // rebuild here beyond the `list_count`/`probe_count` the caller
        // persists onto the collection row.
        Ok(())
    }

    async fn begin_session(&self, _cx: &Cx) -> StoreResult<Box<dyn Session>> {
        let id = self
            .next_session_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(Box::new(SqliteSession {
            id,
            probe_count: Mutex::new(None),
        }))
    }

    async fn set_probe_count(&self, _cx: &Cx, session: &mut dyn Session, probe_count: u32) -> StoreResult<()> {
        let any: &mut dyn std::any::Any = session;
        if let Some(sqlite_session) = any.downcast_mut::<SqliteSession>() {
            *sqlite_session.probe_count.lock().unwrap_or_else(|e| e.into_inner()) = Some(probe_count);
        }
        Ok(())
    }

    async fn execute_scan(&self, cx: &Cx, _session: &mut dyn Session, request: ScanRequest<'_>) -> StoreResult<Vec<ScanHit>> {
        let rows = self
            .query(
                cx,
                "SELECT id, collection, document_id, content, embedding, is_embedded, metadata, \
                 created_at_micros, updated_at_micros, deleted FROM documents \
                 WHERE collection = ?1 AND deleted = 0 AND embedding IS NOT NULL",
                &[Value::Text(request.collection.to_string())],
            )
            .await?;

        let candidates = rows
            .iter()
            .map(decode_document)
            .collect::<StoreResult<Vec<_>>>()?
            .into_iter()
            .filter_map(|doc| {
                doc.embedding.clone().map(|embedding| ScanCandidate {
                    id: doc.id,
                    embedding,
                    metadata: doc.metadata,
                })
            })
            .collect::<Vec<_>>();

        scan(request.query, &candidates, request.predicate, request.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use docsearch_core::collection_dao::{self, CollectionPatch, CollectionSpec, NewDocument};
    use docsearch_core::error::StoreError;
    use docsearch_core::model::{Collection, DistanceFunction};
    use serde_json::json;

    fn doc(id: u128, content: &str, embedding: Option<Vec<f32>>) -> Document {
        let mut d = Document::new(DocumentId::from_u128(id), content.to_string());
        if let Some(v) = embedding {
            d = d.with_embedding(v);
        }
        d
    }

    #[test]
    fn open_memory_creates_schema() {
        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let storage = SqliteStorage::open_memory(&cx).await.expect("open");
            assert!(storage.list_collection_rows(&cx).await.expect("list").is_empty());
        });
    }

    #[test]
    fn collection_row_round_trips() {
        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let storage = SqliteStorage::open_memory(&cx).await.expect("open");
            let collection = Collection::new("docs", 3, false);
            storage.create_collection_table(&cx, &collection).await.expect("create table");
            storage.insert_collection_row(&cx, &collection).await.expect("insert");

            let fetched = storage
                .get_collection_row(&cx, "docs")
                .await
                .expect("get")
                .expect("present");
            assert_eq!(fetched.name, "docs");
            assert_eq!(fetched.dimension, 3);
            assert!(!fetched.auto_embed);

            let mut updated = fetched.clone();
            updated.is_indexed = true;
            updated.row_count = 7;
            storage.update_collection_row(&cx, &updated).await.expect("update");
            let refetched = storage.get_collection_row(&cx, "docs").await.expect("get").expect("present");
            assert!(refetched.is_indexed);
            assert_eq!(refetched.row_count, 7);

            storage.delete_collection_row(&cx, "docs").await.expect("delete");
            assert!(storage.get_collection_row(&cx, "docs").await.expect("get").is_none());
        });
    }

    #[test]
    fn document_insert_get_soft_delete() {
        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let storage = SqliteStorage::open_memory(&cx).await.expect("open");
            let collection = Collection::new("docs", 2, false);
            storage.create_collection_table(&cx, &collection).await.expect("create table");
            storage.insert_collection_row(&cx, &collection).await.expect("insert collection");

            let d1 = doc(1, "hello", Some(vec![1.0, 0.0]));
            let d2 = doc(2, "world", Some(vec![0.0, 1.0]));
            storage.insert_documents(&cx, "docs", &[d1.clone(), d2.clone()]).await.expect("insert docs");

            assert_eq!(storage.row_count(&cx, "docs").await.expect("count"), 2);

            let fetched = storage
                .get_documents(&cx, "docs", &[d1.id, d2.id])
                .await
                .expect("get documents");
            assert_eq!(fetched.len(), 2);

            storage.delete_documents(&cx, "docs", &[d1.id]).await.expect("delete");
            assert_eq!(storage.row_count(&cx, "docs").await.expect("count"), 1);
            let remaining = storage.get_documents(&cx, "docs", &[d1.id, d2.id]).await.expect("get");
            assert_eq!(remaining.len(), 1);
            assert_eq!(remaining[0].id, d2.id);
        });
    }

    #[test]
    fn execute_scan_orders_by_score_and_respects_predicate() {
        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let storage = SqliteStorage::open_memory(&cx).await.expect("open");
            let collection = Collection::new("docs", 2, false);
            storage.create_collection_table(&cx, &collection).await.expect("create table");
            storage.insert_collection_row(&cx, &collection).await.expect("insert collection");

            let mut near = doc(1, "near", Some(vec![1.0, 0.0]));
            near.metadata = json!({"tag": "a"});
            let mut far = doc(2, "far", Some(vec![0.0, 1.0]));
            far.metadata = json!({"tag": "b"});
            storage.insert_documents(&cx, "docs", &[near.clone(), far.clone()]).await.expect("insert docs");

            let mut session = storage.begin_session(&cx).await.expect("session");
            storage.set_probe_count(&cx, session.as_mut(), 4).await.expect("probe");

            let hits = storage
                .execute_scan(
                    &cx,
                    session.as_mut(),
                    ScanRequest {
                        collection: "docs",
                        query: &[1.0, 0.0],
                        predicate: None,
                        limit: 10,
                    },
                )
                .await
                .expect("scan");
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].document, near.id);
            assert_eq!(hits[1].document, far.id);
        });
    }

    #[test]
    fn drop_collection_table_removes_its_documents_only() {
        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let storage = SqliteStorage::open_memory(&cx).await.expect("open");
            let a = Collection::new("a", 2, false);
            let b = Collection::new("b", 2, false);
            storage.create_collection_table(&cx, &a).await.expect("create a");
            storage.insert_collection_row(&cx, &a).await.expect("insert a");
            storage.create_collection_table(&cx, &b).await.expect("create b");
            storage.insert_collection_row(&cx, &b).await.expect("insert b");

            storage
                .insert_documents(&cx, "a", &[doc(1, "x", Some(vec![1.0, 0.0]))])
                .await
                .expect("insert a doc");
            storage
                .insert_documents(&cx, "b", &[doc(2, "y", Some(vec![1.0, 0.0]))])
                .await
                .expect("insert b doc");

            storage.drop_collection_table(&cx, "a").await.expect("drop a");
            assert_eq!(storage.row_count(&cx, "a").await.expect("count a"), 0);
            assert_eq!(storage.row_count(&cx, "b").await.expect("count b"), 1);
        });
    }

    fn next_id_counter(start: u64) -> impl Fn() -> DocumentId {
        let counter = std::sync::atomic::AtomicU64::new(start);
        move || DocumentId::from_u128(u128::from(counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed)))
    }

    #[test]
    fn collection_names_are_case_insensitive() {
        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let storage = SqliteStorage::open_memory(&cx).await.expect("open");
            collection_dao::create_collection(
                &cx,
                &storage,
                &CollectionSpec { name: "Docs".into(), dimension: 2, auto_embed: false },
            )
            .await
            .expect("create");

            let duplicate = collection_dao::create_collection(
                &cx,
                &storage,
                &CollectionSpec { name: "docs".into(), dimension: 2, auto_embed: false },
            )
            .await;
            assert!(matches!(duplicate, Err(StoreError::AlreadyExists { .. })));

            let fetched = collection_dao::get_collection(&cx, &storage, "DOCS").await.expect("get");
            assert_eq!(fetched.name, "docs");
        });
    }

    #[test]
    fn duplicate_document_id_within_collection_is_rejected() {
        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let storage = SqliteStorage::open_memory(&cx).await.expect("open");
            collection_dao::create_collection(
                &cx,
                &storage,
                &CollectionSpec { name: "docs".into(), dimension: 2, auto_embed: false },
            )
            .await
            .expect("create");

            let first = NewDocument {
                document_id: Some("ext-1".into()),
                content: "hello".into(),
                embedding: Some(vec![1.0, 0.0]),
                metadata: json!({}),
            };
            collection_dao::create_documents(&cx, &storage, "docs", &[first.clone()], next_id_counter(1))
                .await
                .expect("first insert");

            let repeat = collection_dao::create_documents(&cx, &storage, "docs", &[first], next_id_counter(2))
                .await;
            assert!(matches!(repeat, Err(StoreError::AlreadyExists { .. })));

            let within_batch = vec![
                NewDocument {
                    document_id: Some("ext-2".into()),
                    content: "a".into(),
                    embedding: Some(vec![0.0, 1.0]),
                    metadata: json!({}),
                },
                NewDocument {
                    document_id: Some("ext-2".into()),
                    content: "b".into(),
                    embedding: Some(vec![0.0, 1.0]),
                    metadata: json!({}),
                },
            ];
            let batch_result =
                collection_dao::create_documents(&cx, &storage, "docs", &within_batch, next_id_counter(3)).await;
            assert!(matches!(batch_result, Err(StoreError::AlreadyExists { .. })));
        });
    }

    #[test]
    fn updating_dimension_or_distance_function_is_unsupported() {
        let rt = RuntimeBuilder::current_thread().build().expect("build runtime");
        let cx = Cx::for_testing();
        rt.block_on(async {
            let storage = SqliteStorage::open_memory(&cx).await.expect("open");
            collection_dao::create_collection(
                &cx,
                &storage,
                &CollectionSpec { name: "docs".into(), dimension: 3, auto_embed: false },
            )
            .await
            .expect("create");

            let patch = CollectionPatch {
                dimension: Some(4),
                distance_function: Some(DistanceFunction::Cosine),
                ..Default::default()
            };
            let result = collection_dao::update_collection(&cx, &storage, "docs", &patch, false).await;
            assert!(matches!(result, Err(StoreError::Unsupported(_))));

            let metadata_only = CollectionPatch {
                metadata: Some(json!({"k": "v"})),
                ..Default::default()
            };
            let updated = collection_dao::update_collection(&cx, &storage, "docs", &metadata_only, false)
                .await
                .expect("metadata-only update succeeds");
            assert_eq!(updated.metadata, json!({"k": "v"}));
        });
    }
}
