//! Collection and document CRUD, and the metadata merge rules shared by
//! collection and document updates.

use asupersync::Cx;
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::model::{now_micros, Collection, DistanceFunction, Document, DocumentId};
use crate::storage::Storage;

/// The reserved metadata subtree only a privileged caller may write.
pub const PRIVILEGED_KEY: &str = "system";

/// Normalize a collection name for case-insensitive lookup and storage:
/// trimmed and lowercased, so `"Docs"` and `"docs"` name the same
/// collection (spec §3: collections are uniquely named, case-insensitive).
pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Recursively merge `patch` into `base`.
///
/// - A scalar/array leaf in `patch` replaces the corresponding value in
///   `base`.
/// - A `null` leaf in `patch` deletes the corresponding key from `base`.
/// - Nested objects are merged recursively rather than replaced wholesale.
/// - Keys under [`PRIVILEGED_KEY`] are accepted only when `privileged` is
///   `true`; otherwise they are silently dropped from the patch (readers
///   may still see any pre-existing `system` subtree).
#[must_use]
pub fn merge_metadata(base: &Value, patch: &Value, privileged: bool) -> Value {
    let Value::Object(patch_obj) = patch else {
        return base.clone();
    };
    let mut result = match base {
        Value::Object(obj) => obj.clone(),
        _ => Map::new(),
    };

    for (key, patch_value) in patch_obj {
        if key == PRIVILEGED_KEY && !privileged {
            continue;
        }
        match patch_value {
            Value::Null => {
                result.remove(key);
            }
            Value::Object(_) => {
                let merged = merge_metadata(
                    result.get(key).unwrap_or(&Value::Null),
                    patch_value,
                    privileged,
                );
                result.insert(key.clone(), merged);
            }
            other => {
                result.insert(key.clone(), other.clone());
            }
        }
    }

    Value::Object(result)
}

/// Specification for a new collection.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub auto_embed: bool,
}

pub async fn create_collection(
    cx: &Cx,
    storage: &dyn Storage,
    spec: &CollectionSpec,
) -> StoreResult<()> {
    if spec.name.trim().is_empty() {
        return Err(StoreError::invalid("name", "must not be empty"));
    }
    if spec.dimension == 0 {
        return Err(StoreError::invalid("dimension", "must be positive"));
    }
    let name = normalize_name(&spec.name);
    if storage.get_collection_row(cx, &name).await?.is_some() {
        return Err(StoreError::already_exists("collection", name));
    }

    let collection = Collection::new(&name, spec.dimension, spec.auto_embed);
    storage.create_collection_table(cx, &collection).await?;
    storage.insert_collection_row(cx, &collection).await?;
    Ok(())
}

/// A patch applied to a collection. Dimension and distance function are
/// immutable after creation: supplying either here and having it disagree
/// with the current value is `Unsupported`, not a metadata merge.
#[derive(Debug, Clone, Default)]
pub struct CollectionPatch {
    pub metadata: Option<Value>,
    pub dimension: Option<usize>,
    pub distance_function: Option<DistanceFunction>,
}

pub async fn update_collection(
    cx: &Cx,
    storage: &dyn Storage,
    name: &str,
    patch: &CollectionPatch,
    privileged: bool,
) -> StoreResult<Collection> {
    let name = normalize_name(name);
    let mut collection = storage
        .get_collection_row(cx, &name)
        .await?
        .ok_or_else(|| StoreError::not_found("collection", &name))?;

    let requested_dimension = patch.dimension.unwrap_or(collection.dimension);
    let requested_distance = patch.distance_function.unwrap_or(collection.distance_function);
    if is_immutable_change(&collection, requested_dimension, requested_distance) {
        return Err(StoreError::unsupported(
            "changing a collection's dimension or distance function after creation",
        ));
    }

    if let Some(patch_metadata) = &patch.metadata {
        collection.metadata = merge_metadata(&collection.metadata, patch_metadata, privileged);
    }
    collection.updated_at_micros = now_micros();
    storage.update_collection_row(cx, &collection).await?;
    Ok(collection)
}

pub async fn get_collection(cx: &Cx, storage: &dyn Storage, name: &str) -> StoreResult<Collection> {
    let name = normalize_name(name);
    storage
        .get_collection_row(cx, &name)
        .await?
        .ok_or_else(|| StoreError::not_found("collection", &name))
}

pub async fn list_collections(cx: &Cx, storage: &dyn Storage) -> StoreResult<Vec<Collection>> {
    storage.list_collection_rows(cx).await
}

pub async fn delete_collection(cx: &Cx, storage: &dyn Storage, name: &str) -> StoreResult<()> {
    let name = normalize_name(name);
    if storage.get_collection_row(cx, &name).await?.is_none() {
        return Err(StoreError::not_found("collection", &name));
    }
    storage.drop_collection_table(cx, &name).await?;
    storage.delete_collection_row(cx, &name).await?;
    Ok(())
}

/// One document to insert, with an optional caller-supplied embedding.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document_id: Option<String>,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Value,
}

/// Insert documents into `collection`, enforcing the embedding-mode rules
/// (§4.D) and returning the server-assigned ids in input order. Documents
/// missing an embedding in an auto-embed collection are reported back so
/// the caller can enqueue embedding tasks.
pub async fn create_documents(
    cx: &Cx,
    storage: &dyn Storage,
    collection_name: &str,
    new_documents: &[NewDocument],
    next_id: impl Fn() -> DocumentId,
) -> StoreResult<(Vec<DocumentId>, Vec<(DocumentId, String)>)> {
    let collection_name = normalize_name(collection_name);
    let collection = storage
        .get_collection_row(cx, &collection_name)
        .await?
        .ok_or_else(|| StoreError::not_found("collection", &collection_name))?;

    let embeddings: Vec<Option<&[f32]>> = new_documents
        .iter()
        .map(|d| d.embedding.as_deref())
        .collect();
    crate::pipeline::validate_embedding_mode(collection.auto_embed, collection.dimension, &embeddings)?;

    let mut seen_document_ids = std::collections::HashSet::new();
    for new_doc in new_documents {
        if let Some(document_id) = &new_doc.document_id {
            if !seen_document_ids.insert(document_id.as_str()) {
                return Err(StoreError::already_exists("document_id", document_id.clone()));
            }
            if storage.document_id_exists(cx, &collection_name, document_id).await? {
                return Err(StoreError::already_exists("document_id", document_id.clone()));
            }
        }
    }

    let mut rows = Vec::with_capacity(new_documents.len());
    let mut ids = Vec::with_capacity(new_documents.len());
    let mut pending_embeds = Vec::new();

    for new_doc in new_documents {
        let id = next_id();
        let mut document = Document::new(id, new_doc.content.clone());
        document.document_id = new_doc.document_id.clone();
        document.metadata = new_doc.metadata.clone();
        if let Some(embedding) = &new_doc.embedding {
            document = document.with_embedding(embedding.clone());
        } else {
            pending_embeds.push((id, new_doc.content.clone()));
        }
        ids.push(id);
        rows.push(document);
    }

    storage.insert_documents(cx, &collection_name, &rows).await?;
    Ok((ids, pending_embeds))
}

pub async fn get_documents(
    cx: &Cx,
    storage: &dyn Storage,
    collection_name: &str,
    ids: &[DocumentId],
) -> StoreResult<Vec<Document>> {
    let collection_name = normalize_name(collection_name);
    if storage.get_collection_row(cx, &collection_name).await?.is_none() {
        return Err(StoreError::not_found("collection", &collection_name));
    }
    storage.get_documents(cx, &collection_name, ids).await
}

pub async fn delete_documents(
    cx: &Cx,
    storage: &dyn Storage,
    collection_name: &str,
    ids: &[DocumentId],
) -> StoreResult<()> {
    let collection_name = normalize_name(collection_name);
    if storage.get_collection_row(cx, &collection_name).await?.is_none() {
        return Err(StoreError::not_found("collection", &collection_name));
    }
    storage.delete_documents(cx, &collection_name, ids).await
}

/// Validate that a distance-function/dimension change is not being
/// attempted; both are immutable after creation.
#[must_use]
pub fn is_immutable_change(current: &Collection, requested_dimension: usize, requested_distance: DistanceFunction) -> bool {
    current.dimension != requested_dimension || current.distance_function != requested_distance
}
