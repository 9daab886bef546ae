//! Hybrid search executor: query vector resolution, predicate compilation,
//! scoped probe setting, similarity/MMR modes, and paging.

use asupersync::Cx;

use crate::config::StoreConfig;
use crate::distance::{mmr_rerank, MmrCandidate};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    Document, DocumentId, SearchMode, SearchRequest, SearchResultPage, SearchResultRow,
};
use crate::predicate::{self, CompiledPredicate};
use crate::storage::{ScanRequest, Storage};

pub async fn search(
    cx: &Cx,
    storage: &dyn Storage,
    embedder: &dyn crate::storage::Embedder,
    config: &StoreConfig,
    collection_name: &str,
    request: &SearchRequest,
) -> StoreResult<SearchResultPage> {
    if request.page_number == 0 || request.page_size == 0 {
        return Err(StoreError::invalid(
            "paging",
            "page_number and page_size must be positive",
        ));
    }
    if request.text.is_some() == request.vector.is_some() {
        return Err(StoreError::invalid(
            "query",
            "exactly one of text or vector must be supplied",
        ));
    }

    let collection_name = crate::collection_dao::normalize_name(collection_name);
    let collection_name = collection_name.as_str();
    let collection = storage
        .get_collection_row(cx, collection_name)
        .await?
        .ok_or_else(|| StoreError::not_found("collection", collection_name))?;

    let query_vector = match (&request.text, &request.vector) {
        (Some(text), None) => {
            let mut vectors = embedder.embed(cx, std::slice::from_ref(text)).await?;
            vectors
                .pop()
                .ok_or_else(|| StoreError::internal("embedder returned no vector"))?
        }
        (None, Some(vector)) => {
            if vector.len() != collection.dimension {
                return Err(StoreError::invalid(
                    "vector",
                    format!(
                        "expected dimension {}, got {}",
                        collection.dimension,
                        vector.len()
                    ),
                ));
            }
            vector.clone()
        }
        _ => unreachable!("validated above"),
    };

    let compiled_predicate: Option<CompiledPredicate> = request
        .predicate
        .as_ref()
        .map(|expr| predicate::compile(expr, config.max_predicate_path_depth))
        .transpose()?;

    let limit = request.limit.unwrap_or(config.default_limit);
    let mode = request.mode;
    let lambda = request.mmr_lambda.unwrap_or(0.5);

    let effective_limit = match mode {
        SearchMode::Similarity => limit.max(request.page_size.saturating_mul(request.page_number)),
        SearchMode::Mmr => config.mmr_overfetch(limit),
    };

    let mut session = storage.begin_session(cx).await?;
    if collection.is_indexed {
        storage
            .set_probe_count(cx, session.as_mut(), collection.probe_count)
            .await?;
    }

    let hits = storage
        .execute_scan(
            cx,
            session.as_mut(),
            ScanRequest {
                collection: collection_name,
                query: &query_vector,
                predicate: compiled_predicate.as_ref(),
                limit: effective_limit,
            },
        )
        .await?;

    if hits.is_empty() {
        return Ok(SearchResultPage {
            rows: Vec::new(),
            result_count: 0,
            page_number: request.page_number,
            page_size: request.page_size,
        });
    }

    let ordered_ids: Vec<DocumentId> = match mode {
        SearchMode::Similarity => hits.iter().map(|h| h.document).take(limit).collect(),
        SearchMode::Mmr => {
            let candidates: Vec<(DocumentId, f32)> =
                hits.iter().map(|h| (h.document, h.score)).collect();
            let docs = storage
                .get_documents(
                    cx,
                    collection_name,
                    &candidates.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
                )
                .await?;
            mmr_order(&candidates, &docs, lambda, limit)?
        }
    };

    let page = paginate(&ordered_ids, request.page_number, request.page_size);
    let documents = storage.get_documents(cx, collection_name, &page).await?;
    let scores: std::collections::HashMap<DocumentId, f32> =
        hits.iter().map(|h| (h.document, h.score)).collect();

    let rows = page
        .iter()
        .filter_map(|id| {
            documents
                .iter()
                .find(|d| d.id == *id)
                .map(|d| to_row(d, scores.get(id).copied().unwrap_or(0.0)))
        })
        .collect::<Vec<_>>();

    Ok(SearchResultPage {
        result_count: rows.len(),
        rows,
        page_number: request.page_number,
        page_size: request.page_size,
    })
}

fn to_row(document: &Document, score: f32) -> SearchResultRow {
    SearchResultRow {
        document: document.id,
        document_id: document.document_id.clone(),
        content: document.content.clone(),
        metadata: document.metadata.clone(),
        score,
    }
}

fn mmr_order(
    candidates: &[(DocumentId, f32)],
    documents: &[Document],
    lambda: f32,
    limit: usize,
) -> StoreResult<Vec<DocumentId>> {
    let mmr_candidates: Vec<MmrCandidate<DocumentId>> = candidates
        .iter()
        .filter_map(|(id, score)| {
            documents
                .iter()
                .find(|d| d.id == *id)
                .and_then(|d| d.embedding.as_ref())
                .map(|embedding| MmrCandidate {
                    key: *id,
                    query_similarity: *score,
                    embedding: embedding.clone(),
                })
        })
        .collect();
    mmr_rerank(&mmr_candidates, lambda, limit)
}

/// Apply 1-based paging over an already-ranked id list.
fn paginate(ids: &[DocumentId], page_number: usize, page_size: usize) -> Vec<DocumentId> {
    let start = (page_number - 1) * page_size;
    if start >= ids.len() {
        return Vec::new();
    }
    let end = (start + page_size).min(ids.len());
    ids[start..end].to_vec()
}
