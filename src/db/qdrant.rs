use crate::types::{AppError, Fact, Metadata, Result, RetrievedFact};
use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, vectors_config::Config as VectorsConfigKind, Condition,
        CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
        GetPointsBuilder, PointId, PointStruct, RetrievedPoint, ScoredPoint,
        ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
        VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use uuid::Uuid;

use super::factstore::{
    check_dimensions, normalize_metadata, EmbeddedFact, FactStore, SearchFilter, StoreStats,
};

const FACT_ID_KEY: &str = "fact_id";
const CONTENT_KEY: &str = "content";
const METADATA_KEY: &str = "metadata";
/// Normalized copies of the metadata values, matched by search filters
const MATCH_KEY: &str = "match";
/// Monotonic insertion sequence, used to break score ties
const SEQ_KEY: &str = "seq";

const SCROLL_PAGE: u32 = 256;

/// Qdrant fact store.
///
/// Qdrant point ids must be integers or UUIDs, so each fact id is mapped to
/// a name-based (v5) UUID and the original id is kept in the payload. The
/// collection is created lazily on the first add, sized to the embedding.
///
/// Qdrant does not order equal scores, so every point carries a `seq`
/// payload drawn from a counter that starts above the largest stored value.
/// Searches widen their window until the score at the `top_k` cut-off is
/// no longer tied, then order ties by `seq`.
pub struct QdrantFactStore {
    client: Qdrant,
    collection: String,
    ready: AtomicBool,
    /// Vector length of the collection, 0 while unknown
    dimensions: AtomicUsize,
    next_seq: AtomicI64,
}

fn store_err(action: &str, e: impl std::fmt::Display) -> AppError {
    AppError::StoreUnavailable(format!("Failed to {}: {}", action, e))
}

fn point_id_for(fact_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, fact_id.as_bytes()).to_string()
}

fn to_point_id(fact_id: &str) -> PointId {
    PointId {
        point_id_options: Some(PointIdOptions::Uuid(point_id_for(fact_id))),
    }
}

/// Rebuild a fact from a point payload; `None` for foreign points.
fn fact_from_payload(payload: &HashMap<String, QdrantValue>) -> Option<Fact> {
    let id = payload.get(FACT_ID_KEY)?.as_str()?.to_string();
    let content = payload.get(CONTENT_KEY)?.as_str()?.to_string();
    let metadata: Metadata = payload
        .get(METADATA_KEY)
        .and_then(|v| serde_json::from_value(v.clone().into()).ok())
        .unwrap_or_default();

    Some(Fact {
        id,
        content,
        metadata,
    })
}

fn seq_from_payload(payload: &HashMap<String, QdrantValue>) -> i64 {
    payload
        .get(SEQ_KEY)
        .and_then(|v| v.as_integer())
        .unwrap_or(i64::MAX)
}

fn match_payload(metadata: &Metadata) -> serde_json::Value {
    metadata
        .iter()
        .map(|(key, value)| (key.clone(), serde_json::Value::String(normalize_metadata(value))))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn to_filter(filter: &SearchFilter) -> Filter {
    Filter::must([Condition::matches(
        format!("{}.{}", MATCH_KEY, filter.key),
        filter.value.clone(),
    )])
}

/// True when a search returning `returned` of `limit` points may have cut
/// a group of facts tied at the `top_k`-th score.
fn window_too_narrow(scores: &[f32], top_k: usize, limit: usize) -> bool {
    if scores.len() < limit || scores.len() < top_k || top_k == 0 {
        return false;
    }
    scores[limit - 1] >= scores[top_k - 1]
}

/// Order by score, ties by insertion sequence, and keep `top_k`.
fn rank_hits(mut hits: Vec<(i64, RetrievedFact)>, top_k: usize) -> Vec<RetrievedFact> {
    hits.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
    hits.truncate(top_k);
    hits.into_iter().map(|(_, hit)| hit).collect()
}

impl QdrantFactStore {
    pub async fn new(url: &str, api_key: Option<String>, collection: &str) -> Result<Self> {
        let builder = Qdrant::from_url(url);
        let builder = match api_key {
            Some(key) => builder.api_key(key),
            None => builder,
        };
        let client = builder
            .build()
            .map_err(|e| store_err("create Qdrant client", e))?;

        let store = Self {
            client,
            collection: collection.to_string(),
            ready: AtomicBool::new(false),
            dimensions: AtomicUsize::new(0),
            next_seq: AtomicI64::new(0),
        };
        if store.refresh_ready().await? {
            let max_seq = store
                .scroll_payloads()
                .await?
                .iter()
                .map(seq_from_payload)
                .filter(|seq| *seq != i64::MAX)
                .max()
                .unwrap_or(-1);
            store.next_seq.store(max_seq + 1, Ordering::SeqCst);
        }

        tracing::info!(collection = %collection, url = %url, "Qdrant fact store connected");
        Ok(store)
    }

    async fn refresh_ready(&self) -> Result<bool> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| store_err("check collection", e))?;
        if exists {
            let info = self
                .client
                .collection_info(&self.collection)
                .await
                .map_err(|e| store_err("get collection info", e))?;
            let dimensions = info
                .result
                .and_then(|r| r.config)
                .and_then(|c| c.params)
                .and_then(|p| p.vectors_config)
                .and_then(|v| match v.config {
                    Some(VectorsConfigKind::Params(p)) => Some(p.size as usize),
                    _ => None,
                })
                .unwrap_or(0);
            self.dimensions.store(dimensions, Ordering::SeqCst);
        }
        self.ready.store(exists, Ordering::SeqCst);
        Ok(exists)
    }

    fn check_vector(&self, len: usize, what: &str) -> Result<()> {
        match self.dimensions.load(Ordering::SeqCst) {
            0 => Ok(()),
            expected => check_dimensions(expected, len, what),
        }
    }

    async fn collection_ready(&self) -> Result<bool> {
        if self.ready.load(Ordering::SeqCst) {
            return Ok(true);
        }
        self.refresh_ready().await
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        if self.collection_ready().await? {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(dimensions as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| store_err("create collection", e))?;
        self.dimensions.store(dimensions, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);

        tracing::info!(collection = %self.collection, dimensions, "Created Qdrant collection");
        Ok(())
    }

    async fn fetch_points(&self, fact_ids: &[String]) -> Result<Vec<RetrievedPoint>> {
        let ids: Vec<PointId> = fact_ids.iter().map(|id| to_point_id(id)).collect();
        let response = self
            .client
            .get_points(GetPointsBuilder::new(&self.collection, ids).with_payload(true))
            .await
            .map_err(|e| store_err("get points", e))?;
        Ok(response.result)
    }

    async fn search_window(
        &self,
        embedding: &[f32],
        limit: usize,
        threshold: Option<f32>,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut request =
            SearchPointsBuilder::new(&self.collection, embedding.to_vec(), limit as u64)
                .with_payload(true);
        if let Some(threshold) = threshold {
            request = request.score_threshold(threshold);
        }
        if let Some(filter) = filter {
            request = request.filter(to_filter(filter));
        }

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| store_err("search", e))?;
        Ok(response.result)
    }

    async fn scroll_payloads(&self) -> Result<Vec<HashMap<String, QdrantValue>>> {
        let mut payloads = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut request = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE)
                .with_payload(true);
            if let Some(next) = offset.take() {
                request = request.offset(next);
            }

            let page = self
                .client
                .scroll(request)
                .await
                .map_err(|e| store_err("scroll points", e))?;

            payloads.extend(page.result.into_iter().map(|p| p.payload));

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(payloads)
    }
}

#[async_trait]
impl FactStore for QdrantFactStore {
    fn provider_name(&self) -> &'static str {
        "qdrant"
    }

    async fn add(&self, facts: Vec<EmbeddedFact>) -> Result<usize> {
        let Some(first) = facts.first() else {
            return Ok(0);
        };
        self.collection_ready().await?;
        let expected = match self.dimensions.load(Ordering::SeqCst) {
            0 => first.embedding.len(),
            known => known,
        };
        for f in &facts {
            check_dimensions(
                expected,
                f.embedding.len(),
                &format!("Embedding for fact '{}'", f.fact.id),
            )?;
        }
        self.ensure_collection(expected).await?;

        // Replaced facts keep their original sequence number
        let ids: Vec<String> = facts.iter().map(|f| f.fact.id.clone()).collect();
        let existing: HashMap<String, i64> = self
            .fetch_points(&ids)
            .await?
            .iter()
            .filter_map(|p| {
                let fact = fact_from_payload(&p.payload)?;
                Some((fact.id, seq_from_payload(&p.payload)))
            })
            .collect();

        let fresh = facts
            .iter()
            .filter(|f| !existing.contains_key(&f.fact.id))
            .count();
        let mut next = self.next_seq.fetch_add(fresh as i64, Ordering::SeqCst);
        let mut points = Vec::with_capacity(facts.len());

        for embedded in facts {
            let seq = existing.get(&embedded.fact.id).copied().unwrap_or_else(|| {
                let seq = next;
                next += 1;
                seq
            });

            let metadata = serde_json::to_value(&embedded.fact.metadata)
                .map_err(|e| AppError::Internal(format!("Failed to encode metadata: {}", e)))?;

            let mut payload: HashMap<String, QdrantValue> = HashMap::new();
            payload.insert(FACT_ID_KEY.to_string(), embedded.fact.id.clone().into());
            payload.insert(
                MATCH_KEY.to_string(),
                match_payload(&embedded.fact.metadata).into(),
            );
            payload.insert(CONTENT_KEY.to_string(), embedded.fact.content.into());
            payload.insert(METADATA_KEY.to_string(), metadata.into());
            payload.insert(SEQ_KEY.to_string(), seq.into());

            points.push(PointStruct::new(
                point_id_for(&embedded.fact.id),
                embedded.embedding,
                payload,
            ));
        }

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| store_err("upsert points", e))?;

        Ok(count)
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievedFact>> {
        if top_k == 0 || !self.collection_ready().await? {
            return Ok(Vec::new());
        }
        self.check_vector(embedding.len(), "Query embedding")?;

        let mut limit = top_k;
        let mut threshold = None;
        let points = loop {
            let points = self.search_window(embedding, limit, threshold, filter).await?;
            let scores: Vec<f32> = points.iter().map(|p| p.score).collect();
            if !window_too_narrow(&scores, top_k, limit) {
                break points;
            }
            // Only points scoring at least the cut-off can still make the result
            threshold = Some(scores[top_k - 1]);
            limit *= 2;
        };

        let hits: Vec<(i64, RetrievedFact)> = points
            .into_iter()
            .filter_map(|point| {
                let fact = fact_from_payload(&point.payload)?;
                Some((
                    seq_from_payload(&point.payload),
                    RetrievedFact {
                        fact,
                        score: point.score,
                    },
                ))
            })
            .collect();

        Ok(rank_hits(hits, top_k))
    }

    async fn get(&self, id: &str) -> Result<Option<Fact>> {
        if !self.collection_ready().await? {
            return Ok(None);
        }
        let points = self.fetch_points(&[id.to_string()]).await?;
        Ok(points
            .iter()
            .filter_map(|p| fact_from_payload(&p.payload))
            .find(|f| f.id == id))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() || !self.collection_ready().await? {
            return Ok(0);
        }

        let existing = self.fetch_points(ids).await?.len();
        let point_ids: Vec<PointId> = ids.iter().map(|id| to_point_id(id)).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(point_ids)
                    .wait(true),
            )
            .await
            .map_err(|e| store_err("delete points", e))?;

        Ok(existing)
    }

    async fn clear(&self) -> Result<usize> {
        if !self.collection_ready().await? {
            return Ok(0);
        }

        let removed = self.count().await?;
        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(|e| store_err("delete collection", e))?;
        self.ready.store(false, Ordering::SeqCst);
        self.dimensions.store(0, Ordering::SeqCst);

        tracing::info!(collection = %self.collection, removed, "Cleared Qdrant collection");
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        if !self.collection_ready().await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| store_err("count points", e))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn stats(&self, coin_key: &str) -> Result<StoreStats> {
        if !self.collection_ready().await? {
            return Ok(StoreStats::default());
        }

        let facts: Vec<Fact> = self
            .scroll_payloads()
            .await?
            .iter()
            .filter_map(fact_from_payload)
            .collect();

        Ok(StoreStats::from_facts(&facts, coin_key))
    }
}
