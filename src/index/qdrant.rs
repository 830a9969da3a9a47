//! Qdrant REST backend.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{CollectionDescription, IndexError, Payload, Point, ScoredPoint, VectorBackend};

/// Blocking client for one Qdrant server.
#[derive(Clone)]
pub struct QdrantBackend {
    client: Client,
    base: Url,
}

impl QdrantBackend {
    /// `base_url` is the server root, e.g. `http://localhost:6333`.
    /// `api_key` is sent as the `api-key` header when present.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let base = Url::parse(base_url)
            .map_err(|e| IndexError::Connectivity(format!("invalid Qdrant URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(IndexError::Connectivity(format!(
                "invalid Qdrant URL {base_url}"
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(key)
                .map_err(|e| IndexError::Connectivity(format!("invalid Qdrant API key: {e}")))?;
            headers.insert("api-key", value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base })
    }

    /// `{base}/collections/{name}/{extra...}` with each segment escaped.
    fn url(&self, name: &str, extra: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("collections")
                .push(name)
                .extend(extra);
        }
        url
    }
}

/// Turn a non-success status into [`IndexError::Http`].
fn check(resp: Response) -> Result<Response, IndexError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(IndexError::Http {
        status: status.as_u16(),
        body,
    })
}

impl VectorBackend for QdrantBackend {
    fn describe(&self, name: &str) -> Result<Option<CollectionDescription>, IndexError> {
        let resp = self.client.get(self.url(name, &[])).send()?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: ApiResponse<CollectionResult> = check(resp)?.json()?;
        info.result.into_description().map(Some)
    }

    fn create_collection(&self, name: &str, dimension: usize) -> Result<(), IndexError> {
        let body = CreateCollection {
            vectors: VectorParams {
                size: dimension,
                distance: "Cosine".to_string(),
            },
        };
        check(self.client.put(self.url(name, &[])).json(&body).send()?)?;
        debug!("Created Qdrant collection {name} ({dimension} dimensions)");
        Ok(())
    }

    fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        let resp = self.client.delete(self.url(name, &[])).send()?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(resp)?;
        Ok(())
    }

    fn upsert(&self, name: &str, points: &[Point]) -> Result<(), IndexError> {
        let mut url = self.url(name, &["points"]);
        url.query_pairs_mut().append_pair("wait", "true");
        let body = UpsertRequest::from_points(points);
        check(self.client.put(url).json(&body).send()?)?;
        Ok(())
    }

    fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, IndexError> {
        let body = SearchRequest {
            vector,
            limit,
            score_threshold,
            with_payload: true,
        };
        let resp = self
            .client
            .post(self.url(name, &["points", "search"]))
            .json(&body)
            .send()?;
        let found: ApiResponse<Vec<ScoredPointResult>> = check(resp)?.json()?;
        Ok(found.result.into_iter().map(ScoredPoint::from).collect())
    }
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: Vec<PointStruct<'a>>,
}

impl<'a> UpsertRequest<'a> {
    fn from_points(points: &'a [Point]) -> Self {
        Self {
            points: points
                .iter()
                .map(|p| PointStruct {
                    id: p.id.to_string(),
                    vector: &p.vector,
                    payload: &p.payload,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct PointStruct<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a Payload,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    score_threshold: f32,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionResult {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    points_count: Option<u64>,
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: VectorsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VectorsConfig {
    Single(VectorParams),
    Named(BTreeMap<String, VectorParams>),
}

impl CollectionResult {
    fn into_description(self) -> Result<CollectionDescription, IndexError> {
        let (dimension, named_vectors) = match self.config.params.vectors {
            VectorsConfig::Single(params) => (params.size, false),
            // Reported for logging only; ensure() rebuilds named layouts
            VectorsConfig::Named(named) => (
                named.into_values().next().map_or(0, |params| params.size),
                true,
            ),
        };
        Ok(CollectionDescription {
            dimension,
            points_count: self.points_count.unwrap_or(0),
            status: self.status.unwrap_or_else(|| "unknown".to_string()),
            named_vectors,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ScoredPointResult {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Payload>,
}

impl From<ScoredPointResult> for ScoredPoint {
    fn from(found: ScoredPointResult) -> Self {
        let id = match found.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Self {
            id,
            score: found.score,
            payload: found.payload.unwrap_or_default(),
        }
    }
}
