use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::planner::{
    product_gid, CreateInstruction, FieldDefinition, FieldId, FieldIdMap, UpdateInstruction,
};
use crate::settings::Settings;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const SET_BATCH_SIZE: usize = 25;
const METAFIELD_PAGE_LIMIT: u32 = 250;

const METAFIELDS_SET: &str = "mutation metafieldsSet($metafields: [MetafieldsSetInput!]!) { \
metafieldsSet(metafields: $metafields) { metafields { id key namespace type value } userErrors { field message } } }";

const DEFINITION_CREATE: &str = "mutation metafieldDefinitionCreate($definition: MetafieldDefinitionInput!) { \
metafieldDefinitionCreate(definition: $definition) { createdDefinition { id key namespace type ownerType } userErrors { field message } } }";

const PRODUCT_METAFIELDS: &str = "query($id: ID!) { product(id: $id) { metafields(first: 250) { edges { node { \
namespace key type value \
reference { __typename ... on Metaobject { id handle type } } \
references(first: 100) { nodes { __typename ... on Metaobject { id handle type } } } } } } } }";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid access token header")]
    InvalidToken(#[from] InvalidHeaderValue),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("GraphQL errors: {0}")]
    GraphQl(String),
}

/// Metafield as listed by the REST endpoint. Only the fields used for id
/// lookup are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteMetafield {
    pub id: Option<FieldId>,
    pub namespace: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetafieldList {
    #[serde(default)]
    metafields: Vec<RemoteMetafield>,
}

/// Key → id, preferring entries from `preferred_namespace` when a key
/// exists in several namespaces.
pub fn build_id_map(metafields: &[RemoteMetafield], preferred_namespace: &str) -> FieldIdMap {
    let mut map = FieldIdMap::new();
    let mut preferred_keys = std::collections::HashSet::new();

    for mf in metafields {
        let (Some(key), Some(id)) = (mf.key.as_deref(), mf.id.as_ref()) else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        let in_preferred = mf.namespace.as_deref() == Some(preferred_namespace);
        let replace = !map.contains_key(key) || (in_preferred && !preferred_keys.contains(key));
        if replace {
            map.insert(key.to_string(), id.clone());
            if in_preferred {
                preferred_keys.insert(key.to_string());
            }
        }
    }

    map
}

/// Outcome of one REST PUT.
#[derive(Debug, Clone, Serialize)]
pub struct WriteResult {
    pub id: FieldId,
    pub status: Option<u16>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SetOutcome {
    pub updated: Vec<Value>,
    pub errors: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DefinitionOutcome {
    pub created: Vec<Value>,
    pub errors: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaobjectRef {
    pub id: Option<String>,
    pub handle: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedMetafield {
    pub namespace: Option<String>,
    pub key: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: Option<String>,
    pub reference: Option<MetaobjectRef>,
    pub references: Vec<MetaobjectRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductMetafields {
    pub shop: String,
    pub product_id: u64,
    pub count: usize,
    pub metafields: Vec<ExportedMetafield>,
    pub fetched_at: DateTime<Utc>,
}

/// Admin API client for one shop.
pub struct AdminClient {
    http: Client,
    shop: String,
    base_url: String,
}

impl AdminClient {
    pub fn new(shop: &str, access_token: &str, api_version: &str) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Shopify-Access-Token", HeaderValue::from_str(access_token.trim())?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(GatewayError::Client)?;

        Ok(Self {
            http,
            shop: shop.to_string(),
            base_url: admin_base_url(shop, api_version),
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(
            settings.shop()?,
            settings.access_token()?,
            &settings.api_version,
        )?)
    }

    /// Status and decoded JSON body of a successful call.
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<(u16, Value), GatewayError> {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await.map_err(|source| GatewayError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|source| GatewayError::Transport {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        let value = serde_json::from_str(&text).map_err(|source| GatewayError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok((status.as_u16(), value))
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, GatewayError> {
        let url = format!("{}/graphql.json", self.base_url);
        let body = json!({ "query": query, "variables": variables });
        let (_, resp) = self.send(Method::POST, &url, Some(&body)).await?;
        Ok(resp)
    }

    pub async fn list_metafields(&self, product_id: u64) -> Result<Vec<RemoteMetafield>, GatewayError> {
        let url = format!(
            "{}/metafields.json?owner_id={}&owner_resource=product&limit={}",
            self.base_url, product_id, METAFIELD_PAGE_LIMIT
        );
        let (_, body) = self.send(Method::GET, &url, None).await?;
        let list: MetafieldList =
            serde_json::from_value(body).map_err(|source| GatewayError::Decode { url, source })?;
        info!(product_id, count = list.metafields.len(), "metafields listed");
        Ok(list.metafields)
    }

    /// One `metafieldDefinitionCreate` per definition. "Already exists" user
    /// errors are collected, never fatal.
    pub async fn ensure_definitions(&self, definitions: &[FieldDefinition]) -> DefinitionOutcome {
        let mut outcome = DefinitionOutcome::default();
        for def in definitions {
            let variables = json!({ "definition": def });
            match self.graphql(DEFINITION_CREATE, variables).await {
                Ok(resp) => {
                    let (created, errors) = mutation_payload(&resp, "metafieldDefinitionCreate", "createdDefinition");
                    outcome.created.extend(created);
                    outcome.errors.extend(errors);
                }
                Err(e) => {
                    warn!(key = %def.key, error = %e, "definition request failed");
                    outcome.errors.push(error_value(&e));
                }
            }
        }
        info!(
            created = outcome.created.len(),
            errors = outcome.errors.len(),
            "metafield definitions ensured"
        );
        outcome
    }

    /// `metafieldsSet` in sequential batches of [`SET_BATCH_SIZE`].
    pub async fn set_metafields(&self, inputs: &[CreateInstruction]) -> SetOutcome {
        let mut outcome = SetOutcome::default();
        for (i, batch) in inputs.chunks(SET_BATCH_SIZE).enumerate() {
            debug!(batch = i, size = batch.len(), "metafieldsSet batch");
            let variables = json!({ "metafields": batch });
            match self.graphql(METAFIELDS_SET, variables).await {
                Ok(resp) => {
                    let (updated, errors) = mutation_payload(&resp, "metafieldsSet", "metafields");
                    outcome.updated.extend(updated);
                    outcome.errors.extend(errors);
                }
                Err(e) => {
                    warn!(batch = i, error = %e, "metafieldsSet batch failed");
                    outcome.errors.push(error_value(&e));
                }
            }
        }
        info!(
            updated = outcome.updated.len(),
            errors = outcome.errors.len(),
            "metafields created"
        );
        outcome
    }

    /// One REST PUT per instruction, in order. Failures are recorded per item.
    pub async fn put_updates(&self, updates: &[UpdateInstruction]) -> Vec<WriteResult> {
        let pb = ProgressBar::new(updates.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})") {
            pb.set_style(style.progress_chars("=> "));
        }

        let mut results = Vec::with_capacity(updates.len());
        for update in updates {
            let url = format!("{}/metafields/{}.json", self.base_url, update.id.rest_id());
            let body = put_payload(update);
            let result = match self.send(Method::PUT, &url, Some(&body)).await {
                Ok((status, response)) => WriteResult {
                    id: update.id.clone(),
                    status: Some(status),
                    ok: true,
                    response: Some(response),
                    error: None,
                },
                Err(e) => {
                    warn!(id = %update.id, error = %e, "metafield update failed");
                    WriteResult {
                        id: update.id.clone(),
                        status: match &e {
                            GatewayError::Status { status, .. } => Some(*status),
                            _ => None,
                        },
                        ok: false,
                        response: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
            pb.inc(1);
        }

        pb.finish_and_clear();
        let ok = results.iter().filter(|r| r.ok).count();
        info!(ok, total = results.len(), "metafield updates sent");
        results
    }

    pub async fn product_metafields(&self, product_id: u64) -> Result<ProductMetafields, GatewayError> {
        let resp = self
            .graphql(PRODUCT_METAFIELDS, json!({ "id": product_gid(product_id) }))
            .await?;
        if let Some(errors) = resp.get("errors").filter(|e| !is_empty(e)) {
            return Err(GatewayError::GraphQl(errors.to_string()));
        }
        let metafields = exported_metafields(&resp);
        Ok(ProductMetafields {
            shop: self.shop.clone(),
            product_id,
            count: metafields.len(),
            metafields,
            fetched_at: Utc::now(),
        })
    }
}

/// Accepts a bare shop handle or a full host.
fn admin_base_url(shop: &str, api_version: &str) -> String {
    let shop = shop.trim().trim_start_matches("https://").trim_end_matches('/');
    let host = if shop.contains('.') {
        shop.to_string()
    } else {
        format!("{}.myshopify.com", shop)
    };
    format!("https://{}/admin/api/{}", host, api_version)
}

fn put_payload(update: &UpdateInstruction) -> Value {
    json!({
        "metafield": {
            "id": update.id,
            "value": update.value,
            "value_type": update.value_type.rest_value_type(),
        }
    })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn error_value(e: &GatewayError) -> Value {
    match e {
        GatewayError::Status { status, body, .. } => json!({ "status": status, "raw": body }),
        other => json!({ "message": other.to_string() }),
    }
}

/// Split a mutation response into (results, errors). Top-level GraphQL errors
/// and `userErrors` both land in errors.
fn mutation_payload(resp: &Value, mutation: &str, result_field: &str) -> (Vec<Value>, Vec<Value>) {
    let mut results = Vec::new();
    let mut errors = Vec::new();

    if let Some(Value::Array(top)) = resp.get("errors") {
        errors.extend(top.iter().cloned());
    }
    let payload = &resp["data"][mutation];
    if let Some(Value::Array(user)) = payload.get("userErrors") {
        errors.extend(user.iter().cloned());
    }
    match payload.get(result_field) {
        Some(Value::Array(items)) => results.extend(items.iter().cloned()),
        Some(item) if !is_empty(item) => results.push(item.clone()),
        _ => {}
    }

    (results, errors)
}

fn metaobject_ref(value: &Value) -> Option<MetaobjectRef> {
    if is_empty(value) {
        return None;
    }
    let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
    Some(MetaobjectRef {
        id: field("id"),
        handle: field("handle"),
        kind: field("type"),
    })
}

fn exported_metafields(resp: &Value) -> Vec<ExportedMetafield> {
    let Some(edges) = resp["data"]["product"]["metafields"]["edges"].as_array() else {
        return Vec::new();
    };
    edges
        .iter()
        .map(|edge| {
            let node = &edge["node"];
            let field = |name: &str| node.get(name).and_then(Value::as_str).map(str::to_string);
            ExportedMetafield {
                namespace: field("namespace"),
                key: field("key"),
                kind: field("type"),
                value: field("value"),
                reference: metaobject_ref(&node["reference"]),
                references: node["references"]["nodes"]
                    .as_array()
                    .map(|nodes| nodes.iter().filter_map(metaobject_ref).collect())
                    .unwrap_or_default(),
            }
        })
        .collect()
}

// ── Tests ──
