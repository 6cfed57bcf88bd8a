use std::fs::{self, File};
use std::path::Path;
use std::thread;
use std::time::Duration;

use directories::BaseDirs;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::annotations::AnnotationSnapshot;
use crate::domain::SynapseId;
use crate::error::AnnotatorError;
use crate::query::{IndexFilter, IndexRow};

pub const DEFAULT_ENDPOINT: &str = "https://repo-prod.prod.sagebase.org/repo/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Folder,
    File,
    Other,
}

impl EntityKind {
    pub fn from_concrete_type(concrete_type: &str) -> Self {
        match concrete_type.rsplit('.').next() {
            Some("Project") => EntityKind::Project,
            Some("Folder") => EntityKind::Folder,
            Some("FileEntity") => EntityKind::File,
            _ => EntityKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityHeader {
    pub id: SynapseId,
    pub name: String,
    pub parent_id: Option<SynapseId>,
    pub kind: EntityKind,
}

/// Provenance activity: inputs used plus the executed workflow reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub name: String,
    pub description: Option<String>,
    pub used: Vec<SynapseId>,
    pub executed: Option<String>,
}

pub trait SynapseClient: Send + Sync {
    fn entity_header(&self, id: &SynapseId) -> Result<EntityHeader, AnnotatorError>;
    fn query_files(
        &self,
        fileview: &SynapseId,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexRow>, AnnotatorError>;
    fn get_annotations(&self, id: &SynapseId) -> Result<AnnotationSnapshot, AnnotatorError>;
    fn set_annotations(&self, snapshot: &AnnotationSnapshot) -> Result<(), AnnotatorError>;
    fn download_file(&self, id: &SynapseId, destination: &Path) -> Result<(), AnnotatorError>;
    fn create_activity(&self, activity: &Activity) -> Result<String, AnnotatorError>;
    fn set_generated_by(&self, id: &SynapseId, activity_id: &str) -> Result<(), AnnotatorError>;
}

/// Folder path of `id` relative to its project, e.g. `results/sarek_out`.
pub fn resolve_path<C: SynapseClient + ?Sized>(
    client: &C,
    id: &SynapseId,
) -> Result<String, AnnotatorError> {
    let mut names = Vec::new();
    let mut current = Some(id.clone());
    while let Some(entity_id) = current {
        let header = client.entity_header(&entity_id)?;
        if header.kind == EntityKind::Project {
            break;
        }
        names.push(header.name);
        current = header.parent_id;
    }
    names.reverse();
    Ok(names.join("/"))
}

#[derive(Clone)]
pub struct SynapseHttpClient {
    client: Client,
    base_url: String,
}

impl SynapseHttpClient {
    pub fn new(endpoint: &str) -> Result<Self, AnnotatorError> {
        let token = resolve_auth_token()?;
        Self::with_token(endpoint, &token)
    }

    pub fn with_token(endpoint: &str, token: &str) -> Result<Self, AnnotatorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("nf-annotate/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AnnotatorError::SynapseHttp(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|err| AnnotatorError::SynapseHttp(err.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| AnnotatorError::SynapseHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, AnnotatorError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Synapse request failed".to_string());
        Err(AnnotatorError::SynapseStatus { status, message })
    }

    fn read_json(response: reqwest::blocking::Response) -> Result<Value, AnnotatorError> {
        Self::handle_status(response)?
            .json::<Value>()
            .map_err(|err| AnnotatorError::SynapseHttp(err.to_string()))
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, AnnotatorError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(AnnotatorError::SynapseHttp(err.to_string()));
                }
            }
        }
    }

    fn run_query(
        &self,
        fileview: &SynapseId,
        sql: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Value, AnnotatorError> {
        const POLL_DELAY_MS: u64 = 500;
        const MAX_POLLS: usize = 600;

        let start_url = self.url(&format!("/entity/{fileview}/table/query/async/start"));
        let body = json!({
            "concreteType": "org.sagebionetworks.repo.model.table.QueryBundleRequest",
            "entityId": fileview.as_str(),
            "partMask": 1,
            "query": { "sql": sql, "offset": offset, "limit": limit },
        });
        let started = Self::read_json(self.send_with_retries(|| {
            self.client.post(&start_url).json(&body)
        })?)?;
        let token = started
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| AnnotatorError::SynapseHttp("query job without token".to_string()))?
            .to_string();

        let get_url = self.url(&format!("/entity/{fileview}/table/query/async/get/{token}"));
        for _ in 0..MAX_POLLS {
            let response = self.send_with_retries(|| self.client.get(&get_url))?;
            if response.status() == StatusCode::ACCEPTED {
                thread::sleep(Duration::from_millis(POLL_DELAY_MS));
                continue;
            }
            return Self::read_json(response);
        }
        Err(AnnotatorError::SynapseHttp(format!(
            "query on {fileview} did not finish"
        )))
    }
}

impl SynapseClient for SynapseHttpClient {
    fn entity_header(&self, id: &SynapseId) -> Result<EntityHeader, AnnotatorError> {
        let url = self.url(&format!("/entity/{id}"));
        let value = Self::read_json(self.send_with_retries(|| self.client.get(&url))?)?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let parent_id = value
            .get("parentId")
            .and_then(Value::as_str)
            .map(str::parse::<SynapseId>)
            .transpose()?;
        let kind = value
            .get("concreteType")
            .and_then(Value::as_str)
            .map(EntityKind::from_concrete_type)
            .unwrap_or(EntityKind::Other);
        Ok(EntityHeader {
            id: id.clone(),
            name,
            parent_id,
            kind,
        })
    }

    fn query_files(
        &self,
        fileview: &SynapseId,
        filter: &IndexFilter,
    ) -> Result<Vec<IndexRow>, AnnotatorError> {
        const PAGE_SIZE: usize = 5000;
        let sql = filter.to_sql(fileview);
        debug!(%fileview, %sql, "fileview query");

        let mut rows = Vec::new();
        let mut offset = 0usize;
        loop {
            let bundle = self.run_query(fileview, &sql, offset, PAGE_SIZE)?;
            let page = parse_query_rows(&bundle)?;
            let count = page.len();
            rows.extend(page);
            if count < PAGE_SIZE {
                break;
            }
            offset += count;
        }
        Ok(rows)
    }

    fn get_annotations(&self, id: &SynapseId) -> Result<AnnotationSnapshot, AnnotatorError> {
        let url = self.url(&format!("/entity/{id}/annotations2"));
        let value = Self::read_json(self.send_with_retries(|| self.client.get(&url))?)?;
        AnnotationSnapshot::from_json(&value)
    }

    fn set_annotations(&self, snapshot: &AnnotationSnapshot) -> Result<(), AnnotatorError> {
        let url = self.url(&format!("/entity/{}/annotations2", snapshot.id));
        let body = snapshot.to_json();
        let response = self.send_with_retries(|| self.client.put(&url).json(&body))?;
        Self::handle_status(response)?;
        Ok(())
    }

    fn download_file(&self, id: &SynapseId, destination: &Path) -> Result<(), AnnotatorError> {
        let url = self.url(&format!("/entity/{id}/file"));
        let mut response =
            Self::handle_status(self.send_with_retries(|| self.client.get(&url))?)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| AnnotatorError::Filesystem(err.to_string()))?;
        }
        let mut file =
            File::create(destination).map_err(|err| AnnotatorError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| AnnotatorError::Filesystem(err.to_string()))?;
        Ok(())
    }

    fn create_activity(&self, activity: &Activity) -> Result<String, AnnotatorError> {
        let url = self.url("/activity");
        let mut used = activity
            .used
            .iter()
            .map(|id| {
                json!({
                    "concreteType": "org.sagebionetworks.repo.model.provenance.UsedEntity",
                    "reference": { "targetId": id.as_str() },
                    "wasExecuted": false,
                })
            })
            .collect::<Vec<_>>();
        if let Some(executed) = &activity.executed {
            used.push(json!({
                "concreteType": "org.sagebionetworks.repo.model.provenance.UsedURL",
                "url": executed,
                "wasExecuted": true,
            }));
        }
        let body = json!({
            "name": activity.name,
            "description": activity.description,
            "used": used,
        });
        let value =
            Self::read_json(self.send_with_retries(|| self.client.post(&url).json(&body))?)?;
        value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AnnotatorError::SynapseHttp("activity without id".to_string()))
    }

    fn set_generated_by(&self, id: &SynapseId, activity_id: &str) -> Result<(), AnnotatorError> {
        let url = self.url(&format!("/entity/{id}/generatedBy"));
        let response = self.send_with_retries(|| {
            self.client
                .put(&url)
                .query(&[("generatedBy", activity_id)])
        })?;
        Self::handle_status(response)?;
        Ok(())
    }
}

fn parse_query_rows(bundle: &Value) -> Result<Vec<IndexRow>, AnnotatorError> {
    let results = bundle
        .pointer("/queryResult/queryResults")
        .ok_or_else(|| AnnotatorError::SynapseHttp("query bundle without results".to_string()))?;
    let headers = results
        .get("headers")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|header| header.get("name").and_then(Value::as_str).unwrap_or_default())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| *header == name)
            .ok_or_else(|| AnnotatorError::SynapseHttp(format!("query result lacks {name}")))
    };
    let (path_idx, name_idx, id_idx) = (column("path")?, column("name")?, column("id")?);

    let mut rows = Vec::new();
    for row in results
        .get("rows")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let values = row
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let cell = |idx: usize| {
            values
                .get(idx)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        rows.push(IndexRow {
            path: cell(path_idx),
            name: cell(name_idx),
            id: cell(id_idx).parse()?,
        });
    }
    Ok(rows)
}

fn resolve_auth_token() -> Result<String, AnnotatorError> {
    if let Ok(token) = std::env::var("SYNAPSE_AUTH_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".synapseConfig"))
        .and_then(|path| fs::read_to_string(path).ok())
        .and_then(|content| token_from_synapse_config(&content))
        .ok_or(AnnotatorError::MissingAuthToken)
}

fn token_from_synapse_config(content: &str) -> Option<String> {
    let mut in_auth = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_auth = line == "[authentication]";
            continue;
        }
        if !in_auth {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "authtoken" && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
