use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::config::ResolvedConfig;
use crate::error::ListerError;

#[derive(Debug, Clone, Deserialize)]
pub struct SystemInfo {
    pub harbor_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryRecord {
    /// Full name including the project, e.g. `library/nginx`.
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactRecord {
    #[serde(default)]
    pub digest: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<TagRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRecord {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_time")]
    pub push_time: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        DateTime::parse_from_rfc3339(&value)
            .ok()
            .map(|time| time.with_timezone(&Utc))
            .filter(|time| time.year() > 1)
    }))
}

pub trait HarborClient: Send + Sync {
    fn system_info(&self) -> Result<SystemInfo, ListerError>;
    fn list_projects(&self, page: u32, page_size: u32) -> Result<Vec<ProjectRecord>, ListerError>;
    fn list_repositories(
        &self,
        project: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<RepositoryRecord>, ListerError>;
    fn list_artifacts(
        &self,
        project: &str,
        repository: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ArtifactRecord>, ListerError>;
}

/// Walks pages starting at 1 until a short or empty page comes back.
pub fn fetch_all_pages<T, F>(page_size: u32, mut fetch: F) -> Result<Vec<T>, ListerError>
where
    F: FnMut(u32) -> Result<Vec<T>, ListerError>,
{
    let mut all = Vec::new();
    let mut page = 1u32;
    loop {
        let items = fetch(page)?;
        let count = items.len();
        all.extend(items);
        if count == 0 || count < page_size as usize {
            break;
        }
        page += 1;
    }
    Ok(all)
}

#[derive(Clone)]
pub struct HarborHttpClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HarborHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, ListerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("harbor-lister/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ListerError::HarborHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_ssl)
            .build()
            .map_err(|err| ListerError::HarborHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.harbor_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ListerError> {
        let url = format!("{}{}", self.base_url, path);
        let started = Instant::now();
        let response = self.send_with_retries(|| {
            self.client
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
        })?;
        let response = Self::handle_status(response)?;
        let body = response
            .text()
            .map_err(|err| ListerError::HarborHttp(err.to_string()))?;
        debug!(
            path,
            latency_ms = started.elapsed().as_millis() as u64,
            "harbor.request"
        );
        serde_json::from_str(&body).map_err(|err| ListerError::Decode(format!("{path}: {err}")))
    }

    fn handle_status(response: Response) -> Result<Response, ListerError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .ok()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| "Harbor request failed".to_string());
        Err(ListerError::HarborStatus { status, message })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, ListerError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        debug!(status, attempt, "harbor.retry");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        debug!(error = %err, attempt, "harbor.retry");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(ListerError::HarborHttp(err.to_string()));
                }
            }
        }
    }
}

impl HarborClient for HarborHttpClient {
    fn system_info(&self) -> Result<SystemInfo, ListerError> {
        self.get_json("/systeminfo")
    }

    fn list_projects(&self, page: u32, page_size: u32) -> Result<Vec<ProjectRecord>, ListerError> {
        self.get_json(&format!("/projects?page={page}&page_size={page_size}"))
    }

    fn list_repositories(
        &self,
        project: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<RepositoryRecord>, ListerError> {
        self.get_json(&format!(
            "/projects/{}/repositories?page={page}&page_size={page_size}",
            encode_segment(project)
        ))
    }

    fn list_artifacts(
        &self,
        project: &str,
        repository: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ArtifactRecord>, ListerError> {
        self.get_json(&artifacts_path(project, repository, page, page_size))
    }
}

pub fn artifacts_path(project: &str, repository: &str, page: u32, page_size: u32) -> String {
    format!(
        "/projects/{}/repositories/{}/artifacts?page={page}&page_size={page_size}&with_tag=true",
        encode_segment(project),
        encode_repository_name(repository)
    )
}

/// Harbor decodes the repository segment twice, so `a/b` must travel as `a%252Fb`.
pub fn encode_repository_name(name: &str) -> String {
    encode_segment(&encode_segment(name))
}

fn encode_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
