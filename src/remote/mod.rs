//! Repository resolution and transfer.
//!
//! RepositoryName::resolve -> owner/name (bare `name` expands to `name/name`)
//! RepositorySource         -> metadata lookup + raw file fetch (trait seam)
//! GithubSource             -> reqwest implementation against api / raw hosts
//!
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_RAW_URL: &str = "https://raw.githubusercontent.com";

/// `owner/name` pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryName {
    pub owner: String,
    pub name: String,
}

impl RepositoryName {
    /// Resolve user input into a repository name.
    ///
    /// - "diem"        -> diem/diem
    /// - "acme/tools"  -> acme/tools
    /// - "acme/a/b"    -> owner "acme", name "a/b" (split at the first slash)
    pub fn resolve(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("Repository name is empty");
        }
        let (owner, name) = trimmed.split_once('/').unwrap_or((trimmed, trimmed));
        if owner.is_empty() || name.is_empty() {
            bail!("Invalid repository name '{raw}' (expected OWNER/NAME or NAME)");
        }
        Ok(RepositoryName {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.owner.as_str()).chain(self.name.split('/'))
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Subset of the repository metadata document we care about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryMetadata {
    pub default_branch: String,
}

/// Where repositories are looked up and files are read from.
#[allow(async_fn_in_trait)]
pub trait RepositorySource {
    /// `Ok(None)` when the repository does not exist (or is not visible).
    async fn metadata(&self, repo: &RepositoryName) -> Result<Option<RepositoryMetadata>>;

    /// Raw contents of `path` on `branch`.
    async fn fetch(&self, repo: &RepositoryName, branch: &str, path: &str) -> Result<Vec<u8>>;

    /// Location of `path` on `branch`, used in diagnostics.
    fn file_url(&self, repo: &RepositoryName, branch: &str, path: &str) -> Result<Url>;
}

/// Append path segments to a base URL, splitting each part on `/`.
fn with_segments<'a>(base: &Url, parts: impl IntoIterator<Item = &'a str>) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segs = url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("URL cannot be a base: {base}"))?;
        segs.pop_if_empty();
        for part in parts {
            segs.extend(part.split('/').filter(|s| !s.is_empty()));
        }
    }
    Ok(url)
}

/// `{api}/repos/{owner}/{name}`
pub fn metadata_url(api: &Url, repo: &RepositoryName) -> Result<Url> {
    with_segments(api, std::iter::once("repos").chain(repo.segments()))
}

/// `{raw}/{owner}/{name}/{branch}/{path}`
pub fn raw_file_url(raw: &Url, repo: &RepositoryName, branch: &str, path: &str) -> Result<Url> {
    with_segments(raw, repo.segments().chain([branch, path]))
}

/// GitHub-backed source (REST API for metadata, raw host for contents).
#[derive(Debug, Clone)]
pub struct GithubSource {
    client: reqwest::Client,
    api: Url,
    raw: Url,
    token: Option<String>,
}

impl GithubSource {
    pub fn new(api: Url, raw: Url, token: Option<String>) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(concat!("diem/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(16))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(GithubSource {
            client,
            api,
            raw,
            token,
        })
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let req = self.client.get(url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

impl RepositorySource for GithubSource {
    async fn metadata(&self, repo: &RepositoryName) -> Result<Option<RepositoryMetadata>> {
        let url = metadata_url(&self.api, repo)?;
        crate::log_debug!("GET {url}");
        let response = self
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("Failed to query {url}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("Repository lookup failed: {url}"))?;
        let meta = response
            .json::<RepositoryMetadata>()
            .await
            .with_context(|| format!("Unexpected repository metadata from {url}"))?;
        Ok(Some(meta))
    }

    async fn fetch(&self, repo: &RepositoryName, branch: &str, path: &str) -> Result<Vec<u8>> {
        let url = self.file_url(repo, branch, path)?;
        crate::log_debug!("GET {url}");
        let bytes = self
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("GET {url}"))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?;
        Ok(bytes.to_vec())
    }

    fn file_url(&self, repo: &RepositoryName, branch: &str, path: &str) -> Result<Url> {
        raw_file_url(&self.raw, repo, branch, path)
    }
}
