//! Remote catalog access: an HTTP fetcher plus the Barnivore JSON API adapter.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use barnivore_core::{decode_company_detail, decode_company_list, Category, Company};
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

pub const DEFAULT_BASE_URL: &str = "https://www.barnivore.com";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// URL after redirects.
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("building http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Single-attempt GET client. Failures surface immediately; callers decide
/// whether to skip or give up.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", url);
        async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let body = resp.bytes().await?.to_vec();
            Ok(FetchedResponse { final_url, body })
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decoding {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no company object in {url}")]
    MissingCompany { url: String },
}

/// Keep the first record seen for each company id, preserving order.
pub fn dedup_first_seen(companies: Vec<Company>) -> Vec<Company> {
    let mut seen = HashSet::new();
    companies
        .into_iter()
        .filter(|company| seen.insert(company.id))
        .collect()
}

/// A remote catalog of companies grouped by category, with a per-company detail view.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn categories(&self) -> &[Category] {
        &Category::ALL
    }

    async fn fetch_category(&self, category: Category) -> Result<Vec<Company>, SourceError>;

    async fn fetch_detail(&self, company_id: i64) -> Result<Company, SourceError>;

    /// Combined company list across all categories, deduplicated by id in
    /// first-seen order. A failing category is logged and skipped.
    async fn list_companies(&self) -> Vec<Company> {
        info!("fetching company lists from all categories");
        let mut all = Vec::new();

        for &category in self.categories() {
            info!(%category, "fetching category");
            match self.fetch_category(category).await {
                Ok(companies) => {
                    info!(%category, count = companies.len(), "retrieved companies");
                    all.extend(companies);
                }
                Err(err) => {
                    error!(%category, error = %err, "failed to fetch category, skipping");
                }
            }
        }

        let unique = dedup_first_seen(all);
        info!(unique = unique.len(), "total unique companies retrieved");
        unique
    }

    /// Detail record with embedded products, or `None` when it could not be fetched.
    async fn company_detail(&self, company_id: i64) -> Option<Company> {
        match self.fetch_detail(company_id).await {
            Ok(company) => Some(company),
            Err(err) => {
                warn!(company_id, error = %err, "failed to fetch company detail");
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    /// Fixed pause before every detail request.
    pub detail_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            detail_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BarnivoreApi {
    base_url: String,
    detail_delay: Duration,
    http: HttpFetcher,
}

impl BarnivoreApi {
    pub fn new(config: ApiConfig) -> Result<Self, FetchError> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.timeout,
            user_agent: Some(config.user_agent),
        })?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            detail_delay: config.detail_delay,
            http,
        })
    }

    pub fn category_url(&self, category: Category) -> String {
        format!("{}/{}", self.base_url, category.path())
    }

    pub fn detail_url(&self, company_id: i64) -> String {
        format!("{}/company/{company_id}.json", self.base_url)
    }
}

#[async_trait]
impl CatalogSource for BarnivoreApi {
    async fn fetch_category(&self, category: Category) -> Result<Vec<Company>, SourceError> {
        let resp = self.http.fetch_bytes(&self.category_url(category)).await?;
        let list = decode_company_list(&resp.body).map_err(|source| SourceError::Decode {
            url: resp.final_url.clone(),
            source,
        })?;
        if list.skipped > 0 {
            warn!(
                %category,
                skipped = list.skipped,
                "dropped list items without a usable company id"
            );
        }
        for company in list.companies.iter().filter(|c| c.skipped_products > 0) {
            warn!(
                company_id = company.id,
                skipped = company.skipped_products,
                "dropped products without a usable id"
            );
        }
        Ok(list.companies)
    }

    async fn fetch_detail(&self, company_id: i64) -> Result<Company, SourceError> {
        if !self.detail_delay.is_zero() {
            tokio::time::sleep(self.detail_delay).await;
        }

        let resp = self.http.fetch_bytes(&self.detail_url(company_id)).await?;
        let company = decode_company_detail(&resp.body)
            .map_err(|source| SourceError::Decode {
                url: resp.final_url.clone(),
                source,
            })?
            .ok_or_else(|| SourceError::MissingCompany {
                url: resp.final_url.clone(),
            })?;
        if company.skipped_products > 0 {
            warn!(
                company_id,
                skipped = company.skipped_products,
                "dropped products without a usable id"
            );
        }
        Ok(company)
    }
}
