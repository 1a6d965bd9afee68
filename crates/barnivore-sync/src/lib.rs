//! Ingestion pass: list companies, fetch each detail record, write everything to
//! the local store, then append a run record.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use barnivore_adapters::{
    ApiConfig, BarnivoreApi, CatalogSource, DEFAULT_BASE_URL, DEFAULT_USER_AGENT,
};
use barnivore_core::Company;
use barnivore_storage::{Store, StoreCounts, StoreError};
use chrono::Local;
use tracing::{error, info, warn};

pub const DEFAULT_PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_path: PathBuf,
    pub base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub detail_delay_secs: f64,
    pub progress_every: usize,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            database_path: std::env::var("BARNIVORE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_database_path()),
            base_url: std::env::var("BARNIVORE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            user_agent: std::env::var("BARNIVORE_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            http_timeout_secs: std::env::var("BARNIVORE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            detail_delay_secs: std::env::var("BARNIVORE_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            progress_every: std::env::var("BARNIVORE_PROGRESS_EVERY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PROGRESS_EVERY),
        }
    }

    pub fn api_config(&self) -> Result<ApiConfig> {
        let detail_delay = Duration::try_from_secs_f64(self.detail_delay_secs)
            .with_context(|| format!("invalid detail delay {}s", self.detail_delay_secs))?;
        Ok(ApiConfig {
            base_url: self.base_url.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            detail_delay,
        })
    }
}

/// `barnivore_YYYYMMDD.db` for the current local date.
pub fn default_database_path() -> PathBuf {
    PathBuf::from(format!("barnivore_{}.db", Local::now().format("%Y%m%d")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRunSummary {
    pub run_id: i64,
    pub listed: usize,
    /// Companies written with their detail record and products.
    pub processed: usize,
    /// Companies left shallow-only or whose writes failed.
    pub failed: usize,
    pub shallow_only: usize,
    pub counts: StoreCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ingested {
    Detailed { products: usize },
    ShallowOnly,
}

pub struct SyncPipeline {
    source: Box<dyn CatalogSource>,
    store: Store,
    progress_every: usize,
}

impl SyncPipeline {
    pub fn new(source: Box<dyn CatalogSource>, store: Store) -> Self {
        Self {
            source,
            store,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    /// Log a progress snapshot after every `every` companies; zero disables it.
    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        info!(db = %self.store.path().display(), "starting barnivore data scrape");
        self.store
            .ensure_schema()
            .await
            .context("initializing store schema")?;

        let companies = self.source.list_companies().await;
        let total = companies.len();
        let mut processed = 0usize;
        let mut failed = 0usize;
        let mut shallow_only = 0usize;

        for (idx, company) in companies.iter().enumerate() {
            let position = idx + 1;
            info!(
                position,
                total,
                company_id = company.id,
                name = company.display_name(),
                "processing company"
            );

            match self.ingest_company(company).await {
                Ok(Ingested::Detailed { products }) => {
                    processed += 1;
                    if products > 0 {
                        info!(company_id = company.id, products, "added products");
                    }
                }
                Ok(Ingested::ShallowOnly) => {
                    shallow_only += 1;
                    failed += 1;
                }
                Err(err) => {
                    error!(company_id = company.id, error = %err, "failed to process company");
                    failed += 1;
                }
            }

            if self.progress_every > 0 && position % self.progress_every == 0 {
                let counts = self
                    .store
                    .read_counts()
                    .await
                    .context("reading progress counts")?;
                info!(
                    position,
                    total,
                    companies = counts.companies,
                    products = counts.products,
                    "progress"
                );
            }
        }

        let note = format!("Scraped {processed} companies, {failed} failed");
        let run = self
            .store
            .record_run(Some(&note))
            .await
            .context("recording run")?;
        let counts = self
            .store
            .read_counts()
            .await
            .context("reading final counts")?;

        info!(
            run_id = run.id,
            processed,
            failed,
            shallow_only,
            companies = counts.companies,
            products = counts.products,
            "scraping completed"
        );

        Ok(SyncRunSummary {
            run_id: run.id,
            listed: total,
            processed,
            failed,
            shallow_only,
            counts,
        })
    }

    async fn ingest_company(&self, company: &Company) -> Result<Ingested, StoreError> {
        // the shallow row must exist even if the detail fetch fails
        self.store.upsert_company(company).await?;

        let Some(mut detail) = self.source.company_detail(company.id).await else {
            return Ok(Ingested::ShallowOnly);
        };
        if detail.id != company.id {
            warn!(
                company_id = company.id,
                detail_id = detail.id,
                "detail record carries a different id, storing it under the listed id"
            );
            detail.id = company.id;
        }

        self.store.upsert_company(&detail).await?;
        self.store
            .upsert_products(company.id, &detail.products)
            .await?;
        Ok(Ingested::Detailed {
            products: detail.products.len(),
        })
    }
}

pub async fn run_sync_once(config: &SyncConfig) -> Result<SyncRunSummary> {
    let api = BarnivoreApi::new(config.api_config()?).context("building barnivore api client")?;
    let store = Store::open(&config.database_path);
    SyncPipeline::new(Box::new(api), store)
        .with_progress_every(config.progress_every)
        .run_once()
        .await
}

/// Current store counts without touching the remote catalog.
pub async fn store_counts(path: &Path) -> Result<StoreCounts> {
    let store = Store::open(path);
    store.ensure_schema().await.context("initializing store schema")?;
    store.read_counts().await.context("reading store counts")
}
