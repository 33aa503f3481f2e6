use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{RetryPolicy, TvMazeConfig};
use crate::error::MetadataError;
use crate::matching::{normalize_title, pick_candidate};

/// Episode count per season number, as published by the metadata service.
pub type SeasonTotals = BTreeMap<u32, u32>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowCandidate {
    pub id: u64,
    pub name: String,
    pub premiered_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedShow {
    pub id: u64,
    pub name: String,
    pub totals: SeasonTotals,
}

impl ResolvedShow {
    pub fn last_season(&self) -> u32 {
        self.totals.keys().copied().filter(|s| *s > 0).max().unwrap_or(0)
    }
}

#[async_trait]
pub trait MetadataApi: Send + Sync {
    async fn search_shows(&self, query: &str) -> Result<Vec<ShowCandidate>, MetadataError>;
    async fn season_totals(&self, show_id: u64) -> Result<SeasonTotals, MetadataError>;
}

#[derive(Debug, Clone)]
pub struct TvMazeClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl TvMazeClient {
    pub fn new(config: &TvMazeConfig) -> Result<Self, MetadataError> {
        let user_agent = format!("plexport/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| MetadataError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, MetadataError> {
        let mut attempt: u32 = 0;
        loop {
            let res = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| MetadataError::Request(e.to_string()))?;
            let status = res.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.retry.max_retries {
                    return Err(MetadataError::RateLimited {
                        attempts: attempt + 1,
                    });
                }
                let delay = retry_after(res.headers())
                    .map(|d| d.min(self.retry.max_delay))
                    .unwrap_or_else(|| self.retry.delay_for(attempt));
                attempt += 1;
                warn!(
                    "TVMaze rate limit hit, retrying in {:?} (retry {}/{})",
                    delay, attempt, self.retry.max_retries
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let text = res
                .text()
                .await
                .map_err(|e| MetadataError::Request(format!("reading body failed: {}", e)))?;
            if !status.is_success() {
                return Err(MetadataError::Request(format!("{} -> {}: {}", url, status, text)));
            }
            return serde_json::from_str(&text).map_err(|e| MetadataError::Parse(e.to_string()));
        }
    }
}

#[async_trait]
impl MetadataApi for TvMazeClient {
    async fn search_shows(&self, query: &str) -> Result<Vec<ShowCandidate>, MetadataError> {
        #[derive(Deserialize)]
        struct SearchHit {
            show: SearchShow,
        }
        #[derive(Deserialize)]
        struct SearchShow {
            id: u64,
            name: String,
            premiered: Option<String>,
        }

        let url = format!(
            "{}/search/shows?q={}",
            self.base_url,
            urlencoding::encode(query)
        );
        let hits: Vec<SearchHit> = self.get_json(&url).await?;
        debug!("TVMaze search '{}' returned {} results", query, hits.len());
        Ok(hits
            .into_iter()
            .map(|h| ShowCandidate {
                id: h.show.id,
                premiered_year: h.show.premiered.as_deref().and_then(extract_year),
                name: h.show.name,
            })
            .collect())
    }

    async fn season_totals(&self, show_id: u64) -> Result<SeasonTotals, MetadataError> {
        #[derive(Deserialize)]
        struct Episode {
            season: u32,
        }

        let url = format!("{}/shows/{}/episodes", self.base_url, show_id);
        let episodes: Vec<Episode> = self.get_json(&url).await?;
        Ok(count_by_season(episodes.iter().map(|e| e.season)))
    }
}

/// Search, pick a candidate and fetch its per-season totals. No caching here.
pub async fn resolve_totals(
    api: &dyn MetadataApi,
    title: &str,
    year_hint: Option<i32>,
) -> Result<ResolvedShow, MetadataError> {
    let query = normalize_title(title).with_year_hint(year_hint);
    if query.key.is_empty() {
        return Err(MetadataError::NotFound(title.to_string()));
    }
    let candidates = api.search_shows(&query.search_text).await?;
    let chosen = pick_candidate(title, &query, &candidates)?;
    let totals = api.season_totals(chosen.id).await?;
    Ok(ResolvedShow {
        id: chosen.id,
        name: chosen.name.clone(),
        totals,
    })
}

pub fn count_by_season<I>(seasons: I) -> SeasonTotals
where
    I: IntoIterator<Item = u32>,
{
    let mut totals = SeasonTotals::new();
    for season in seasons.into_iter().filter(|s| *s > 0) {
        *totals.entry(season).or_insert(0) += 1;
    }
    totals
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn extract_year(date: &str) -> Option<i32> {
    date.split('-').next().and_then(|s| s.parse().ok())
}
