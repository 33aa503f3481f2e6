use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::MetadataError;
use crate::matching::normalize_title;
use crate::models::{MetadataOutcome, SeasonStatus, ShowRecord, UNKNOWN};
use crate::plex::{MediaServerApi, SeasonCount};
use crate::tvmaze::{resolve_totals, MetadataApi, ResolvedShow, SeasonTotals, ShowCandidate};

type LookupResult = Result<ResolvedShow, MetadataError>;
type Memo<K, V> = Mutex<HashMap<K, Arc<OnceCell<Result<V, MetadataError>>>>>;

/// Run-scoped memo in front of a [`MetadataApi`].
///
/// Searches are keyed by normalized title without the year, so library shows
/// that differ only by year share one request; season totals are keyed by show
/// id. Failures are memoized too and not retried within the run.
pub struct CachedMetadata {
    api: Arc<dyn MetadataApi>,
    searches: Memo<String, Vec<ShowCandidate>>,
    totals: Memo<u64, SeasonTotals>,
}

impl CachedMetadata {
    pub fn new(api: Arc<dyn MetadataApi>) -> Self {
        Self {
            api,
            searches: Mutex::new(HashMap::new()),
            totals: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lookup(&self, title: &str, year_hint: Option<i32>) -> LookupResult {
        resolve_totals(self, title, year_hint).await
    }

    /// Distinct searches issued so far.
    pub async fn len(&self) -> usize {
        self.searches.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn memo_cell<K, V>(memo: &Memo<K, V>, key: K) -> Arc<OnceCell<Result<V, MetadataError>>>
where
    K: std::hash::Hash + Eq,
{
    let mut guard = memo.lock().await;
    Arc::clone(guard.entry(key).or_insert_with(|| Arc::new(OnceCell::new())))
}

#[async_trait]
impl MetadataApi for CachedMetadata {
    async fn search_shows(&self, query: &str) -> Result<Vec<ShowCandidate>, MetadataError> {
        let key = normalize_title(query).key;
        let cell = memo_cell(&self.searches, key.clone()).await;
        if cell.initialized() {
            debug!("Search cache hit for '{}'", key);
        }
        cell.get_or_init(|| self.api.search_shows(query))
            .await
            .clone()
    }

    async fn season_totals(&self, show_id: u64) -> Result<SeasonTotals, MetadataError> {
        let cell = memo_cell(&self.totals, show_id).await;
        cell.get_or_init(|| self.api.season_totals(show_id))
            .await
            .clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryShow {
    pub rating_key: String,
    pub title: String,
    pub year: Option<i32>,
}

impl LibraryShow {
    pub fn from_metadata(item: &Value) -> Option<Self> {
        let rating_key = match item.get("ratingKey") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return None,
        };
        let title = item
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN.to_string());
        let year = item
            .get("year")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok());
        Some(Self {
            rating_key,
            title,
            year,
        })
    }

    fn lookup_key(&self) -> String {
        normalize_title(&self.title)
            .with_year_hint(self.year)
            .lookup_key()
    }
}

/// Media-server counts and lookup outcome for one show, before padding.
#[derive(Debug, Clone)]
pub struct AuditedShow {
    pub title: String,
    pub year: Option<i32>,
    pub present: BTreeMap<u32, u32>,
    pub lookup: LookupResult,
}

impl AuditedShow {
    pub fn new(show: LibraryShow, seasons: &[SeasonCount], lookup: LookupResult) -> Self {
        let mut present = BTreeMap::new();
        for season in seasons.iter().filter(|s| s.season_number > 0) {
            *present.entry(season.season_number).or_insert(0) += season.episodes;
        }
        Self {
            title: show.title,
            year: show.year,
            present,
            lookup,
        }
    }

    /// Highest season number known from either side; specials excluded.
    pub fn real_season_count(&self) -> u32 {
        let local = self.present.keys().copied().max().unwrap_or(0);
        let remote = self.lookup.as_ref().map(|r| r.last_season()).unwrap_or(0);
        local.max(remote)
    }

    pub fn into_record(self, max_season: u32) -> ShowRecord {
        let real = self.real_season_count();
        let seasons = (1..=max_season)
            .map(|n| {
                if n > real {
                    return SeasonStatus::non_existent(n);
                }
                let present = self.present.get(&n).copied().unwrap_or(0);
                let total = match &self.lookup {
                    Ok(resolved) => Some(resolved.totals.get(&n).copied().unwrap_or(0)),
                    Err(_) => None,
                };
                SeasonStatus::new(n, present, total)
            })
            .collect();
        let lookup = match self.lookup {
            Ok(resolved) => MetadataOutcome::Matched {
                id: resolved.id,
                name: resolved.name,
            },
            Err(e) => MetadataOutcome::Unavailable(e),
        };
        ShowRecord {
            title: self.title,
            year: self.year,
            seasons,
            lookup,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditReport {
    pub shows: Vec<ShowRecord>,
    pub max_season: u32,
    /// Titles that could not be audited (season fetch failed or the task died).
    pub skipped: Vec<String>,
}

impl AuditReport {
    pub fn unmatched(&self) -> usize {
        self.shows.iter().filter(|s| !s.is_matched()).count()
    }
}

/// Pads every show to the global max season and sorts by title.
pub fn build_report(audited: Vec<AuditedShow>, mut skipped: Vec<String>) -> AuditReport {
    let max_season = audited
        .iter()
        .map(AuditedShow::real_season_count)
        .max()
        .unwrap_or(0);
    let mut shows: Vec<ShowRecord> = audited
        .into_iter()
        .map(|s| s.into_record(max_season))
        .collect();
    shows.sort_by(|a, b| {
        a.title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.year.cmp(&b.year))
    });
    skipped.sort();
    AuditReport {
        shows,
        max_season,
        skipped,
    }
}

/// Lookup keys shared by more than one library show.
pub fn duplicate_keys(shows: &[LibraryShow]) -> HashSet<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for show in shows {
        *counts.entry(show.lookup_key()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(key, _)| key)
        .collect()
}

pub struct ShowAuditor {
    server: Arc<dyn MediaServerApi>,
    metadata: Arc<CachedMetadata>,
    concurrency: usize,
}

impl ShowAuditor {
    pub fn new(
        server: Arc<dyn MediaServerApi>,
        metadata: Arc<CachedMetadata>,
        concurrency: usize,
    ) -> Self {
        Self {
            server,
            metadata,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn audit(&self, items: &[Value]) -> AuditReport {
        let shows: Vec<LibraryShow> = items
            .iter()
            .filter_map(|item| {
                let show = LibraryShow::from_metadata(item);
                if show.is_none() {
                    warn!("Skipping TV library item without ratingKey");
                }
                show
            })
            .collect();
        let duplicates = duplicate_keys(&shows);
        // Titles not yet accounted for; whatever remains after joining belongs
        // to tasks that died without reporting back.
        let mut pending: Vec<String> = shows.iter().map(|s| s.title.clone()).collect();

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut joinset = JoinSet::new();
        for show in shows {
            let sem = Arc::clone(&sem);
            let server = Arc::clone(&self.server);
            let metadata = Arc::clone(&self.metadata);
            let duplicate = duplicates.contains(&show.lookup_key());
            joinset.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return Err(show.title),
                };
                info!("Processing: {}", show.title);

                let seasons = match server.show_seasons(&show.rating_key).await {
                    Ok(seasons) => seasons,
                    Err(e) => {
                        warn!("Failed to read seasons for '{}' from Plex: {}", show.title, e);
                        return Err(show.title);
                    }
                };

                let lookup = if duplicate {
                    Err(MetadataError::DuplicateLibraryTitle(show.title.clone()))
                } else {
                    metadata.lookup(&show.title, show.year).await
                };
                if let Err(e) = &lookup {
                    warn!("Could not find TVMaze info for '{}': {}", show.title, e);
                }
                Ok(AuditedShow::new(show, &seasons, lookup))
            });
        }

        let mut audited = Vec::new();
        let mut skipped = Vec::new();
        while let Some(joined) = joinset.join_next().await {
            match joined {
                Ok(Ok(show)) => {
                    settle(&mut pending, &show.title);
                    audited.push(show);
                }
                Ok(Err(title)) => {
                    settle(&mut pending, &title);
                    skipped.push(title);
                }
                Err(e) => error!("Show audit task failed: {}", e),
            }
        }
        for title in &pending {
            warn!("Show '{}' was not audited", title);
        }
        skipped.extend(pending);

        build_report(audited, skipped)
    }
}

fn settle(pending: &mut Vec<String>, title: &str) {
    if let Some(pos) = pending.iter().position(|t| t == title) {
        pending.swap_remove(pos);
    }
}
