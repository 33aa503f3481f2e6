use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::ValueEnum;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::{AuditReport, CachedMetadata, ShowAuditor};
use crate::config::Config;
use crate::models::MovieRecord;
use crate::movies::extract_movies;
use crate::plex::{MediaServerApi, PlexClient};
use crate::report::{self, SheetModel};
use crate::tvmaze::{MetadataApi, TvMazeClient};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportMode {
    Movies,
    Tv,
    #[default]
    All,
}

impl ExportMode {
    pub fn includes_movies(self) -> bool {
        matches!(self, ExportMode::Movies | ExportMode::All)
    }

    pub fn includes_tv(self) -> bool {
        matches!(self, ExportMode::Tv | ExportMode::All)
    }
}

/// Everything gathered for one run, before any file is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    pub movies: Option<Vec<MovieRecord>>,
    pub tv: Option<AuditReport>,
}

impl Collected {
    pub fn sheets(&self) -> Vec<SheetModel> {
        let mut sheets = Vec::new();
        if let Some(movies) = &self.movies {
            sheets.push(report::movies_sheet(movies));
        }
        if let Some(tv) = &self.tv {
            sheets.push(report::tv_sheet(&tv.shows, tv.max_season));
        }
        sheets
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub movies: usize,
    pub shows: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub skipped: usize,
    pub max_season: u32,
}

pub struct Exporter {
    server: Arc<dyn MediaServerApi>,
    metadata: Arc<CachedMetadata>,
    config: Config,
}

impl Exporter {
    pub fn new(server: Arc<dyn MediaServerApi>, metadata: Arc<dyn MetadataApi>, config: Config) -> Self {
        Self {
            server,
            metadata: Arc::new(CachedMetadata::new(metadata)),
            config,
        }
    }

    /// Reads the requested sections. Any connector error aborts the run.
    pub async fn collect(&self, mode: ExportMode) -> Result<Collected> {
        let mut collected = Collected::default();

        if mode.includes_movies() {
            let section = self.server.section(&self.config.movies_section).await?;
            let items = self.server.section_items(&section).await?;
            info!("Found {} movies in section '{}'", items.len(), section.title);
            collected.movies = Some(extract_movies(&items));
        }

        if mode.includes_tv() {
            let section = self.server.section(&self.config.tv_section).await?;
            let items = self.server.section_items(&section).await?;
            info!("Found {} shows in section '{}'", items.len(), section.title);
            let auditor = ShowAuditor::new(
                Arc::clone(&self.server),
                Arc::clone(&self.metadata),
                self.config.lookup_concurrency,
            );
            let report = auditor.audit(&items).await;
            if !report.skipped.is_empty() {
                warn!("Skipped shows (no row written): {}", report.skipped.join(", "));
            }
            info!(
                "Audited {} shows with {} distinct TVMaze searches",
                report.shows.len(),
                self.metadata.len().await
            );
            collected.tv = Some(report);
        }

        Ok(collected)
    }

    pub async fn run(
        &self,
        mode: ExportMode,
        output: Option<PathBuf>,
        today: NaiveDate,
    ) -> Result<ExportOutcome> {
        let collected = self.collect(mode).await?;
        let path = resolve_output(output, &self.config.output_dir, mode, today);
        write_report(&collected.sheets(), &path)?;

        let tv = collected.tv.unwrap_or_default();
        Ok(ExportOutcome {
            path,
            movies: collected.movies.map(|m| m.len()).unwrap_or(0),
            shows: tv.shows.len(),
            matched: tv.shows.len() - tv.unmatched(),
            unmatched: tv.unmatched(),
            skipped: tv.skipped.len(),
            max_season: tv.max_season,
        })
    }
}

/// An existing directory gets the default filename appended.
pub fn resolve_output(
    output: Option<PathBuf>,
    output_dir: &Path,
    mode: ExportMode,
    today: NaiveDate,
) -> PathBuf {
    let filename = report::output_filename(mode, today);
    match output {
        Some(path) if path.is_dir() => path.join(filename),
        Some(path) => path,
        None => output_dir.join(filename),
    }
}

fn write_report(sheets: &[SheetModel], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    report::save_workbook(sheets, path)
        .with_context(|| format!("Failed to write workbook {}", path.display()))?;
    Ok(())
}

pub async fn run(config: Config, mode: ExportMode, output: Option<PathBuf>) -> Result<ExportOutcome> {
    info!("Connecting to Plex at {}", config.plex.base_url);
    let plex = PlexClient::connect(&config.plex).await?;
    let tvmaze = TvMazeClient::new(&config.tvmaze)?;

    let exporter = Exporter::new(Arc::new(plex), Arc::new(tvmaze), config);
    let outcome = exporter
        .run(mode, output, Local::now().date_naive())
        .await?;

    info!("Exported to {}", outcome.path.display());
    if mode.includes_movies() {
        info!("Movies: {}", outcome.movies);
    }
    if mode.includes_tv() {
        info!(
            "TV shows: {} ({} matched, {} without metadata, {} skipped), up to {} seasons",
            outcome.shows, outcome.matched, outcome.unmatched, outcome.skipped, outcome.max_season
        );
        if outcome.unmatched > 0 {
            warn!("{} shows have unknown episode totals", outcome.unmatched);
        }
    }
    Ok(outcome)
}
