use std::fmt;

use crate::error::MetadataError;

/// Sentinel rendered for any field the media server did not provide.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    FourK,
    P1080,
    P720,
    P480,
    Sd,
    Unknown,
}

impl Resolution {
    /// Maps a Plex `videoResolution` value (`4k`, `1080`, `720`, `480`, `sd`, ...).
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim().to_ascii_lowercase();
        let value = value.strip_suffix('p').unwrap_or(&value);
        match value {
            "4k" | "uhd" | "2160" => Resolution::FourK,
            "1080" => Resolution::P1080,
            "720" => Resolution::P720,
            "480" => Resolution::P480,
            "sd" | "576" => Resolution::Sd,
            _ => Resolution::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resolution::FourK => "4K",
            Resolution::P1080 => "1080p",
            Resolution::P720 => "720p",
            Resolution::P480 => "480p",
            Resolution::Sd => "SD",
            Resolution::Unknown => UNKNOWN,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieRecord {
    pub title: String,
    pub resolution: Resolution,
    pub year: Option<i32>,
    pub studio: Option<String>,
    pub content_rating: Option<String>,
    pub file_path: Option<String>,
    pub container: Option<String>,
}

pub fn or_unknown<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => UNKNOWN.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonState {
    Complete,
    Incomplete,
    NonExistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonStatus {
    pub season_number: u32,
    pub episodes_present: u32,
    pub episodes_total: Option<u32>,
    pub state: SeasonState,
}

impl SeasonStatus {
    pub fn new(season_number: u32, episodes_present: u32, episodes_total: Option<u32>) -> Self {
        let state = match episodes_total {
            Some(total) if total > 0 && total == episodes_present => SeasonState::Complete,
            _ => SeasonState::Incomplete,
        };
        Self {
            season_number,
            episodes_present,
            episodes_total,
            state,
        }
    }

    pub fn non_existent(season_number: u32) -> Self {
        Self {
            season_number,
            episodes_present: 0,
            episodes_total: None,
            state: SeasonState::NonExistent,
        }
    }

    pub fn exists(&self) -> bool {
        self.state != SeasonState::NonExistent
    }

    /// `present/total`, `present/?` when the total is unknown, empty for padding.
    pub fn ratio_label(&self) -> String {
        match (self.state, self.episodes_total) {
            (SeasonState::NonExistent, _) => String::new(),
            (_, Some(total)) => format!("{}/{}", self.episodes_present, total),
            (_, None) => format!("{}/?", self.episodes_present),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOutcome {
    Matched { id: u64, name: String },
    Unavailable(MetadataError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowRecord {
    pub title: String,
    pub year: Option<i32>,
    pub seasons: Vec<SeasonStatus>,
    pub lookup: MetadataOutcome,
}

impl ShowRecord {
    pub fn real_seasons(&self) -> impl Iterator<Item = &SeasonStatus> {
        self.seasons.iter().filter(|s| s.exists())
    }

    pub fn real_season_count(&self) -> usize {
        self.real_seasons().count()
    }

    pub fn complete_seasons(&self) -> usize {
        self.real_seasons()
            .filter(|s| s.state == SeasonState::Complete)
            .count()
    }

    pub fn is_matched(&self) -> bool {
        matches!(self.lookup, MetadataOutcome::Matched { .. })
    }

    pub fn episodes_present(&self) -> u32 {
        self.real_seasons().map(|s| s.episodes_present).sum()
    }

    /// `None` as soon as any real season has an unknown total.
    pub fn episodes_total(&self) -> Option<u32> {
        self.real_seasons().map(|s| s.episodes_total).sum()
    }

    pub fn completion_ratio(&self) -> Option<f64> {
        match self.episodes_total() {
            Some(total) if total > 0 => Some(f64::from(self.episodes_present()) / f64::from(total)),
            _ => None,
        }
    }
}
