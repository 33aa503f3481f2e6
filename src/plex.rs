use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::PlexConfig;
use crate::error::ConnectionError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibrarySection {
    pub key: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonCount {
    pub season_number: u32,
    pub episodes: u32,
}

#[async_trait]
pub trait MediaServerApi: Send + Sync {
    async fn sections(&self) -> Result<Vec<LibrarySection>, ConnectionError>;

    /// Raw metadata items of a section; fields are extracted by the caller.
    async fn section_items(&self, section: &LibrarySection) -> Result<Vec<Value>, ConnectionError>;

    async fn show_seasons(&self, rating_key: &str) -> Result<Vec<SeasonCount>, ConnectionError>;

    async fn section(&self, name: &str) -> Result<LibrarySection, ConnectionError> {
        let sections = self.sections().await?;
        find_section(sections, name)
    }
}

pub fn find_section(
    sections: Vec<LibrarySection>,
    name: &str,
) -> Result<LibrarySection, ConnectionError> {
    let wanted = name.trim();
    let available: Vec<String> = sections.iter().map(|s| s.title.clone()).collect();
    sections
        .into_iter()
        .find(|s| s.title.trim().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| ConnectionError::SectionNotFound {
            name: wanted.to_string(),
            available,
        })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MediaContainer")]
    media_container: MediaContainer,
}

#[derive(Debug, Default, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Directory", default)]
    directory: Vec<LibrarySection>,
    #[serde(rename = "Metadata", default)]
    metadata: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct PlexClient {
    client: Client,
    base_url: String,
}

impl PlexClient {
    pub fn new(config: &PlexConfig) -> Result<Self, ConnectionError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("x-plex-product"),
            HeaderValue::from_static("plexport"),
        );
        headers.insert(
            HeaderName::from_static("x-plex-client-identifier"),
            HeaderValue::from_static("plexport-cli"),
        );
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(token)
                .map_err(|_| ConnectionError::Client("PLEX_TOKEN is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static("x-plex-token"), value);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectionError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds the client and checks reachability and credentials up front.
    pub async fn connect(config: &PlexConfig) -> Result<Self, ConnectionError> {
        let plex = Self::new(config)?;
        let sections = plex.sections().await?;
        info!(
            "Connected to Plex at {} ({} library sections)",
            plex.base_url,
            sections.len()
        );
        Ok(plex)
    }

    async fn get_container(&self, path: &str) -> Result<MediaContainer, ConnectionError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ConnectionError::Unreachable {
                url: url.clone(),
                source,
            })?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectionError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ConnectionError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| ConnectionError::InvalidResponse(format!("reading body failed: {}", e)))?;
        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| ConnectionError::InvalidResponse(format!("{}: {}", path, e)))?;
        Ok(envelope.media_container)
    }

    async fn count_episodes(&self, season_key: &str) -> Result<u32, ConnectionError> {
        let container = self
            .get_container(&format!("/library/metadata/{}/children", season_key))
            .await?;
        Ok(container.metadata.len() as u32)
    }
}

#[async_trait]
impl MediaServerApi for PlexClient {
    async fn sections(&self) -> Result<Vec<LibrarySection>, ConnectionError> {
        Ok(self.get_container("/library/sections").await?.directory)
    }

    async fn section_items(&self, section: &LibrarySection) -> Result<Vec<Value>, ConnectionError> {
        let container = self
            .get_container(&format!("/library/sections/{}/all", section.key))
            .await?;
        debug!(
            "Plex section '{}' returned {} items",
            section.title,
            container.metadata.len()
        );
        Ok(container.metadata)
    }

    async fn show_seasons(&self, rating_key: &str) -> Result<Vec<SeasonCount>, ConnectionError> {
        let container = self
            .get_container(&format!("/library/metadata/{}/children", rating_key))
            .await?;

        let mut seasons = Vec::with_capacity(container.metadata.len());
        for item in &container.metadata {
            let Some(season_number) = item.get("index").and_then(Value::as_u64) else {
                debug!("Skipping season entry without index under {}", rating_key);
                continue;
            };
            let episodes = match item.get("leafCount").and_then(Value::as_u64) {
                Some(n) => n as u32,
                None => match item.get("ratingKey").and_then(Value::as_str) {
                    Some(season_key) => self.count_episodes(season_key).await?,
                    None => 0,
                },
            };
            seasons.push(SeasonCount {
                season_number: season_number as u32,
                episodes,
            });
        }
        Ok(seasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(key: &str, title: &str, kind: &str) -> LibrarySection {
        LibrarySection {
            key: key.to_string(),
            title: title.to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn finds_section_case_insensitively() {
        let sections = vec![section("1", "Movies", "movie"), section("2", "TV Shows", "show")];
        let found = find_section(sections, "tv shows").unwrap();
        assert_eq!(found.key, "2");
    }

    #[test]
    fn missing_section_lists_available() {
        let sections = vec![section("1", "Movies", "movie")];
        let err = find_section(sections, "Anime").unwrap_err();
        match err {
            ConnectionError::SectionNotFound { name, available } => {
                assert_eq!(name, "Anime");
                assert_eq!(available, vec!["Movies".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn parses_media_container() {
        let body = r#"{"MediaContainer":{"size":1,"Directory":[{"key":"3","title":"Movies","type":"movie","agent":"tv.plex.agents.movie"}]}}"#;
        let envelope: Envelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.media_container.directory, vec![section("3", "Movies", "movie")]);
        assert!(envelope.media_container.metadata.is_empty());
    }
}
