//! Resolve a show title against TVMaze and print per-season episode totals.
//! Usage:
//!   cargo run --bin tvmaze_lookup -- "<show title>" [year]
//! Honors TVMAZE_URL (.env supported); retries use the default backoff.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use plexport::config::{RetryPolicy, TvMazeConfig, DEFAULT_TVMAZE_URL};
use plexport::matching::normalize_title;
use plexport::tvmaze::{resolve_totals, MetadataApi, TvMazeClient};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let mut args = env::args().skip(1);
    let title = args
        .next()
        .context("usage: tvmaze_lookup \"<show title>\" [year]")?;
    let year = args
        .next()
        .map(|y| y.parse::<i32>())
        .transpose()
        .context("year must be a number")?;

    let config = TvMazeConfig {
        base_url: env::var("TVMAZE_URL").unwrap_or_else(|_| DEFAULT_TVMAZE_URL.to_string()),
        timeout: std::time::Duration::from_secs(30),
        retry: RetryPolicy::default(),
    };
    let client = TvMazeClient::new(&config)?;

    let query = normalize_title(&title).with_year_hint(year);
    println!("Lookup key: {}", query.lookup_key());

    let candidates = client.search_shows(&query.search_text).await?;
    println!("Candidates:");
    for c in &candidates {
        let year = c
            .premiered_year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "????".to_string());
        println!("  #{:<8} {} ({})", c.id, c.name, year);
    }

    match resolve_totals(&client, &title, year).await {
        Ok(show) => {
            println!("\nMatched: {} (#{})", show.name, show.id);
            for (season, episodes) in &show.totals {
                println!("  Season {:>2}: {} episodes", season, episodes);
            }
        }
        Err(e) => println!("\nNo match: {}", e),
    }
    Ok(())
}
