//! Export a Plex catalog (movies and TV shows) to a styled spreadsheet, auditing
//! TV season completeness against TVMaze.

pub mod app;
pub mod audit;
pub mod config;
pub mod error;
pub mod matching;
pub mod models;
pub mod movies;
pub mod plex;
pub mod report;
pub mod tvmaze;
