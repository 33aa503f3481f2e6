//! Spreadsheet rendering.
//!
//! Rows are first turned into a plain [`SheetModel`] (text, fill, alignment
//! per cell) so layout rules can be checked without opening a workbook. The
//! model is then written with `rust_xlsxwriter`.
use chrono::NaiveDate;
use rust_xlsxwriter::{
    Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook, Worksheet, XlsxError,
};
use std::path::Path;

use crate::app::ExportMode;
use crate::models::{or_unknown, MovieRecord, Resolution, SeasonState, SeasonStatus, ShowRecord};

pub const MOVIES_SHEET: &str = "Movies";
pub const TV_SHEET: &str = "TV Shows";

const MOVIE_HEADERS: [&str; 7] = [
    "Title",
    "Video Resolution",
    "Year",
    "Studio",
    "ContentRating",
    "File",
    "Container",
];
const MAX_COLUMN_WIDTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    FourK,
    LowResolution,
    UnknownResolution,
    Complete,
    Incomplete,
    NonExistent,
}

impl Fill {
    pub fn rgb(&self) -> u32 {
        match self {
            Fill::FourK => 0xE3F4EA,
            Fill::LowResolution => 0xFFFFCC,
            Fill::UnknownResolution => 0xF2F2F2,
            Fill::Complete => 0x90EE90,
            Fill::Incomplete => 0xFFB6B6,
            Fill::NonExistent => 0xD3D3D3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSpec {
    pub text: String,
    pub fill: Option<Fill>,
    pub align: Align,
}

impl CellSpec {
    fn new(text: impl Into<String>, fill: Option<Fill>, align: Align) -> Self {
        Self {
            text: text.into(),
            fill,
            align,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetModel {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellSpec>>,
}

impl SheetModel {
    /// Longest text per column (header included) plus two characters.
    pub fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let len = cell.text.chars().count();
                match widths.get_mut(i) {
                    Some(w) => *w = (*w).max(len),
                    None => widths.push(len),
                }
            }
        }
        widths
            .into_iter()
            .map(|w| (w + 2).min(MAX_COLUMN_WIDTH))
            .collect()
    }
}

pub fn resolution_fill(resolution: Resolution) -> Option<Fill> {
    match resolution {
        Resolution::FourK => Some(Fill::FourK),
        Resolution::Sd | Resolution::P480 | Resolution::P720 => Some(Fill::LowResolution),
        Resolution::P1080 => None,
        Resolution::Unknown => Some(Fill::UnknownResolution),
    }
}

pub fn season_fill(state: SeasonState) -> Fill {
    match state {
        SeasonState::Complete => Fill::Complete,
        SeasonState::Incomplete => Fill::Incomplete,
        SeasonState::NonExistent => Fill::NonExistent,
    }
}

/// Green when every real season is complete, red when only some are.
pub fn series_fill(show: &ShowRecord) -> Option<Fill> {
    let real = show.real_season_count();
    let complete = show.complete_seasons();
    if real > 0 && complete == real {
        Some(Fill::Complete)
    } else if complete > 0 {
        Some(Fill::Incomplete)
    } else {
        None
    }
}

pub fn episodes_label(show: &ShowRecord) -> String {
    let present = show.episodes_present();
    match (show.episodes_total(), show.completion_ratio()) {
        // Floored so only a complete show reads 100%.
        (Some(total), Some(ratio)) => {
            format!("{}/{} ({}%)", present, total, (ratio * 100.0).floor() as u32)
        }
        (Some(total), None) => format!("{}/{}", present, total),
        (None, _) => format!("{}/?", present),
    }
}

pub fn movies_sheet(movies: &[MovieRecord]) -> SheetModel {
    let rows = movies
        .iter()
        .map(|movie| {
            let fill = resolution_fill(movie.resolution);
            vec![
                CellSpec::new(movie.title.clone(), fill, Align::Left),
                CellSpec::new(movie.resolution.label(), fill, Align::Center),
                CellSpec::new(or_unknown(&movie.year), fill, Align::Center),
                CellSpec::new(or_unknown(&movie.studio), fill, Align::Center),
                CellSpec::new(or_unknown(&movie.content_rating), fill, Align::Center),
                CellSpec::new(or_unknown(&movie.file_path), fill, Align::Left),
                CellSpec::new(or_unknown(&movie.container), fill, Align::Center),
            ]
        })
        .collect();

    SheetModel {
        name: MOVIES_SHEET.to_string(),
        headers: MOVIE_HEADERS.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

pub fn tv_sheet(shows: &[ShowRecord], max_season: u32) -> SheetModel {
    let mut headers = vec![
        "Show Title".to_string(),
        "Complete Series".to_string(),
        "Episodes".to_string(),
    ];
    headers.extend((1..=max_season).map(|n| format!("Season {}", n)));

    let rows = shows
        .iter()
        .map(|show| {
            let mut row = vec![
                CellSpec::new(show.title.clone(), None, Align::Left),
                CellSpec::new(
                    format!("{}/{}", show.complete_seasons(), show.real_season_count()),
                    series_fill(show),
                    Align::Center,
                ),
                CellSpec::new(episodes_label(show), None, Align::Center),
            ];
            row.extend(show.seasons.iter().map(season_cell));
            row
        })
        .collect();

    SheetModel {
        name: TV_SHEET.to_string(),
        headers,
        rows,
    }
}

fn season_cell(season: &SeasonStatus) -> CellSpec {
    CellSpec::new(
        season.ratio_label(),
        Some(season_fill(season.state)),
        Align::Center,
    )
}

pub fn output_filename(mode: ExportMode, date: NaiveDate) -> String {
    let stamp = date.format("%Y%m%d");
    match mode {
        ExportMode::Movies => "plex_movies.xlsx".to_string(),
        ExportMode::Tv => format!("plex_tv_shows_{}.xlsx", stamp),
        ExportMode::All => format!("PlexMediaExport_{}.xlsx", stamp),
    }
}

pub fn render_workbook(sheets: &[SheetModel]) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        write_sheet(worksheet, sheet)?;
    }
    Ok(workbook)
}

pub fn save_workbook(sheets: &[SheetModel], path: &Path) -> Result<(), XlsxError> {
    let mut workbook = render_workbook(sheets)?;
    workbook.save(path)
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &SheetModel) -> Result<(), XlsxError> {
    worksheet.set_name(&sheet.name)?;

    let header = Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
        .set_border_bottom(FormatBorder::Thick);
    for (col, title) in sheet.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, column(col)?, title, &header)?;
    }

    for (i, row) in sheet.rows.iter().enumerate() {
        let row_num = u32::try_from(i + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, cell) in row.iter().enumerate() {
            worksheet.write_string_with_format(row_num, column(col)?, &cell.text, &cell_format(cell))?;
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    for (col, width) in sheet.column_widths().into_iter().enumerate() {
        worksheet.set_column_width(column(col)?, width as f64)?;
    }
    Ok(())
}

fn cell_format(cell: &CellSpec) -> Format {
    let align = match cell.align {
        Align::Left => FormatAlign::Left,
        Align::Center => FormatAlign::Center,
    };
    let format = Format::new()
        .set_border(FormatBorder::Thin)
        .set_align(align);
    match cell.fill {
        Some(fill) => format
            .set_background_color(Color::RGB(fill.rgb()))
            .set_pattern(FormatPattern::Solid),
        None => format,
    }
}

fn column(index: usize) -> Result<u16, XlsxError> {
    u16::try_from(index).map_err(|_| XlsxError::RowColumnLimitError)
}
