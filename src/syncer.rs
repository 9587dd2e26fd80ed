use std::collections::HashSet;

use log::{debug, info, warn};

use crate::clients::{
    entities::{PlaylistMembership, SuggestionRow, parse_rows},
    errors::{Error, Result},
    traits::{Catalog, Spreadsheet},
};
use crate::progress;

/// Where suggestions are read from and links are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    sheet: Option<String>,
    range_offset: u32,
    max_row: u32,
    write_column: String,
}

impl SheetLayout {
    pub fn new(
        sheet: Option<String>,
        range_offset: u32,
        max_row: u32,
        write_column: &str,
    ) -> Result<Self> {
        if range_offset == 0 {
            return Err(Error::ConfigurationError(
                "range offset must be at least 1".into(),
            ));
        }
        if max_row < range_offset {
            return Err(Error::ConfigurationError(format!(
                "max row {max_row} is before range offset {range_offset}"
            )));
        }
        let write_column = write_column.trim().to_ascii_uppercase();
        if write_column.is_empty() || !write_column.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(Error::ConfigurationError(format!(
                "write column must be a column letter, got {write_column:?}"
            )));
        }
        let sheet = sheet.filter(|s| !s.trim().is_empty());
        Ok(SheetLayout {
            sheet,
            range_offset,
            max_row,
            write_column,
        })
    }

    fn qualify(&self, cells: String) -> String {
        match &self.sheet {
            Some(sheet) => format!("'{}'!{cells}", sheet.replace('\'', "''")),
            None => cells,
        }
    }

    /// `A<offset>:C<max>`
    pub fn read_range(&self) -> String {
        self.qualify(format!("A{}:C{}", self.range_offset, self.max_row))
    }

    /// Output column range covering `rows` rows from the offset, `None` for zero rows.
    pub fn write_range(&self, rows: usize) -> Option<String> {
        let rows = u32::try_from(rows).ok().filter(|&r| r > 0)?;
        let last = self.range_offset + rows - 1;
        Some(self.qualify(format!(
            "{col}{first}:{col}{last}",
            col = self.write_column,
            first = self.range_offset
        )))
    }
}

impl Default for SheetLayout {
    fn default() -> Self {
        SheetLayout {
            sheet: None,
            range_offset: 3,
            max_row: 500,
            write_column: "K".to_string(),
        }
    }
}

/// Outcome of the link write-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteBack {
    Written { range: String },
    Failed { range: String, reason: String },
    Skipped,
}

/// What one run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub suggestions: Vec<SuggestionRow>,
    pub links: Vec<String>,
    pub write_back: WriteBack,
    pub added: Vec<String>,
}

impl SyncReport {
    fn empty() -> Self {
        SyncReport {
            suggestions: Vec::new(),
            links: Vec::new(),
            write_back: WriteBack::Skipped,
            added: Vec::new(),
        }
    }
}

// The main Syncer struct that performs the synchronization
pub struct Syncer<S, C> {
    sheet: S,
    catalog: C,
    layout: SheetLayout,
    playlist_id: String,
}

impl<S: Spreadsheet, C: Catalog> Syncer<S, C> {
    pub fn new(sheet: S, catalog: C, layout: SheetLayout, playlist_id: impl Into<String>) -> Self {
        Syncer {
            sheet,
            catalog,
            layout,
            playlist_id: playlist_id.into(),
        }
    }

    /// Pages through the playlist until an empty page comes back.
    pub async fn load_membership(&self) -> Result<PlaylistMembership> {
        let mut membership = PlaylistMembership::new();
        let mut offset: u32 = 0;
        loop {
            let page = self
                .catalog
                .playlist_page(&self.playlist_id, offset)
                .await?;
            if page.is_empty() {
                break;
            }
            offset += u32::try_from(page.len())
                .map_err(|_| Error::ParseError("playlist page too large".into()))?;
            for track_id in page.into_iter().flatten() {
                membership.insert(track_id);
            }
        }
        debug!("Playlist holds {} distinct tracks", membership.len());
        Ok(membership)
    }

    pub async fn sync(&self) -> Result<SyncReport> {
        info!("Starting sync process ...");
        let range = self.layout.read_range();
        debug!("Reading suggestions from {range}");
        let rows = self.sheet.read_range(&range).await?;
        let suggestions = parse_rows(&rows);
        debug!(
            "Read {} rows, {} complete suggestions",
            rows.len(),
            suggestions.len()
        );

        if suggestions.is_empty() {
            progress::notice("No data found.");
            return Ok(SyncReport::empty());
        }

        let membership = self.load_membership().await?;
        info!("{} tracks are already in the playlist", membership.len());

        let mut links = Vec::with_capacity(suggestions.len());
        let mut new_tracks: Vec<String> = Vec::new();
        for row in &suggestions {
            let found = match self.catalog.search_track(&row.search_query()).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("Search failed for {} - {}: {e}", row.artist, row.track);
                    None
                }
            };
            progress::row_result(row, found.as_ref());

            let Some(found) = found else {
                links.push(String::new());
                continue;
            };
            if let Some(track_id) = found.track_id
                && !membership.contains(&track_id)
            {
                new_tracks.push(track_id);
            }
            links.push(found.external_url.unwrap_or_default());
        }

        let write_back = self.write_links(&links).await;
        warn_on_repeats(&new_tracks);

        println!();
        if new_tracks.is_empty() {
            progress::notice("No tracks to add.");
        } else {
            progress::begin(&format!(
                "Adding {} track(s) to playlist...",
                new_tracks.len()
            ));
            self.catalog
                .add_tracks(&self.playlist_id, &new_tracks)
                .await?;
            progress::done();
        }

        info!(
            "Sync process completed. Added tracks: {}",
            new_tracks.len()
        );
        Ok(SyncReport {
            suggestions,
            links,
            write_back,
            added: new_tracks,
        })
    }

    // Failures are reported, never propagated
    async fn write_links(&self, links: &[String]) -> WriteBack {
        let Some(range) = self.layout.write_range(links.len()) else {
            return WriteBack::Skipped;
        };
        progress::begin("\nWriting Spotify links back to sheet...");
        match self.sheet.write_column(&range, links).await {
            Ok(()) => {
                progress::done();
                WriteBack::Written { range }
            }
            Err(e) => {
                progress::failed();
                warn!("Writing links to {range} failed: {e}");
                WriteBack::Failed {
                    range,
                    reason: e.to_string(),
                }
            }
        }
    }
}

// Repeated ids stay in the batch; they are only reported
fn warn_on_repeats(track_ids: &[String]) {
    let mut seen = HashSet::new();
    for id in track_ids {
        if !seen.insert(id.as_str()) {
            warn!("Track {id} is suggested more than once in this run and will be added again");
        }
    }
}
