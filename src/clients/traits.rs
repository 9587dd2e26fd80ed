//! Capabilities the sync pipeline needs from the two external services.
//!
//! `SheetsClient` and `SpotifyClient` implement these against the real APIs;
//! tests plug in in-memory fakes.

#![allow(async_fn_in_trait)]

use crate::clients::{entities::CatalogMatch, errors::Result};

/// Cell-range access to the suggestions spreadsheet.
pub trait Spreadsheet {
    /// Returns the rows of `range` as raw strings. Trailing empty cells may be
    /// absent, so rows can be shorter than the range is wide.
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>>;

    /// Overwrites a single-column `range` with `values`, one per row, in one request.
    async fn write_column(&self, range: &str, values: &[String]) -> Result<()>;
}

/// Search and playlist access on the music catalog.
pub trait Catalog {
    /// One page of playlist items starting at `offset`. Entries are `None`
    /// for items without a track id (local files, episodes). An empty page
    /// marks the end of the playlist.
    async fn playlist_page(&self, playlist_id: &str, offset: u32) -> Result<Vec<Option<String>>>;

    /// Top track for `query`, or `None` when the search found nothing.
    async fn search_track(&self, query: &str) -> Result<Option<CatalogMatch>>;

    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()>;
}
