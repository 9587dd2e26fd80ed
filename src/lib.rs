//! sheet2playlist - Sync song suggestions from a Google spreadsheet to a Spotify playlist
//!
//! Suggestions (artist, track, suggested by) are read from the sheet, looked up
//! in the Spotify catalog, the found links are written back next to them and
//! new tracks are appended to the playlist.

/// Client modules for interacting with external services
pub mod clients;
/// Progress output on stdout
pub mod progress;
/// The sync pipeline
pub mod syncer;
