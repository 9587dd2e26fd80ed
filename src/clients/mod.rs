/// Data entities for suggestions, matches and playlist membership
pub mod entities;
/// Error types and result aliases
pub mod errors;
/// Google OAuth installed-app flow
pub mod google_auth;
/// Google Sheets API client
pub mod sheets;
/// Spotify API client
pub mod spotify;
/// Service capabilities used by the syncer
pub mod traits;

pub use sheets::SheetsClient;
pub use spotify::SpotifyClient;
