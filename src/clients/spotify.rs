use std::path::PathBuf;

use log::debug;

use crate::clients::{
    entities::CatalogMatch,
    errors::{Error, Result},
    traits::Catalog,
};
use rspotify::{
    AuthCodeSpotify, Config, Credentials, OAuth,
    model::{
        Country, FullTrack, Market, PlayableId, PlayableItem, PlaylistId, SearchResult,
        SearchType, TrackId,
    },
    prelude::*,
    scopes,
};

// Spotify rejects more items than this in one "add items" request
const ADD_ITEMS_BATCH: usize = 100;
const PLAYLIST_PAGE_SIZE: u32 = 100;

impl From<FullTrack> for CatalogMatch {
    fn from(f: FullTrack) -> CatalogMatch {
        CatalogMatch {
            track_id: f.id.map(|id| id.id().to_owned()),
            display_name: f.name,
            artist_names: f.artists.into_iter().map(|a| a.name).collect(),
            external_url: f.external_urls.get("spotify").cloned(),
        }
    }
}

/// Parses an ISO 3166-1 alpha-2 code such as `NL` into a search market.
pub fn parse_market(code: &str) -> Result<Country> {
    serde_json::from_value(serde_json::Value::String(code.trim().to_ascii_uppercase()))
        .map_err(|_| Error::ConfigurationError(format!("Unknown Spotify market: {code}")))
}

/// Accepts a bare playlist id, a `spotify:playlist:` URI or an `open.spotify.com` link.
pub fn playlist_id(reference: &str) -> Result<PlaylistId<'_>> {
    let reference = reference.trim();
    let id = match reference.split_once("open.spotify.com/playlist/") {
        Some((_, rest)) => rest.split(['?', '/', '#']).next().unwrap_or_default(),
        None => reference,
    };
    Ok(PlaylistId::from_id_or_uri(id)?)
}

pub struct SpotifyClient {
    pub spotify: AuthCodeSpotify,
    market: Country,
}

impl SpotifyClient {
    pub fn new(spotify: AuthCodeSpotify, market: Country) -> Self {
        SpotifyClient { spotify, market }
    }

    // Authorize the Spotify client via CLI prompt and OAuth flow
    // A cached token is reused or refreshed, the prompt only shows when there is none
    pub async fn authorize_client(&self) -> Result<()> {
        debug!("Starting Spotify authorization ...");
        let url = self.spotify.get_authorize_url(false)?;
        // This function requires the `cli` feature enabled.
        self.spotify.prompt_for_token(&url).await?;
        let user = self.spotify.me().await?;
        debug!("Authenticated as user: {:?}", user.display_name);
        Ok(())
    }

    // Create a SpotifyClient from environment variables or raise a configuration error
    pub fn try_default(cache_path: PathBuf, market: Country) -> Result<Self> {
        let creds = Credentials::from_env()
        .ok_or_else(|| Error::ConfigurationError("Missing Spotify credentials in environment variables (RSPOTIFY_CLIENT_ID, RSPOTIFY_CLIENT_SECRET).".into()))?;
        let oauth = OAuth::from_env(scopes!(
            "user-library-read",
            "playlist-modify-private",
            "playlist-read-private",
            "playlist-modify-public",
            "playlist-read-collaborative"
        ))
        .ok_or_else(|| Error::ConfigurationError("Missing Spotify OAuth configuration in environment variables (RSPOTIFY_REDIRECT_URI).".into()))?;

        let spotify = AuthCodeSpotify::with_config(
            creds,
            oauth,
            Config {
                token_cached: true,
                token_refreshing: true,
                cache_path,
                ..Default::default()
            },
        );

        Ok(Self::new(spotify, market))
    }
}

impl Catalog for SpotifyClient {
    async fn playlist_page(&self, playlist_id: &str, offset: u32) -> Result<Vec<Option<String>>> {
        let playlist = self::playlist_id(playlist_id)?;
        let page = self
            .spotify
            .playlist_items_manual(playlist, None, None, Some(PLAYLIST_PAGE_SIZE), Some(offset))
            .await?;
        debug!(
            "Fetched {} playlist items at offset {offset} of {}",
            page.items.len(),
            page.total
        );
        Ok(page
            .items
            .into_iter()
            .map(|item| match item.track {
                Some(PlayableItem::Track(track)) => track.id.map(|id| id.id().to_owned()),
                _ => None,
            })
            .collect())
    }

    async fn search_track(&self, query: &str) -> Result<Option<CatalogMatch>> {
        let result = self
            .spotify
            .search(
                query,
                SearchType::Track,
                Some(Market::Country(self.market)),
                None,
                Some(1),
                None,
            )
            .await?;
        match result {
            SearchResult::Tracks(page) => Ok(page.items.into_iter().next().map(CatalogMatch::from)),
            _ => Err(Error::ParseError(format!(
                "search for {query:?} did not return tracks"
            ))),
        }
    }

    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let playlist = self::playlist_id(playlist_id)?;
        for batch in track_ids.chunks(ADD_ITEMS_BATCH) {
            let items = batch
                .iter()
                .map(|id| TrackId::from_id(id.as_str()).map(PlayableId::Track))
                .collect::<Result<Vec<_>, _>>()?;
            self.spotify
                .playlist_add_items(playlist.clone(), items, None)
                .await?;
            debug!("Added {} tracks to playlist {playlist_id}", batch.len());
        }
        Ok(())
    }
}
