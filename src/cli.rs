use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::info;
use sheet2playlist::clients::{
    SheetsClient, SpotifyClient,
    errors::Result,
    google_auth::{InstalledAppFlow, obtain_token},
    spotify::parse_market,
};
use sheet2playlist::syncer::{SheetLayout, Syncer};

const DEFAULT_MARKET: &str = "NL";

#[derive(Parser)]
#[command(name = "sheet2playlist")]
#[command(version, about = "Sync song suggestions from a Google spreadsheet to a Spotify playlist", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve suggestions, write links back and add new tracks to the playlist
    Sync {
        #[command(flatten)]
        auth: AuthArgs,
        #[command(flatten)]
        sheet: SheetArgs,
        /// Target playlist: id, spotify URI or open.spotify.com link
        #[arg(long, env = "PLAYLIST_ID")]
        playlist_id: String,
        /// Search market, ISO 3166-1 alpha-2 code
        #[arg(long, env = "SPOTIFY_MARKET", default_value = DEFAULT_MARKET)]
        market: String,
    },
    /// Authorize both services and store their tokens
    Auth {
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Args)]
struct SheetArgs {
    #[arg(long, env = "SPREADSHEET_ID")]
    spreadsheet_id: String,
    /// Sheet (tab) name, the first sheet when omitted
    #[arg(long, env = "SHEET_NAME")]
    sheet: Option<String>,
    /// First row holding a suggestion
    #[arg(long, env = "RANGE_OFFSET", default_value_t = 3)]
    range_offset: u32,
    /// Last row read
    #[arg(long, env = "MAX_ROW", default_value_t = 500)]
    max_row: u32,
    /// Column receiving the Spotify links
    #[arg(long, env = "WRITE_COLUMN", default_value = "K")]
    write_column: String,
}

#[derive(Args)]
struct AuthArgs {
    /// OAuth client secrets downloaded from the Google Cloud console
    #[arg(long, env = "GOOGLE_CREDENTIALS_PATH", default_value = "google_credentials.json")]
    google_credentials: PathBuf,
    #[arg(long, env = "GOOGLE_TOKEN_PATH")]
    google_token: Option<PathBuf>,
    #[arg(long, env = "SPOTIFY_TOKEN_PATH")]
    spotify_token: Option<PathBuf>,
}

impl AuthArgs {
    fn google_flow(&self) -> InstalledAppFlow {
        let token_path = self
            .google_token
            .clone()
            .unwrap_or_else(|| default_cache_file("google_token.json"));
        InstalledAppFlow::new(self.google_credentials.clone(), token_path)
    }

    fn spotify_token_path(&self) -> PathBuf {
        self.spotify_token
            .clone()
            .unwrap_or_else(|| default_cache_file("spotify_token.json"))
    }
}

fn default_cache_file(name: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp")) // Fallback to /tmp if cache directory can't be determined
        .join("sheet2playlist")
        .join(name)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            auth,
            sheet,
            playlist_id,
            market,
        } => sync_tracks(&auth, sheet, playlist_id, &market).await,
        Commands::Auth { auth } => authorize(&auth).await,
    }
}

async fn authorized_clients(
    auth: &AuthArgs,
    spreadsheet_id: String,
    market: &str,
) -> Result<(SheetsClient, SpotifyClient)> {
    let mut sheets = SheetsClient::new(spreadsheet_id)?;
    let spotify = SpotifyClient::try_default(auth.spotify_token_path(), parse_market(market)?)?;
    info!("Authorizing clients ...");
    // CLI prompts or a browser window may be shown on those two calls
    sheets.authorize_client(&auth.google_flow()).await?;
    spotify.authorize_client().await?;
    Ok((sheets, spotify))
}

async fn sync_tracks(
    auth: &AuthArgs,
    sheet: SheetArgs,
    playlist_id: String,
    market: &str,
) -> Result<()> {
    info!("Building config ...");
    let layout = SheetLayout::new(
        sheet.sheet,
        sheet.range_offset,
        sheet.max_row,
        &sheet.write_column,
    )?;
    let (sheets, spotify) = authorized_clients(auth, sheet.spreadsheet_id, market).await?;
    let syncer = Syncer::new(sheets, spotify, layout, playlist_id);
    syncer.sync().await?;
    Ok(())
}

async fn authorize(auth: &AuthArgs) -> Result<()> {
    let spotify =
        SpotifyClient::try_default(auth.spotify_token_path(), parse_market(DEFAULT_MARKET)?)?;
    obtain_token(&auth.google_flow()).await?;
    spotify.authorize_client().await?;
    info!("Both services are authorized");
    Ok(())
}
