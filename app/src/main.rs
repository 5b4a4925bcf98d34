//! Command line entry point for PhotoScroll.

use api_client::ApiClient;
use auth::{
    authenticate, AuthError, FileStore, KeyringStore, OAuthClient, OAuthConfig, TokenRefresher,
    TokenStore, KEYRING_SERVICE_NAME,
};
use clap::{ArgGroup, Parser, Subcommand};
use fetcher::{CollectionSelector, FetchError, FetchProgress, MediaFetcher};
use player::{
    Gesture, JsonSessionStore, NavigatorEvent, Session, ViewStatus, Viewer, ViewerError,
    ViewerInput,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser)]
#[command(
    name = "photoscroll",
    author,
    version,
    about = "Full-screen vertical feed for the videos in your Google Photos library"
)]
struct Cli {
    /// Override log level (e.g. info, debug)
    #[arg(long)]
    log_level: Option<String>,
    /// Override OAuth redirect port
    #[arg(long)]
    oauth_redirect_port: Option<u16>,
    /// Override the number of videos fetched for the whole library
    #[arg(long)]
    library_video_limit: Option<usize>,
    /// Override the thumbnail width in pixels
    #[arg(long)]
    thumbnail_width: Option<u32>,
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Store auth tokens in ~/.photoscroll/tokens.json instead of the system keyring
    #[arg(long)]
    use_file_store: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with Google in the browser
    Login,
    /// Forget stored tokens and the current selection
    Logout,
    /// Show sign-in state and the selected collection
    Status,
    /// List owned and shared albums
    Albums {
        /// Include albums that report zero items
        #[arg(long)]
        all: bool,
    },
    /// Choose the collection to watch
    #[command(group(ArgGroup::new("target").required(true).args(["album_id", "all_videos"])))]
    Select {
        /// ID of the album
        album_id: Option<String>,
        /// Watch the most recent videos of the whole library
        #[arg(long)]
        all_videos: bool,
    },
    /// List the videos of the selected collection
    Videos {
        /// Maximum number of videos to fetch
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Step through the selected collection interactively
    Play {
        /// Maximum number of videos to fetch
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Refresher used by the CLI. Without client credentials every refresh
/// fails, which only matters once the stored access token has expired.
struct CliRefresher {
    client: Option<OAuthClient>,
}

impl TokenRefresher for CliRefresher {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AuthError> {
        match &self.client {
            Some(client) => client.refresh(refresh_token).await,
            None => Err(AuthError::MissingClientCredentials(
                "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET",
            )),
        }
    }
}

fn oauth_config(cfg: &config::AppConfig) -> Result<OAuthConfig, AuthError> {
    let mut oauth = OAuthConfig::from_env(cfg.oauth_redirect_port)?;
    if let Some(url) = &cfg.token_url {
        oauth.token_url = url.clone();
    }
    Ok(oauth)
}

fn token_store(cfg: &config::AppConfig) -> Result<Arc<dyn TokenStore>, AuthError> {
    if cfg.use_file_store {
        Ok(Arc::new(FileStore::new(cfg.data_path.join("tokens.json"))))
    } else {
        Ok(Arc::new(KeyringStore::new(KEYRING_SERVICE_NAME)?))
    }
}

fn print_credentials_help() {
    eprintln!("GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET environment variables must be set.");
    eprintln!("Create OAuth 2.0 credentials at https://console.developers.google.com/ and set them using:");
    eprintln!("   export GOOGLE_CLIENT_ID=your_client_id");
    eprintln!("   export GOOGLE_CLIENT_SECRET=your_client_secret");
}

fn print_failure(err: &ViewerError) {
    eprintln!("{}", err);
    if matches!(err, ViewerError::Fetch(FetchError::Refresh(_))) {
        eprintln!("Your sign-in could not be renewed. Run `photoscroll login` again.");
    }
}

enum PlayCommand {
    Input(ViewerInput),
    Quit,
}

fn parse_play_command(line: &str) -> Option<PlayCommand> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    let arg = parts.next();
    let input = match (command, arg) {
        ("q" | "quit", None) => return Some(PlayCommand::Quit),
        ("n" | "next", None) => ViewerInput::Next,
        ("p" | "prev", None) => ViewerInput::Previous,
        ("end", None) => ViewerInput::Ended,
        ("swipe", Some(dy)) => ViewerInput::Gesture(Gesture::Swipe {
            dy: dy.parse().ok()?,
        }),
        ("wheel", Some(dy)) => ViewerInput::Gesture(Gesture::Wheel {
            delta_y: dy.parse().ok()?,
        }),
        ("goto", Some(n)) => ViewerInput::Tap(n.parse::<usize>().ok()?.checked_sub(1)?),
        _ => return None,
    };
    Some(PlayCommand::Input(input))
}

fn print_current(viewer: &CliViewer) {
    let navigator = viewer.navigator();
    if let (Some(position), Some(item)) = (navigator.position(), navigator.current()) {
        println!("[{}/{}] {}", position + 1, navigator.len(), item.title());
        println!("    {}", item.playback_url());
    }
}

#[cfg_attr(feature = "trace-spans", tracing::instrument)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = config::AppConfigOverrides {
        log_level: cli.log_level.clone(),
        oauth_redirect_port: cli.oauth_redirect_port,
        library_video_limit: cli.library_video_limit,
        thumbnail_width: cli.thumbnail_width,
        use_file_store: cli.use_file_store,
    };
    let cfg = config::AppConfig::load_from(cli.config.clone()).apply_overrides(&overrides);
    let base_dir = cfg.data_path.clone();
    std::fs::create_dir_all(&base_dir)?;
    let file_appender = rolling::daily(&base_dir, "photoscroll.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cfg.log_level.clone()))
        .with_writer(std::io::stderr.and(file_writer))
        .init();

    let tokens = token_store(&cfg)?;
    let mut session = Session::open(tokens.clone(), JsonSessionStore::in_dir(&base_dir))?;

    match cli.command {
        Commands::Login => {
            let oauth = match oauth_config(&cfg) {
                Ok(oauth) => oauth,
                Err(AuthError::MissingClientCredentials(_)) => {
                    print_credentials_help();
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            let client = OAuthClient::new(&oauth)?;
            let credentials = authenticate(&client, cfg.oauth_redirect_port, tokens.as_ref()).await?;
            session.set_credentials(credentials)?;
            println!("Signed in");
        }
        Commands::Logout => {
            session.logout()?;
            println!("Signed out");
        }
        Commands::Status => {
            if session.is_signed_in() {
                println!("Signed in");
            } else {
                println!("Not signed in");
            }
            match session.selector() {
                Some(CollectionSelector::Library) => println!("Selected: all videos"),
                Some(CollectionSelector::Album(id)) => println!("Selected: album {}", id),
                None => println!("No collection selected"),
            }
            if session.selector().is_some() {
                println!("Position: {}", session.position() + 1);
            }
        }
        Commands::Select {
            album_id,
            all_videos,
        } => {
            let selector = match album_id {
                Some(id) if !all_videos => CollectionSelector::Album(id),
                _ => CollectionSelector::Library,
            };
            session.select(selector.clone())?;
            match selector {
                CollectionSelector::Library => println!("Selected all videos"),
                CollectionSelector::Album(id) => println!("Selected album {}", id),
            }
        }
        Commands::Albums { all } => {
            let mut viewer = build_viewer(&cfg, session, None);
            let listing = match viewer.albums().await {
                Ok(listing) => listing,
                Err(e) => {
                    print_failure(&e);
                    return Err(e.into());
                }
            };
            for (origin, err) in &listing.failures {
                eprintln!("Could not list {:?} albums: {}", origin, err);
            }
            let mut shown = 0;
            for album in listing.visible(all) {
                let count = album
                    .reported_count()
                    .map(|c| format!("{} items", c))
                    .unwrap_or_else(|| "unknown size".to_string());
                let shared = match album.origin {
                    fetcher::AlbumOrigin::Shared => " [shared]",
                    fetcher::AlbumOrigin::Owned => "",
                };
                println!("{} (id: {}, {}){}", album.title(), album.album.id, count, shared);
                shown += 1;
            }
            if shown == 0 {
                println!("No albums found");
            }
        }
        Commands::Videos { limit } => {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let progress = tokio::spawn(async move {
                while let Some(p) = rx.recv().await {
                    if let FetchProgress::PageFetched { page, total } = p {
                        tracing::info!(page, total, "Fetching videos...");
                    }
                }
            });
            let mut viewer = build_viewer(&cfg, session, Some(tx));
            let result = viewer.load(limit).await;
            if result.is_ok() {
                if viewer.status() == &ViewStatus::Empty {
                    println!("No videos in this collection");
                }
                for (i, item) in viewer.navigator().items().iter().enumerate() {
                    let created = item
                        .created_time()
                        .map(|t| t.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "unknown date".to_string());
                    println!("{}. {} ({})", i + 1, item.title(), created);
                    println!("    {}", item.playback_url());
                }
            }
            // closes the progress channel
            drop(viewer);
            progress.await?;
            if let Err(e) = result {
                print_failure(&e);
                return Err(e.into());
            }
        }
        Commands::Play { limit } => {
            let mut viewer = build_viewer(&cfg, session, None);
            viewer.navigator_mut().subscribe(|event| {
                if let NavigatorEvent::PositionChanged { from, to } = event {
                    tracing::debug!(from, to, "Position changed");
                }
            });
            if let Err(e) = viewer.load(limit).await {
                print_failure(&e);
                return Err(e.into());
            }
            if viewer.status() == &ViewStatus::Empty {
                println!("No videos in this collection");
                return Ok(());
            }

            println!("Commands: n, p, swipe <dy>, wheel <dy>, goto <n>, end, q");
            print_current(&viewer);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                match parse_play_command(&line) {
                    Some(PlayCommand::Quit) => break,
                    Some(PlayCommand::Input(input)) => {
                        viewer.handle(input)?;
                        print_current(&viewer);
                    }
                    None => println!("Unknown command: {}", line.trim()),
                }
            }
        }
    }

    Ok(())
}

type CliViewer = Viewer<ApiClient, CliRefresher>;

fn build_viewer(
    cfg: &config::AppConfig,
    session: Session,
    progress: Option<mpsc::UnboundedSender<FetchProgress>>,
) -> CliViewer {
    let library = match &cfg.api_base_url {
        Some(url) => ApiClient::with_base_url(url.clone()),
        None => ApiClient::new(),
    };
    let mut fetcher = MediaFetcher::new(library)
        .with_library_limit(cfg.library_video_limit)
        .with_thumbnail_width(cfg.thumbnail_width);
    if let Some(tx) = progress {
        fetcher = fetcher.with_progress(tx);
    }
    let client = oauth_config(cfg)
        .and_then(|oauth| OAuthClient::new(&oauth))
        .map_err(|e| tracing::debug!(error = %e, "Token refresh unavailable"))
        .ok();
    Viewer::new(fetcher, CliRefresher { client }, session)
}
