//! Mezmur command line player
//!
//! Browses the catalog, plays tracks and manages offline downloads.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mezmur::audio::{RodioEngine, list_output_devices};
use mezmur::backend::{Backend, SupabaseClient};
use mezmur::cache::CacheStore;
use mezmur::database::{CatalogImport, CategoryId, Database, Track, TrackId, UserId};
use mezmur::download::DownloadManager;
use mezmur::settings::BackendKind;
use mezmur::{Library, Player, PlayerStatus, Settings};

#[derive(Parser)]
#[command(name = "mezmur")]
#[command(about = "Offline-first player for the Mezmur library", long_about = None)]
struct Cli {
    /// Act as this user instead of the one in the settings file
    #[arg(short, long, global = true, env = "MEZMUR_USER")]
    user: Option<String>,

    /// Settings file path
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tracks, newest first
    Tracks {
        /// Only tracks of this category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List categories
    Categories,
    /// Search titles and artists
    Search { query: String },
    /// Import categories and tracks from a JSON file (local backend)
    Import { path: PathBuf },
    /// Play a track until it ends or Ctrl-C
    Play { track_id: String },
    /// Download a track for offline playback
    Download { track_id: String },
    /// Delete a downloaded track
    Delete { track_id: String },
    /// List downloaded tracks
    Downloads,
    /// List favorites
    Favorites,
    /// Toggle a track's favorite flag
    Favorite { track_id: String },
    /// Show downloads directory usage
    Cache {
        /// Also remove partial files from interrupted downloads
        #[arg(long)]
        clean: bool,
    },
    /// List audio output devices
    Devices,
}

/// Everything a command may need, built from settings
struct App {
    settings: Settings,
    user: Option<UserId>,
    backend: Arc<dyn Backend>,
    database: Option<Database>,
    library: Library,
    downloads: DownloadManager,
}

impl App {
    async fn build(settings: Settings, user: Option<UserId>) -> anyhow::Result<Self> {
        let (backend, database): (Arc<dyn Backend>, Option<Database>) =
            match settings.backend.kind {
                BackendKind::Local => {
                    let db = Database::new(&settings.storage.database_path())
                        .await
                        .context("Failed to open local database")?;
                    (Arc::new(db.clone()), Some(db))
                }
                BackendKind::Supabase => {
                    let url = settings
                        .backend
                        .supabase_url
                        .as_deref()
                        .context("backend.supabase_url is not set")?;
                    let key = settings
                        .backend
                        .anon_key
                        .clone()
                        .context("backend.anon_key is not set")?;
                    let client = SupabaseClient::new(url, key)?;
                    client.set_access_token(settings.backend.access_token.clone());
                    (Arc::new(client), None)
                }
            };

        let library = Library::new(backend.clone());
        library.set_identity(user.clone());

        let cache = CacheStore::new(backend.clone(), settings.storage.downloads_dir());
        let downloads = DownloadManager::new(cache, settings.playback.progress_reset_delay());

        Ok(Self {
            settings,
            user,
            backend,
            database,
            library,
            downloads,
        })
    }

    fn require_user(&self) -> anyhow::Result<&UserId> {
        self.user
            .as_ref()
            .context("No user: pass --user or set user_id in the settings file")
    }

    async fn track(&self, id: &str) -> anyhow::Result<Track> {
        self.library
            .track(&TrackId::from(id))
            .await?
            .with_context(|| format!("Track not found: {}", id))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mezmur=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::load(),
    };
    let user = cli
        .user
        .map(UserId::from)
        .or_else(|| settings.user_id.clone());

    if let Commands::Devices = cli.command {
        for name in list_output_devices() {
            println!("{}", name);
        }
        return Ok(());
    }

    let ctx = App::build(settings, user).await?;

    match cli.command {
        Commands::Tracks { category } => {
            let tracks = match category {
                Some(id) => ctx.library.tracks_in_category(&CategoryId::from(id)).await?,
                None => ctx.library.tracks().await?,
            };
            print_tracks(&tracks);
        }
        Commands::Categories => {
            for category in ctx.library.categories().await? {
                println!("{:<24} {}", category.id, category.name);
            }
        }
        Commands::Search { query } => {
            print_tracks(&ctx.library.search(&query).await?);
        }
        Commands::Import { path } => {
            let Some(db) = &ctx.database else {
                bail!("import is only available with the local backend");
            };
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let catalog: CatalogImport = serde_json::from_str(&content)?;
            let (categories, tracks) = db.import_catalog(&catalog).await?;
            println!("Imported {} categories and {} tracks", categories, tracks);
        }
        Commands::Play { track_id } => play(&ctx, &track_id).await?,
        Commands::Download { track_id } => {
            let track = ctx.track(&track_id).await?;
            let path = ctx.downloads.download(&track, ctx.user.as_ref()).await?;
            println!("Saved to {}", path.display());
        }
        Commands::Delete { track_id } => {
            let user = ctx.require_user()?;
            ctx.downloads
                .remove(&TrackId::from(track_id), Some(user))
                .await?;
        }
        Commands::Downloads => {
            let user = ctx.require_user()?;
            for record in ctx.backend.list_downloads(user).await? {
                let present = ctx
                    .downloads
                    .cache()
                    .resolve_downloaded_state(user, &record.track_id)
                    .await;
                println!(
                    "{:<38} {} {}{}",
                    record.track_id,
                    record.downloaded_at.format("%Y-%m-%d %H:%M"),
                    record.path().display(),
                    if present { "" } else { " (missing)" }
                );
            }
        }
        Commands::Favorites => {
            for favorite in ctx.library.favorites().await? {
                match favorite.track {
                    Some(track) => print_tracks(std::slice::from_ref(&track)),
                    None => println!("{}", favorite.track_id),
                }
            }
        }
        Commands::Favorite { track_id } => {
            let favorite = ctx
                .library
                .toggle_favorite(&TrackId::from(track_id.as_str()))
                .await?;
            println!(
                "{} {}",
                track_id,
                if favorite {
                    "added to favorites"
                } else {
                    "removed from favorites"
                }
            );
        }
        Commands::Cache { clean } => {
            let cache = ctx.downloads.cache();
            if clean {
                let result = cache.cleanup_temp_files();
                println!(
                    "Removed {} partial files ({} bytes)",
                    result.files_deleted, result.bytes_freed
                );
            }
            let stats = cache.stats();
            println!("Directory: {}", cache.downloads_dir().display());
            println!(
                "Files: {} ({} partial), {} MB",
                stats.file_count,
                stats.partial_count,
                stats.total_mb()
            );
        }
        Commands::Devices => {}
    }

    Ok(())
}

async fn play(ctx: &App, track_id: &str) -> anyhow::Result<()> {
    let track = ctx.track(track_id).await?;

    let engine = RodioEngine::new(ctx.settings.playback.output_device.as_deref())
        .map_err(anyhow::Error::msg)?;
    let player = Player::new(
        Arc::new(engine),
        ctx.backend.clone(),
        ctx.downloads.clone(),
        ctx.settings.playback.poll_interval(),
    );
    player.set_identity(ctx.user.clone());

    let mut rx = player.subscribe();
    player.play(&track).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                // Nothing pauses a CLI session, so Paused means the track ended
                if snapshot.status == PlayerStatus::Paused {
                    break;
                }
                tracing::info!(
                    "{} {}/{}",
                    track.title,
                    format_ms(snapshot.position_ms),
                    format_ms(snapshot.duration_ms)
                );
            }
        }
    }

    player.stop().await;
    Ok(())
}

fn print_tracks(tracks: &[Track]) {
    for track in tracks {
        println!(
            "{:<38} {:<32} {:<24} {}",
            track.id,
            track.title,
            track.artist.as_deref().unwrap_or("-"),
            format_ms(track.nominal_duration_ms())
        );
    }
}

fn format_ms(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}
