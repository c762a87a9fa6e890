use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use mvhub::catalog::{apply_filters, Character, Connectivity, LoadError, StatusFilter};
use mvhub::cloud::{CloudAvailability, SyncOutcome};
use mvhub::config::Config;
use mvhub::store::{KvStore, MemoryStore, SqliteStore};
use mvhub::{logging, App};

#[derive(Parser, Debug)]
#[command(name = "mvhub")]
#[command(about = "Browse the Rick & Morty catalog, with favorites, offline cache and cloud sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./mvhub.yaml or $XDG_CONFIG_HOME/mvhub/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Act as if there were no network: serve everything from the cache
  #[arg(long, global = true)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List characters
  Characters {
    #[arg(short, long, default_value_t = 1)]
    page: u32,
    /// Status filter (defaults to the saved preference)
    #[arg(short, long, value_enum)]
    status: Option<StatusFilter>,
    /// Name search
    #[arg(short = 'q', long)]
    search: Option<String>,
  },
  /// Show one character with its first episodes
  Character { id: u32 },
  /// Manage favorites
  #[command(subcommand)]
  Favorites(FavoritesCommand),
  /// Show or change preferences
  #[command(subcommand)]
  Prefs(PrefsCommand),
  /// Usage statistics
  Stats,
  /// Inspect or maintain the telemetry log
  #[command(subcommand)]
  Telemetry(TelemetryCommand),
  /// What is stored on this device
  Storage,
  /// Delete all local data (and cloud copies when online)
  ClearData,
  /// Cloud sync
  #[command(subcommand)]
  Cloud(CloudCommand),
  /// Account management
  #[command(subcommand)]
  Auth(AuthCommand),
}

#[derive(Subcommand, Debug)]
enum FavoritesCommand {
  List,
  Add { id: u32 },
  Remove { id: u32 },
  Clear,
}

#[derive(Subcommand, Debug)]
enum PrefsCommand {
  Show,
  Set {
    #[arg(long, value_enum)]
    default_filter: Option<StatusFilter>,
    #[arg(long)]
    notifications: Option<bool>,
    #[arg(long)]
    cache: Option<bool>,
  },
}

#[derive(Subcommand, Debug)]
enum TelemetryCommand {
  /// Most recent events
  Recent {
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,
  },
  /// Dump every event as JSON
  Export,
  /// Drop events older than the given number of days
  Prune {
    #[arg(long, default_value_t = 30)]
    days: i64,
  },
  Clear,
}

#[derive(Subcommand, Debug)]
enum CloudCommand {
  Status,
  /// Write and delete a test document
  Check,
  /// Reconcile favorites and preferences with the cloud
  Sync,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
  /// Sign in (password from MVHUB_PASSWORD)
  Login { email: String },
  /// Create an account (password from MVHUB_PASSWORD)
  Register { email: String },
  Logout,
  ResetPassword { email: String },
  Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;
  let _log_guard = logging::init(&data_dir.join("logs"))?;

  let store: Arc<dyn KvStore> = match SqliteStore::open(&data_dir) {
    Ok(store) => Arc::new(store),
    Err(e) => {
      tracing::error!(error = %e, "local store unavailable, keeping data in memory");
      eprintln!("warning: {} (changes will not be saved)", e);
      Arc::new(MemoryStore::new())
    }
  };

  let connectivity = if args.offline {
    Connectivity::Offline
  } else {
    Connectivity::Online
  };

  let mut app = App::new(config, store, connectivity)?;
  app.record_launch();

  let result = run(&mut app, args.command).await;

  if let Err(e) = app.settle().await {
    eprintln!("warning: {}", e);
  }
  result
}

async fn run(app: &mut App, command: Command) -> Result<()> {
  match command {
    Command::Characters {
      page,
      status,
      search,
    } => list_characters(app, page, status, search).await,

    Command::Character { id } => {
      let detail = app.character_detail(id).await?;
      let c = &detail.character.data;
      println!("#{} {}{}", c.id, c.name, if detail.is_favorite { " ★" } else { "" });
      println!("  status:   {}", c.status);
      println!("  species:  {}", c.species);
      println!("  origin:   {}", c.origin.name);
      println!("  location: {}", c.location.name);
      if let Some(at) = detail.character.cached_at {
        println!("  (cached {})", at.format("%Y-%m-%d %H:%M"));
      }
      match detail.episodes {
        Some(episodes) => {
          println!("  episodes:");
          for e in &episodes.data {
            println!("    {} {} ({})", e.episode, e.name, e.air_date);
          }
        }
        None => println!("  episodes: unavailable"),
      }
      Ok(())
    }

    Command::Favorites(cmd) => match cmd {
      FavoritesCommand::List => {
        print_characters(app.favorites());
        Ok(())
      }
      FavoritesCommand::Add { id } => {
        if app.favorite_by_id(id).await? {
          println!("Added #{} to favorites", id);
        } else {
          println!("#{} is already a favorite", id);
        }
        Ok(())
      }
      FavoritesCommand::Remove { id } => {
        if app.remove_favorite(id) {
          println!("Removed #{} from favorites", id);
        } else {
          println!("#{} is not a favorite", id);
        }
        Ok(())
      }
      FavoritesCommand::Clear => {
        let count = app.favorites().len();
        app.clear_favorites();
        println!("Removed {} favorite(s)", count);
        Ok(())
      }
    },

    Command::Prefs(cmd) => {
      if let PrefsCommand::Set {
        default_filter,
        notifications,
        cache,
      } = cmd
      {
        app.update_preferences(|p| {
          if let Some(filter) = default_filter {
            p.default_filter = filter;
          }
          if let Some(enabled) = notifications {
            p.notifications_enabled = enabled;
          }
          if let Some(enabled) = cache {
            p.cache_enabled = enabled;
          }
        });
      }
      let prefs = app.preferences();
      println!("default filter: {}", prefs.default_filter);
      println!("notifications:  {}", prefs.notifications_enabled);
      println!("cache:          {}", prefs.cache_enabled);
      Ok(())
    }

    Command::Stats => {
      let stats = app.stats();
      println!("total events: {}", stats.total_events);
      for (event_type, count) in &stats.events_by_type {
        println!("  {:<18} {}", event_type.as_str(), count);
      }
      if let Some(event) = &stats.oldest_event {
        println!("oldest:      {}", event.timestamp.to_rfc3339());
      }
      if let Some(event) = &stats.most_recent_event {
        println!("most recent: {}", event.timestamp.to_rfc3339());
      }
      Ok(())
    }

    Command::Telemetry(cmd) => {
      match cmd {
        TelemetryCommand::Recent { count } => {
          for event in app.telemetry().recent_events(count) {
            println!(
              "{} {} {}",
              event.timestamp.to_rfc3339(),
              event.event_type.as_str(),
              serde_json::Value::Object(event.details.clone())
            );
          }
        }
        TelemetryCommand::Export => println!("{}", app.telemetry().export_events()),
        TelemetryCommand::Prune { days } => {
          let removed = app.prune_telemetry(days);
          println!("Removed {} event(s) older than {} day(s)", removed, days);
        }
        TelemetryCommand::Clear => {
          app.clear_telemetry();
          println!("Telemetry cleared");
        }
      }
      Ok(())
    }

    Command::Storage => {
      let info = app.storage_info().await?;
      println!("favorites:  {}", info.favorites_count);
      println!("cache keys: {}", info.cache_keys);
      println!("total size: {}", info.total_size());
      Ok(())
    }

    Command::ClearData => {
      let (removed, cloud) = app.clear_all_data().await?;
      println!("Removed {} local key(s)", removed);
      println!("Cloud: {}", cloud);
      Ok(())
    }

    Command::Cloud(cmd) => match cmd {
      CloudCommand::Status => {
        match app.cloud().availability() {
          CloudAvailability::Available => println!("cloud: available"),
          CloudAvailability::Unavailable { reason } => println!("cloud: unavailable ({})", reason),
        }
        println!("device:    {}", app.cloud().device_id());
        println!("partition: {:?}", app.cloud().partition());
        Ok(())
      }
      CloudCommand::Check => {
        println!("connection: {}", app.check_cloud().await);
        Ok(())
      }
      CloudCommand::Sync => {
        match app.sync().await {
          SyncOutcome::Synced(data) => println!(
            "Synced {} favorite(s), default filter {}",
            data.favorites.len(),
            data.preferences.default_filter
          ),
          other => println!("Sync {}", other),
        }
        Ok(())
      }
    },

    Command::Auth(cmd) => match cmd {
      AuthCommand::Login { email } => {
        let password = Config::get_password()?;
        let user = app.sign_in(&email, &password).await?;
        println!("Signed in as {} ({})", user.email, user.uid);
        Ok(())
      }
      AuthCommand::Register { email } => {
        let password = Config::get_password()?;
        let user = app.sign_up(&email, &password).await?;
        println!("Registered {} ({})", user.email, user.uid);
        Ok(())
      }
      AuthCommand::Logout => {
        app.sign_out();
        println!("Signed out");
        Ok(())
      }
      AuthCommand::ResetPassword { email } => {
        app.send_password_reset(&email).await?;
        println!("Password reset email sent to {}", email);
        Ok(())
      }
      AuthCommand::Whoami => {
        match app.current_user() {
          Some(user) => println!(
            "{} ({}){}",
            user.email,
            user.uid,
            if app.cloud().auth().is_simulated() {
              " [simulated]"
            } else {
              ""
            }
          ),
          None => println!("Not signed in"),
        }
        Ok(())
      }
    },
  }
}

async fn list_characters(
  app: &mut App,
  page: u32,
  status: Option<StatusFilter>,
  search: Option<String>,
) -> Result<()> {
  let filter = match status {
    Some(filter) => {
      app.apply_filter(filter);
      filter
    }
    None => app.preferences().default_filter,
  };

  if let Some(query) = search.as_deref().filter(|q| !q.trim().is_empty()) {
    match app.search(query, page).await {
      Ok(found) => {
        print_characters(&apply_filters(&found.results, filter, ""));
        println!("page {} of {}", page, found.total_pages);
        return Ok(());
      }
      // Offline search falls back to filtering the cached first page
      Err(LoadError::UnavailableOffline(_)) => {}
      Err(e) => return Err(e.into()),
    }
  }

  let result = app
    .browse(page, filter)
    .await
    .map_err(|e| eyre!("Could not load characters: {}", e))?;

  let shown = apply_filters(&result.data.results, filter, search.as_deref().unwrap_or(""));
  print_characters(&shown);

  if let Some(at) = result.cached_at {
    println!("(cached {}, {:?})", at.format("%Y-%m-%d %H:%M"), result.source);
  }
  println!(
    "page {} of {}{}",
    page,
    result.data.total_pages,
    if result.data.next_page_exists { ", more available" } else { "" }
  );
  Ok(())
}

fn print_characters(characters: &[Character]) {
  if characters.is_empty() {
    println!("(none)");
    return;
  }
  for c in characters {
    println!("{:>4}  {:<32} {:<8} {}", c.id, c.name, c.status.as_str(), c.species);
  }
}
