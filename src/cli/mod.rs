use anyhow::{Context, anyhow};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode, sync::Arc};

use crate::catalog::{
    CatalogResolver, local::LocalCatalog, remote::HttpCatalog, remote::RemoteCatalog,
};
use crate::config::{self, Config};
use crate::domain::{drop::DropId, track::TrackCode};
use crate::http::server::CatalogServer;
use crate::public_endpoint::get_player_url;
use crate::session::SessionOrchestrator;
use crate::storage;
use crate::tag::{NdefRecord, TNF_WELL_KNOWN};

#[derive(Parser)]
#[command(name = "unheard")]
#[command(version = "0.1")]
#[command(about = "Tag-unlocked audio drops")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "unheard.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the catalog HTTP service
    Serve {
        /// JSON file with the tracks to serve instead of the demo catalog
        #[arg(long)]
        tracks: Option<PathBuf>,
    },
    /// Record a scan and print the link to its session
    Scan {
        /// Track code, as typed in by hand
        #[arg(long, conflicts_with = "payload", required_unless_present = "payload")]
        code: Option<String>,
        /// Raw record payload in hex, as read from a tag
        #[arg(long)]
        payload: Option<String>,
        /// Type name format of the raw record
        #[arg(long, default_value_t = TNF_WELL_KNOWN, requires = "payload")]
        tnf: u8,
        /// Record type of the raw record
        #[arg(long = "type", default_value = "T", requires = "payload")]
        record_type: String,
    },
    /// List recorded drops, newest first
    Drops {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show the most recent drops with their catalog entries
    Recent {
        #[arg(short, long, default_value_t = 3)]
        limit: usize,
    },
    /// Forget a single drop
    Remove { id: String },
    /// Forget all drops
    Clear,
    /// List the catalog
    Tracks {
        /// Ask the remote catalog instead of the local one
        #[arg(short, long)]
        remote: bool,
    },
    /// Print what the player needs to stream a track
    Play { code: String },
}

/// Entrypoint for CLI
pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match execute(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// runs a command; `Ok(false)` means it completed but did not succeed
fn execute(cli: Cli) -> anyhow::Result<bool> {
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve { tracks } => {
            let catalog = match tracks {
                Some(path) => LocalCatalog::from_json_file(&path)?,
                None => LocalCatalog::demo(),
            };
            let http_server = CatalogServer::new(catalog, cfg.http);

            println!(
                "Catalog server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::Scan {
            code,
            payload,
            tnf,
            record_type,
        } => {
            let sessions = orchestrator(&cfg)?;

            let result = match (code, payload) {
                (Some(code), _) => sessions.handle_code(&code),
                (None, Some(payload)) => {
                    let record = NdefRecord {
                        tnf,
                        record_type: record_type.into_bytes(),
                        payload: parse_hex(&payload)?,
                    };
                    sessions.handle_message(&[record])
                }
                (None, None) => return Err(anyhow!("either --code or --payload is required")),
            };

            match result {
                Ok(session) => {
                    let drop = &session.drop;
                    println!("Drop {} recorded", drop.id);
                    println!("  {} - {} [{}]", drop.title, drop.artist, drop.cover_color);
                    if !session.resolved {
                        println!("  (track not found in catalog)");
                    }
                    println!("{}", get_player_url(&cfg.player, &session.track_code));
                }
                Err(failure) => {
                    println!("Invalid tag: {failure}");
                    return Ok(false);
                }
            }
        }

        Commands::Drops { limit } => {
            let sessions = orchestrator(&cfg)?;
            let drops = match limit {
                Some(n) => sessions.recent_drops(n),
                None => sessions.drops(),
            };

            println!("{} drops:", sessions.drop_count());
            for (index, drop) in drops.iter().enumerate() {
                println!(
                    "  #{} {}  {} - {}  [{}]  scanned {}",
                    index + 1,
                    drop.id,
                    drop.title,
                    drop.artist,
                    drop.track_code,
                    drop.scanned_at.with_timezone(&Local).format("%m/%d %H:%M")
                );
            }
        }

        Commands::Recent { limit } => {
            let sessions = orchestrator(&cfg)?;
            let recent = sessions.recent_sessions(limit);

            if recent.is_empty() {
                println!("No recent sessions");
            }
            for session in recent {
                println!(
                    "  {}  {} - {}",
                    session.track.code, session.track.title, session.track.artist
                );
                println!("    {}", get_player_url(&cfg.player, &session.track.code));
            }
        }

        Commands::Remove { id } => {
            let sessions = orchestrator(&cfg)?;
            let before = sessions.drop_count();
            sessions.remove_drop(&DropId(id.clone()));

            if sessions.drop_count() < before {
                println!("Drop {id} removed");
            } else {
                println!("No drop with id {id}");
            }
        }

        Commands::Clear => {
            let sessions = orchestrator(&cfg)?;
            sessions.clear_drops();
            println!("All drops removed");
        }

        Commands::Tracks { remote } => {
            let resolver = resolver(&cfg.catalog)?;
            let tracks = if remote {
                resolver
                    .list_remote()
                    .with_context(|| "Failed to list remote catalog")?
            } else {
                resolver.local().list()
            };

            for track in tracks {
                println!(
                    "  {}  {} - {}  [{}]",
                    track.code, track.title, track.artist, track.cover_color
                );
            }
        }

        Commands::Play { code } => {
            let code = TrackCode::parse(&code).ok_or_else(|| anyhow!("track code is empty"))?;
            let resolver = resolver(&cfg.catalog)?;

            match resolver.resolve(&code).into_option() {
                Some(track) => {
                    println!("{} - {}", track.title, track.artist);
                    println!("{}", track.audio_url);
                }
                None => {
                    println!("Track {code} not found");
                    return Ok(false);
                }
            }
        }
    }

    Ok(true)
}

fn resolver(cfg: &config::CatalogConfig) -> anyhow::Result<CatalogResolver> {
    let remote = match &cfg.base_url {
        Some(url) => {
            let client = HttpCatalog::new(url, cfg.timeout())
                .with_context(|| "Failed to set up remote catalog")?;
            Some(Box::new(client) as Box<dyn RemoteCatalog>)
        }
        None => None,
    };
    Ok(CatalogResolver::new(
        LocalCatalog::demo(),
        remote,
        cfg.cache_remote,
    ))
}

fn orchestrator(cfg: &Config) -> anyhow::Result<SessionOrchestrator> {
    let ledger =
        storage::open_ledger(&cfg.database).with_context(|| "Failed to open drop storage")?;
    Ok(SessionOrchestrator::new(
        Arc::new(resolver(&cfg.catalog)?),
        ledger,
        cfg.catalog.timeout(),
    ))
}

/// parses hex bytes, ignoring whitespace and `:` separators
fn parse_hex(input: &str) -> anyhow::Result<Vec<u8>> {
    let digits: Vec<char> = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(anyhow!("hex payload has an odd number of digits"));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16).with_context(|| format!("invalid hex byte {byte:?}"))
        })
        .collect()
}
