use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use faction_ai::base::Point;
use faction_ai::config::AIConfig;
use faction_ai::controller::AIController;
use faction_ai::sandbox::Sandbox;
use faction_ai::world::World;

/// Run AI factions against each other on a generated map.
#[derive(Parser)]
#[command(name = "selfplay", version)]
struct Cli {
    /// Number of turns to play
    #[arg(short, long, default_value_t = 100)]
    turns: i32,

    /// Map and AI seed
    #[arg(short, long, default_value_t = 17)]
    seed: u64,

    #[arg(long, default_value_t = 48)]
    width: i32,

    #[arg(long, default_value_t = 32)]
    height: i32,

    /// Number of non-barbarian factions
    #[arg(short, long, default_value_t = 3)]
    factions: usize,

    /// JSON file with AI tuning knobs
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit auction and order traces for this faction
    #[arg(long)]
    debug_faction: Option<u32>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &cli.config {
        Some(path) => match AIConfig::load(path) {
            Ok(x) => x,
            Err(err) => {
                error!(%err, "bad config");
                return ExitCode::FAILURE;
            }
        },
        None => AIConfig::default(),
    };
    config.seed = cli.seed;
    if cli.debug_faction.is_some() { config.log.debug_faction = cli.debug_faction; }
    if cli.width < 8 || cli.height < 8 || cli.factions == 0 {
        error!(width = cli.width, height = cli.height, factions = cli.factions, "map too small");
        return ExitCode::FAILURE;
    }

    let mut game = Sandbox::generate(Point(cli.width, cli.height), cli.factions, cli.seed);
    let players: Result<Vec<AIController>, _> = game.factions().into_iter()
        .filter(|&x| !game.is_barbarian(x))
        .map(|x| AIController::new(x, config.clone())).collect();
    let mut players = match players {
        Ok(x) => x,
        Err(err) => {
            error!(%err, "bad config");
            return ExitCode::FAILURE;
        }
    };
    info!(players = players.len(), seed = cli.seed, "starting");

    for turn in 1..=cli.turns {
        for player in &mut players {
            let report = player.play_turn(&mut game);
            if !report.dropped.is_empty() {
                info!(turn, faction = %player.faction(), dropped = report.dropped.len(), "units dropped");
            }
        }
    }

    for faction in game.factions() {
        let cities = game.faction_cities(faction);
        let size: i32 = cities.iter().filter_map(|&x| game.city(x)).map(|x| x.size).sum();
        let units = game.faction_units(faction).len();
        let kind = if game.is_barbarian(faction) { "barbarian" } else { "ai" };
        println!("{} ({}): {} cities, total size {}, {} units", faction, kind, cities.len(), size, units);
    }
    ExitCode::SUCCESS
}
