//! musikla — evaluate a score file through the event pipeline and print the
//! resulting events or their notation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use musikla::config::{CoreConfig, NotationKind};
use musikla::context::Context;
use musikla::event::MusicEvent;
use musikla::score::Score;
use musikla::transform::{
    AbcFormat, DecomposeNotes, NotationBuilder, Pipeline, Sort, TextFormat, TransformExt,
    VoiceIdentifier,
};
use musikla::voice::Voice;

#[derive(Parser)]
#[command(name = "musikla")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.musikla/core.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `musikla::transform=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum NotationArg {
    Abc,
    Text,
}

impl From<NotationArg> for NotationKind {
    fn from(arg: NotationArg) -> Self {
        match arg {
            NotationArg::Abc => NotationKind::Abc,
            NotationArg::Text => NotationKind::Text,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a YAML or JSON score through the pipeline
    Run {
        /// Path to the score file
        score: PathBuf,

        /// Reorder events within this many ticks (overrides the config)
        #[arg(long)]
        sort_window: Option<i64>,

        /// Split voices into monophonic sub-voices
        #[arg(long)]
        voices: bool,

        /// Split notes and chords into on/off pairs
        #[arg(long)]
        decompose: bool,

        /// Print notation instead of JSON lines (format defaults to the config's)
        #[arg(long, value_enum, num_args = 0..=1)]
        notation: Option<Option<NotationArg>>,

        /// Print a notation snapshot after every event
        #[arg(long, requires = "notation")]
        every_event: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}

fn load_config(path: Option<&Path>) -> Result<CoreConfig, String> {
    match path {
        Some(path) => CoreConfig::load_from(path).map_err(|e| e.to_string()),
        None => Ok(CoreConfig::load().unwrap_or_default()),
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct RunOptions {
    sort_window: i64,
    voices: bool,
    decompose: bool,
    notation: Option<NotationKind>,
    only_final: bool,
}

fn run(config: &CoreConfig, score: &Path, options: RunOptions) -> Result<(), String> {
    let score = Score::load(score).map_err(|e| e.to_string())?;
    let ctx = Context::with_voice(Voice::default().with_ticks_per_beat(config.ticks_per_beat));
    let music = score.to_music(&ctx.voice()).map_err(|e| e.to_string())?;
    info!(events = score.events.len(), "score loaded");

    let mut pipeline = Pipeline::new();
    if options.sort_window > 0 {
        pipeline = pipeline.then(Sort::new(options.sort_window));
    }
    if options.voices {
        pipeline = pipeline.then(VoiceIdentifier::new(config.voices.clone()));
    }
    if options.decompose {
        pipeline = pipeline.then(DecomposeNotes::new());
    }
    debug!(stages = pipeline.len(), "pipeline built");

    let events = music.expand(&ctx).transform(pipeline);
    match options.notation {
        None => {
            for event in events {
                println!("{}", event_json(&event.map_err(|e| e.to_string())?)?);
            }
        }
        Some(kind) => {
            let snapshots: Box<dyn Iterator<Item = musikla::error::Result<String>>> = match kind {
                NotationKind::Abc => {
                    Box::new(NotationBuilder::new(AbcFormat, options.only_final).render(events))
                }
                NotationKind::Text => {
                    Box::new(NotationBuilder::new(TextFormat, options.only_final).render(events))
                }
            };
            for snapshot in snapshots {
                print!("{}", snapshot.map_err(|e| e.to_string())?);
            }
        }
    }
    Ok(())
}

fn event_json(event: &MusicEvent) -> Result<String, String> {
    serde_json::to_string(event).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("musikla: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_filter));

    let result = match cli.command {
        Commands::Config => {
            print!("{}", config.to_yaml());
            Ok(())
        }
        Commands::Run {
            score,
            sort_window,
            voices,
            decompose,
            notation,
            every_event,
        } => {
            let options = RunOptions {
                sort_window: sort_window.unwrap_or(config.sort_window),
                voices,
                decompose,
                notation: notation
                    .map(|arg| arg.map_or(config.notation.format, NotationKind::from)),
                only_final: !every_event && config.notation.only_final,
            };
            run(&config, &score, options)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("musikla: {e}");
            ExitCode::FAILURE
        }
    }
}
