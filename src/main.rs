//! davis-capture CLI
//!
//! Records labeled intervals for event camera sessions.

use clap::{Parser, Subcommand, ValueEnum};
use davis_capture::{
    capture::StreamEngine,
    config::Config,
    core::{OutputLayout, RecordingMode, SessionTarget},
    session::{Notice, SessionController, SessionHandle, SessionRequest},
    sink::CsvSink,
    stats::create_shared_stats_with_persistence,
    LabelReconciler, OPERATOR_GUIDE, VERSION,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "davis-capture")]
#[command(version = VERSION)]
#[command(about = "Record labeled event camera sessions driven by a button board", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Primitive,
    Continuous,
}

impl From<ModeArg> for RecordingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Primitive => RecordingMode::Primitive,
            ModeArg::Continuous => RecordingMode::Continuous,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record attempts of a task until the quit button or Ctrl+C
    Record {
        /// Task name, used as the file name prefix
        #[arg(long, short)]
        task: String,

        /// Recording mode
        #[arg(long, value_enum, default_value = "primitive")]
        mode: ModeArg,

        /// Primitive category (sub-folder of the output directory)
        #[arg(long, short)]
        primitive: Option<String>,

        /// Device or FIFO carrying the board's event stream
        #[arg(long)]
        device: Option<PathBuf>,

        /// Output directory
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Initial labels for continuous mode, e.g. "1,2,3"
        #[arg(long)]
        labels: Option<String>,
    },

    /// List primitive categories
    Primitives {
        /// Output directory
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show the attempt number the next recording of a task would get
    NextAttempt {
        #[arg(long, short)]
        task: String,

        /// Primitive category; omit for continuous recordings
        #[arg(long, short)]
        primitive: Option<String>,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show cumulative recording statistics
    Status,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Record {
            task,
            mode,
            primitive,
            device,
            output,
            labels,
        } => {
            cmd_record(task, mode.into(), primitive, device, output, labels);
        }
        Commands::Primitives { output } => {
            cmd_primitives(output);
        }
        Commands::NextAttempt {
            task,
            primitive,
            output,
        } => {
            cmd_next_attempt(&task, primitive, output);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config, using defaults: {e}");
            Config::default()
        }
    }
}

fn cmd_record(
    task: String,
    mode: RecordingMode,
    primitive: Option<String>,
    device: Option<PathBuf>,
    output: Option<PathBuf>,
    labels: Option<String>,
) {
    println!("davis-capture v{VERSION}");

    let mut config = load_config();
    if let Some(device) = device {
        config.device = device;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let required = mode.required_inputs();
    println!("  Task: {task}");
    println!("  Mode: {mode}");
    if required.primitive {
        println!("  Primitive: {}", primitive.as_deref().unwrap_or("<none>"));
    }
    println!("  Device: {}", config.device.display());
    println!("  Output: {}", config.output_dir.display());
    println!("{OPERATOR_GUIDE}");

    let reconciler = Arc::new(LabelReconciler::new());
    if let Some(text) = labels.filter(|_| required.labels) {
        match reconciler.confirm(&text) {
            Ok(labels) => println!("Labels were set: {labels:?}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let (notice_tx, notice_rx) = crossbeam_channel::unbounded::<Notice>();

    let mut controller = SessionController::new(
        StreamEngine::device(&config.device),
        CsvSink::new(),
        OutputLayout::new(&config.output_dir),
    )
    .with_labels(reconciler.clone())
    .with_stats(stats.clone())
    .with_options(config.session_options())
    .with_notices(notice_tx);

    ctrlc_handler(controller.handle());

    let printer = thread::spawn(move || {
        for notice in notice_rx {
            match notice {
                Notice::Error(_) => eprintln!("{notice}"),
                _ => println!("{notice}"),
            }
        }
    });

    if required.labels {
        spawn_label_input(reconciler);
    }

    let request = SessionRequest {
        task,
        mode,
        primitive,
    };
    let result = controller.run(&request);

    // Closes the notice channel so the printer drains and exits.
    drop(controller);
    let _ = printer.join();

    println!();
    println!("{}", stats.summary());

    match result {
        Ok(summary) => {
            for path in &summary.saved {
                println!("  {}", path.display());
            }
        }
        Err(e) => {
            if e.is_hardware_unavailable() {
                eprintln!("Check that the capture board is connected and the device path is correct.");
            }
            std::process::exit(1);
        }
    }
}

/// Confirm every line typed on stdin as a new label list.
fn spawn_label_input(reconciler: Arc<LabelReconciler>) {
    println!("Type labels as comma-separated integers and press Enter.");
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match reconciler.confirm(&line) {
                Ok(labels) => println!("Labels were set: {labels:?}"),
                Err(e) => eprintln!("{e}, previous labels kept"),
            }
        }
    });
}

fn cmd_primitives(output: Option<PathBuf>) {
    let config = load_config();
    let layout = OutputLayout::new(output.unwrap_or(config.output_dir));

    match layout.known_primitives() {
        Ok(categories) if categories.is_empty() => {
            println!("No primitive folders in {}", layout.root().display());
            println!("Create one sub-folder per primitive to record primitive sessions.");
        }
        Ok(categories) => {
            for category in categories {
                println!("{category}");
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_next_attempt(task: &str, primitive: Option<String>, output: Option<PathBuf>) {
    let config = load_config();
    let layout = OutputLayout::new(output.unwrap_or(config.output_dir));
    let target = match primitive {
        Some(category) => SessionTarget::Primitive { category },
        None => SessionTarget::Continuous,
    };

    match layout.next_attempt(&target, task) {
        Ok(attempt) => {
            let paths = layout.attempt_paths(&target, task, attempt);
            println!("Next attempt: {attempt}");
            println!("  Records: {}", paths.records.display());
            println!("  Raw: {}", paths.raw.display());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_status() {
    let config = load_config();

    println!("davis-capture Status");
    println!("====================");
    println!();
    println!("Device: {}", config.device.display());
    println!(
        "  Present: {}",
        if config.device.exists() { "yes" } else { "no" }
    );
    println!("Output directory: {}", config.output_dir.display());
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let stats = create_shared_stats_with_persistence(stats_path);
        println!("{}", stats.summary());
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(handle: SessionHandle) {
    ctrlc::set_handler(move || {
        if handle.stop() {
            eprintln!();
            eprintln!("Stopping capture...");
        }
    })
    .expect("Error setting Ctrl+C handler");
}
