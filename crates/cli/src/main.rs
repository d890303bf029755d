// phenosync CLI - reconcile per-channel inForm exports and reshape their files

mod convert;
mod exit_codes;
mod sync;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use phenosync_config::{ConfigError, SyncConfig};

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_SYNC_INVALID_CONFIG, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "phenosync")]
#[command(about = "Reconcile and reshape multi-channel inForm cell exports")]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG applies when absent.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the six-stage reconciliation over an export tree
    #[command(after_help = "\
Examples:
  phenosync sync ./export
  phenosync sync ./export --dry-run --json
  phenosync sync --config project.toml --output sync-report.json
  phenosync sync ./export --pause

Exit codes:
  0  all files consistent
  5  some files could not be balanced (see report)
  6  row without key (missing_key = \"fail\") or key column missing")]
    Sync {
        /// Export root (<root>/<channel>/<batch>/<file>); overrides export_root
        root: Option<PathBuf>,

        /// Config file (default: <config dir>/phenosync/phenosync.toml if present)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Plan moves and rewrites without touching any file
        #[arg(long)]
        dry_run: bool,

        /// Print the JSON report to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON report to a file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Wait for ENTER before exiting
        #[arg(long)]
        pause: bool,
    },

    /// List channel and batch folders without changing anything
    #[command(after_help = "\
Examples:
  phenosync inventory ./export
  phenosync inventory --config project.toml --json")]
    Inventory {
        /// Export root; overrides export_root
        root: Option<PathBuf>,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output JSON instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// Validate a config file without running
    #[command(after_help = "\
Examples:
  phenosync validate project.toml
  phenosync validate")]
    Validate {
        /// Config file (default location when omitted)
        config: Option<PathBuf>,
    },

    /// Split merged cell-data files into one file per sample
    #[command(after_help = "\
Examples:
  phenosync split \"CD8 Merge_cell_seg_data.txt\" --out split/
  phenosync split merged/ --out split/ --json

A folder input is searched for files containing split.target.")]
    Split {
        /// Merged files or folders
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output root; one sub-folder per channel is created
        #[arg(long)]
        out: PathBuf,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Print a JSON summary to stdout
        #[arg(long)]
        json: bool,
    },

    /// Split a consolidated export into per-sample numeric tables
    #[command(after_help = "\
Examples:
  phenosync sample-tables Consolidated_data.txt --out tables/
  phenosync sample-tables consolidated/ --out tables/ --json

Rows are grouped by sample_tables.sample_column; only columns that are
numeric in the first data row are kept. Output is tab-separated.")]
    SampleTables {
        /// Consolidated files or folders
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output folder
        #[arg(long)]
        out: PathBuf,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Print a JSON summary to stdout
        #[arg(long)]
        json: bool,
    },

    /// Split HALO object results into one CSV per image
    #[command(after_help = "\
Examples:
  phenosync halo-split import/ --out export/
  phenosync halo-split Total_Object_Results.csv --out export/ --json

The output folder must be empty or absent.")]
    HaloSplit {
        /// Object result files or folders
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output folder (must be empty)
        #[arg(long)]
        out: PathBuf,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Print a JSON summary to stdout
        #[arg(long)]
        json: bool,
    },

    /// Write a Fiji TileConfiguration.txt from TIFF stage positions
    #[command(after_help = "\
Examples:
  phenosync tileconfig scans/region1
  phenosync tileconfig scans/*/ --invert-y

One configuration file is written into each folder.")]
    Tileconfig {
        /// Folders holding the tile images
        #[arg(required = true)]
        folders: Vec<PathBuf>,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Flip the Y axis (overrides tileconfig.invert_y when set)
        #[arg(long)]
        invert_y: bool,

        /// Print a JSON summary to stdout
        #[arg(long)]
        json: bool,
    },

    /// Convert tab-separated exports to CSV with numeric columns only
    #[command(after_help = "\
Examples:
  phenosync sanitize slide1_cell_seg_data.txt --out csv/
  phenosync sanitize export/CD8/batch1 --out csv/

A folder input is searched for files containing sanitize.target.")]
    Sanitize {
        /// Export files or folders
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output folder
        #[arg(long)]
        out: PathBuf,

        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Print a JSON summary to stdout
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let mut builder = if verbose == 0 {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
    } else {
        let mut b = env_logger::Builder::new();
        b.filter_level(match verbose {
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        });
        b
    };
    builder.format_timestamp(None).format_target(false).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Sync { root, config, dry_run, json, output, pause } => {
            sync::cmd_sync(root, config, dry_run, json, output, pause)
        }
        Commands::Inventory { root, config, json } => sync::cmd_inventory(root, config, json),
        Commands::Validate { config } => sync::cmd_validate(config),
        Commands::Split { inputs, out, config, json } => convert::cmd_split(inputs, out, config, json),
        Commands::Sanitize { inputs, out, config, json } => {
            convert::cmd_sanitize(inputs, out, config, json)
        }
        Commands::SampleTables { inputs, out, config, json } => {
            convert::cmd_sample_tables(inputs, out, config, json)
        }
        Commands::HaloSplit { inputs, out, config, json } => {
            convert::cmd_halo_split(inputs, out, config, json)
        }
        Commands::Tileconfig { folders, config, invert_y, json } => {
            convert::cmd_tileconfig(folders, config, invert_y, json)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(_) => CliError::args(err.to_string())
                .with_hint("pass an existing file with --config, or omit it to use defaults"),
            ConfigError::Parse(_) | ConfigError::Validation(_) => {
                CliError::new(EXIT_SYNC_INVALID_CONFIG, err.to_string())
            }
        }
    }
}

/// Config from `--config`, the default location, or built-in defaults.
pub(crate) fn load_config(path: Option<&PathBuf>) -> Result<SyncConfig, CliError> {
    let config = SyncConfig::load_or_default(path.map(PathBuf::as_path))?;
    match path {
        Some(p) => log::info!("config: {}", p.display()),
        None => log::debug!("config: defaults or {}", SyncConfig::default_path().display()),
    }
    Ok(config)
}
