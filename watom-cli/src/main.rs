//! Watom CLI - autosave a local file into a Watom wiki page

mod page;

use clap::{Arg, ArgMatches, Command};
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Level};
use watom_autosave::{AutosaveController, HttpFormSubmitter, HttpTransport, SubmitOutcome};
use watom_core::{Config, Result, WatomError};

use crate::page::FilePage;

/// Bound on a quick save when the configuration sets none
///
/// Saves are serialized, so a request that never completes would hold every
/// later save back until the client exits.
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// What the user asked for
#[derive(Debug, Clone)]
enum CliCommand {
    Edit {
        file: PathBuf,
        quiet_ms: Option<u64>,
        allow_overlap: bool,
    },
    Save {
        file: PathBuf,
        baseline: Option<PathBuf>,
    },
    ValidateConfig,
}

/// CLI arguments structure
#[derive(Debug, Clone)]
struct Args {
    command: CliCommand,
    page_url: Option<String>,
    config_file: Option<PathBuf>,
    verbose: bool,
}

fn file_arg() -> Arg {
    Arg::new("file")
        .help("Local file holding the page source")
        .required(true)
        .index(1)
        .value_parser(clap::value_parser!(PathBuf))
}

fn url_arg() -> Arg {
    Arg::new("url")
        .short('u')
        .long("url")
        .help("URL of the wiki page")
        .long_help(
            "URL of the wiki page to save into, either its view URL or its \
            `.__edit__` URL. Quick saves and full form submissions both go to the \
            edit URL. Overrides page_url from the configuration file.",
        )
        .value_parser(clap::value_parser!(String))
}

impl Args {
    fn parse() -> Self {
        let matches = Command::new("watom")
            .version("0.1.0")
            .about("Autosaving editor client for Watom wiki pages")
            .subcommand_required(true)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .global(true)
                    .help("Path to configuration file (JSON format)")
                    .value_parser(clap::value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .global(true)
                    .help("Enable debug logging")
                    .action(clap::ArgAction::SetTrue),
            )
            .subcommand(
                Command::new("edit")
                    .about("Watch a file and autosave every change to the page")
                    .arg(file_arg())
                    .arg(url_arg())
                    .arg(
                        Arg::new("quiet-ms")
                            .long("quiet-ms")
                            .help("Quiet period in milliseconds before a change is saved")
                            .value_parser(clap::value_parser!(u64)),
                    )
                    .arg(
                        Arg::new("allow-overlap")
                            .long("allow-overlap")
                            .help("Send a new save even while the previous one is in flight")
                            .action(clap::ArgAction::SetTrue),
                    ),
            )
            .subcommand(
                Command::new("save")
                    .about("Submit the file once through the full save form")
                    .arg(file_arg())
                    .arg(url_arg())
                    .arg(
                        Arg::new("baseline")
                            .long("baseline")
                            .help("File holding the server text the edit started from")
                            .value_parser(clap::value_parser!(PathBuf)),
                    ),
            )
            .subcommand(
                Command::new("validate-config").about("Validate a configuration file and exit"),
            )
            .after_help(
                "EXAMPLES:\n    \
                watom edit notes.rst --url http://localhost:8080/notes\n    \
                watom save notes.rst --url http://localhost:8080/notes --baseline notes.orig\n    \
                watom validate-config --config watom.json",
            )
            .get_matches();

        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        let (command, sub) = match matches.subcommand() {
            Some(("edit", sub)) => (
                CliCommand::Edit {
                    file: sub.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
                    quiet_ms: sub.get_one::<u64>("quiet-ms").copied(),
                    allow_overlap: sub.get_flag("allow-overlap"),
                },
                Some(sub),
            ),
            Some(("save", sub)) => (
                CliCommand::Save {
                    file: sub.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
                    baseline: sub.get_one::<PathBuf>("baseline").cloned(),
                },
                Some(sub),
            ),
            _ => (CliCommand::ValidateConfig, None),
        };

        Self {
            command,
            page_url: sub.and_then(|sub| sub.get_one::<String>("url").cloned()),
            config_file: matches.get_one::<PathBuf>("config").cloned(),
            verbose: matches.get_flag("verbose"),
        }
    }

    /// Load configuration: file, then environment, then command line
    fn load_config(&self) -> Result<Config> {
        let config_file = self
            .config_file
            .clone()
            .or_else(|| Config::default_path().filter(|path| path.exists()));

        let mut config = match &config_file {
            Some(path) => Config::from_file(path).map_err(|e| {
                WatomError::config(format!(
                    "Failed to load configuration file {}: {}\n\n\
                    You can validate it with: watom validate-config --config {}",
                    path.display(),
                    e,
                    path.display()
                ))
            })?,
            None => Config::new(),
        };

        let env_overrides: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("WATOM_"))
            .collect();
        config.apply_environment_overrides(&env_overrides)?;

        if let Some(page_url) = &self.page_url {
            config.page_url = Some(page_url.clone());
        }
        if let CliCommand::Edit {
            quiet_ms,
            allow_overlap,
            ..
        } = &self.command
        {
            if let Some(quiet_ms) = quiet_ms {
                config.autosave.quiet_period_ms = *quiet_ms;
            }
            if *allow_overlap {
                config.autosave.serialize_saves = false;
            }
        }

        if config.autosave.request_timeout_ms.is_none() {
            config.autosave.request_timeout_ms = Some(DEFAULT_REQUEST_TIMEOUT_MS);
        }

        Ok(config)
    }
}

fn init_logging(verbose: bool, config_level: &str) {
    let level = if verbose {
        Level::DEBUG
    } else {
        Level::from_str(config_level).unwrap_or(Level::INFO)
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(verbose)
        .with_line_number(verbose)
        .with_ansi(true)
        .init();
}

fn require_page_url(config: &Config) -> Result<&str> {
    config.page_url.as_deref().ok_or_else(|| {
        WatomError::config(
            "No page URL given.\n\n\
            Use --url <PAGE_URL> or set page_url in the configuration file",
        )
    })
}

/// Open the file as an edit page and attach a controller to it
fn open_page(
    file: &Path,
    baseline: Option<String>,
    config: &Config,
) -> Result<(FilePage, AutosaveController)> {
    let page_url = require_page_url(config)?;
    let submitter = Arc::new(HttpFormSubmitter::new(page_url)?);
    let transport = Arc::new(HttpTransport::new(page_url)?);

    let page = FilePage::open(
        file,
        baseline,
        config.selectors.clone(),
        &config.autosave.saving_class,
        submitter,
    )?;

    let controller = AutosaveController::bootstrap(&page, transport, config, None)?
        .ok_or_else(|| WatomError::dom("edit form not found on page"))?;

    Ok((page, controller))
}

/// Forward changes of `file` into a channel
///
/// The parent directory is watched so editors that save by rename are seen too.
fn watch_file(file: &Path) -> Result<(notify::RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let target = file.file_name().map(|name| name.to_os_string());

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_)
                ) && event
                    .paths
                    .iter()
                    .any(|path| path.file_name().map(|name| name.to_os_string()) == target);
                if relevant {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!("File watch error: {}", e),
        }
    })
    .map_err(|e| WatomError::file_system(format!("Failed to create file watcher: {}", e)))?;

    let parent = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    watcher
        .watch(&parent, RecursiveMode::NonRecursive)
        .map_err(|e| {
            WatomError::file_system(format!("Failed to watch {}: {}", parent.display(), e))
        })?;

    Ok((watcher, rx))
}

async fn run_edit(file: &Path, config: &Config) -> Result<()> {
    let (page, controller) = open_page(file, None, config)?;
    let (_watcher, mut changes) = watch_file(file)?;

    println!(
        "Autosaving {} to {} (quiet period {}ms). Press Ctrl+C to stop.",
        page.new_content().path().display(),
        require_page_url(config)?,
        config.autosave.quiet_period_ms
    );

    loop {
        tokio::select! {
            Some(()) = changes.recv() => {
                match page.new_content().refresh_from_disk() {
                    Ok(true) => debug!("Local edit detected"),
                    Ok(false) => {}
                    Err(e) => warn!("{}", e),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Drain the request on the wire, then flush what the quiet period held back
    let outcome = controller.shutdown_save().await;
    info!("Final save: {:?}", outcome);
    println!("Watom shutdown complete");

    Ok(())
}

async fn run_save(file: &Path, baseline: Option<&Path>, config: &Config) -> Result<()> {
    let baseline = match baseline {
        Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
            WatomError::file_system(format!("Failed to read baseline {}: {}", path.display(), e))
        })?),
        None => None,
    };

    let (page, controller) = open_page(file, baseline, config)?;
    if !controller.form().is_dirty() {
        debug!("{} matches its baseline", page.new_content().path().display());
    }

    match controller.manual_save().await? {
        SubmitOutcome::Saved { location } => {
            println!("Saved{}", location.map(|l| format!(" ({})", l)).unwrap_or_default());
        }
        SubmitOutcome::Conflicted { location } => {
            println!("Conflicted: the server kept its version, resolve at {}", location);
        }
    }

    Ok(())
}

fn validate_config(args: &Args) -> Result<()> {
    let config_file = args.config_file.as_ref().ok_or_else(|| {
        WatomError::config(
            "No configuration file specified.\n\n\
            Use: watom validate-config --config <file.json>",
        )
    })?;

    println!("Configuration file: {}", config_file.display());
    let config = Config::from_file(config_file)?;
    let result = config.validate_comprehensive();

    for warning in &result.warnings {
        println!("  warning: {}: {}", warning.field_path, warning.message);
    }
    for error in &result.errors {
        println!("  error: {}: {}", error.field_path, error.message);
        if let Some(fix) = &error.suggested_fix {
            println!("    fix: {}", fix);
        }
    }

    if !result.is_valid {
        return Err(WatomError::config(format!(
            "{} error(s) in {}",
            result.errors.len(),
            config_file.display()
        )));
    }

    println!("Page URL: {}", config.page_url.as_deref().unwrap_or("(not set)"));
    println!("Quiet period: {}ms", config.autosave.quiet_period_ms);
    println!("Serialized saves: {}", config.autosave.serialize_saves);
    println!("\nAll validations passed!");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if matches!(args.command, CliCommand::ValidateConfig) {
        init_logging(args.verbose, "info");
        if let Err(e) = validate_config(&args) {
            eprintln!("Configuration validation failed:\n{}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    init_logging(args.verbose, &config.log_level);

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration:\n{}", e);
        std::process::exit(1);
    }

    let result = match &args.command {
        CliCommand::Edit { file, .. } => run_edit(file, &config).await,
        CliCommand::Save { file, baseline } => run_save(file, baseline.as_deref(), &config).await,
        CliCommand::ValidateConfig => Ok(()),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}
