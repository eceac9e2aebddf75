use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

mod add;
mod count;
mod delete_all;
mod export;
mod print;
mod remove;
mod terminal;

use add::Add;
use anyhow::Context as _;
use bountycatch::{Backend, Config, DomainStore, Filter, Pipeline, storage};
use clap::{ArgAction, ValueEnum};
use count::Count;
use delete_all::DeleteAll;
use export::Export;
use print::Print;
use remove::Remove;
use tracing::subscriber::DefaultGuard;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress logging and status messages
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    silent: bool,

    /// Configuration file to use instead of the default search path
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Storage backend, overriding the configuration
    #[arg(short, long, value_name = "BACKEND", global = true)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let _logging = Self::setup_logging(self.verbose, self.silent);

        let config = self.load_config()?;
        let store = storage::open(&config)
            .with_context(|| format!("failed to open the {} store", config.backend))?;
        let context = Context::new(&config, store.as_ref(), self.silent);

        self.command.run(&context)
    }

    /// Installs a subscriber for the duration of the returned guard.
    fn setup_logging(verbosity: u8, silent: bool) -> DefaultGuard {
        use tracing::level_filters::LevelFilter;
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match (silent, verbosity) {
            (true, _) => LevelFilter::OFF,
            (false, 0) => LevelFilter::WARN,
            (false, 1) => LevelFilter::INFO,
            (false, 2) => LevelFilter::DEBUG,
            (false, _) => LevelFilter::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        // stdout carries command output, so logs go to stderr.
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .set_default()
    }

    /// Reads the config file, then environment overrides, then `--backend`.
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::discover(self.config.as_deref())
            .context("failed to load configuration")?;
        config
            .apply_env(|name| std::env::var(name).ok())
            .context("invalid environment override")?;
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        tracing::debug!("Using the {} backend", config.backend);
        Ok(config)
    }
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Add domains from a file or standard input
    ///
    /// Lines are trimmed, blank lines skipped, and invalid domains counted
    /// and skipped unless --no-validate is given. Domains already stored
    /// are ignored.
    Add(Add),

    /// Print stored domains to standard output
    Print(Print),

    /// Count stored domains
    Count(Count),

    /// Export stored domains as text or JSON
    Export(Export),

    /// Remove a domain, a list of domains, or every domain matching a
    /// filter
    Remove(Remove),

    /// Delete every stored domain
    DeleteAll(DeleteAll),
}

impl Command {
    fn run(self, context: &Context) -> anyhow::Result<()> {
        match self {
            Self::Add(command) => command.run(context)?,
            Self::Print(command) => command.run(context)?,
            Self::Count(command) => command.run(context)?,
            Self::Export(command) => command.run(context)?,
            Self::Remove(command) => command.run(context)?,
            Self::DeleteAll(command) => command.run(context)?,
        }
        Ok(())
    }
}

/// What a command runs against.
pub struct Context<'a> {
    config: &'a Config,
    pipeline: Pipeline<'a>,
    silent: bool,
}

impl<'a> Context<'a> {
    pub const fn new(config: &'a Config, store: &'a dyn DomainStore, silent: bool) -> Self {
        Self {
            config,
            pipeline: Pipeline::new(store),
            silent,
        }
    }

    /// Prints a status line to stderr unless `--silent` was given.
    fn status(&self, message: impl fmt::Display) {
        if !self.silent {
            eprintln!("{message}");
        }
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("backend", &self.config.backend)
            .field("silent", &self.silent)
            .finish_non_exhaustive()
    }
}

/// Substring or regex selection shared by several commands.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct FilterArgs {
    /// Only domains containing this text
    #[arg(long = "match", value_name = "TEXT", conflicts_with = "regex")]
    contains: Option<String>,

    /// Only domains matching this regular expression
    #[arg(long, value_name = "REGEX")]
    regex: Option<String>,
}

impl FilterArgs {
    /// Compiles the filter, so a bad pattern fails before any domains are
    /// read.
    fn build(&self) -> anyhow::Result<Option<Filter>> {
        Ok(Filter::from_flags(
            self.contains.as_deref(),
            self.regex.as_deref(),
        )?)
    }
}

/// Text or JSON, for import and export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One domain per line
    #[default]
    Text,
    /// An export document with a count and timestamp
    Json,
}

/// Opens `path` for reading, or standard input when it is absent or `-`.
fn open_input(path: Option<&Path>) -> anyhow::Result<Box<dyn BufRead>> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(io::stdin().lock())),
    }
}

/// Asks a yes/no question on stderr and reads the answer from `input`.
///
/// Only `y` or `yes` (any case) count as agreement.
fn confirm(prompt: &str, mut input: impl BufRead) -> io::Result<bool> {
    eprint!("{prompt} (y/N) ");
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(is_affirmative(&line))
}

fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}
