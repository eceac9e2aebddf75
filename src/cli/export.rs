use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::Context as _;
use bountycatch::export;
use clap::Parser;
use tracing::instrument;

use super::{Context, FilterArgs, Format, terminal};

#[derive(Debug, Parser)]
pub struct Export {
    /// Write to this file instead of standard output
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: Format,

    #[command(flatten)]
    filter: FilterArgs,

    /// Sort the output (loads every domain into memory)
    #[arg(long)]
    sort: bool,
}

impl Export {
    #[instrument(skip(context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        use terminal::Colorize;

        let filter = self.filter.build()?;
        let domains = context
            .pipeline
            .stream(filter, self.sort, context.config.scan_batch_size())
            .context("failed to read domains")?;

        let out: Box<dyn Write> = match &self.file {
            Some(path) => Box::new(
                File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?,
            ),
            None => Box::new(io::stdout().lock()),
        };
        let out = BufWriter::new(out);

        let exported = match self.format {
            Format::Text => export::write_text(out, domains),
            Format::Json => export::write_json(out, domains),
        }
        .context("failed to export domains")?;

        let destination = self
            .file
            .as_ref()
            .map_or_else(|| "standard output".to_string(), |path| path.display().to_string());
        context.status(format!("Exported {exported} domains to {destination}").success());
        Ok(())
    }
}
