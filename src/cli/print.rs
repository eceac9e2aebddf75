use std::io::{self, BufWriter, Write};

use anyhow::Context as _;
use bountycatch::export;
use clap::Parser;
use tracing::instrument;

use super::{Context, FilterArgs, terminal};

#[derive(Debug, Parser)]
pub struct Print {
    #[command(flatten)]
    filter: FilterArgs,

    /// Sort the output (loads every domain into memory)
    #[arg(long)]
    sort: bool,
}

impl Print {
    #[instrument(skip(context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        self.run_with_output(context, BufWriter::new(io::stdout().lock()))
    }

    /// A closed `out` ends the command early without an error.
    fn run_with_output(self, context: &Context, out: impl Write) -> anyhow::Result<()> {
        use terminal::Colorize;

        let filter = self.filter.build()?;
        let domains = context
            .pipeline
            .stream(filter, self.sort, context.config.scan_batch_size())
            .context("failed to read domains")?;

        match export::write_text(out, domains) {
            Ok(0) => {
                context.status("No domains found".dim());
                Ok(())
            }
            Ok(printed) => {
                tracing::debug!("Printed {printed} domains");
                Ok(())
            }
            Err(error) if error.is_broken_pipe() => {
                tracing::debug!("Output closed early");
                Ok(())
            }
            Err(error) => Err(error).context("failed to print domains"),
        }
    }
}
