use std::io::{self, BufRead};

use anyhow::Context as _;
use clap::Parser;
use tracing::instrument;

use super::{Context, confirm, terminal};

#[derive(Debug, Parser)]
pub struct DeleteAll {
    /// Skip the confirmation prompt
    #[arg(short, long, alias = "confirm")]
    yes: bool,
}

impl DeleteAll {
    #[instrument(skip(context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        self.run_with_input(context, io::stdin().lock())
    }

    fn run_with_input(self, context: &Context, input: impl BufRead) -> anyhow::Result<()> {
        use terminal::Colorize;

        let count = context
            .pipeline
            .count(None, context.config.scan_batch_size())
            .context("failed to count domains")?;
        if count == 0 {
            context.status("No domains to delete".dim());
            return Ok(());
        }

        if !self.yes {
            let prompt = format!("Delete all {count} domains from the {} store?", context.config.backend);
            if !confirm(&prompt.warning(), input)? {
                context.status("Cancelled");
                return Ok(());
            }
        }

        if context.pipeline.clear().context("failed to delete domains")? {
            context.status(format!("Deleted {count} domains").success());
        } else {
            context.status("No domains to delete".dim());
        }
        Ok(())
    }
}
