use anyhow::Context as _;
use clap::Parser;
use tracing::instrument;

use super::{Context, FilterArgs};

#[derive(Debug, Parser)]
pub struct Count {
    #[command(flatten)]
    filter: FilterArgs,
}

impl Count {
    #[instrument(skip(context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        let filter = self.filter.build()?;
        let count = context
            .pipeline
            .count(filter, context.config.scan_batch_size())
            .context("failed to count domains")?;
        println!("{count}");
        Ok(())
    }
}
