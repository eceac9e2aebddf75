use std::{io::BufRead, path::PathBuf};

use anyhow::Context as _;
use clap::Parser;
use tracing::instrument;

use super::{Context, FilterArgs, open_input, terminal};

#[derive(Debug, Parser)]
pub struct Remove {
    /// A single domain to remove
    #[arg(short, long, value_name = "DOMAIN", conflicts_with_all = ["file", "contains", "regex"])]
    domain: Option<String>,

    /// A file listing domains to remove, one per line ('-' for standard
    /// input)
    #[arg(short, long, value_name = "PATH", conflicts_with_all = ["contains", "regex"])]
    file: Option<PathBuf>,

    /// Remove every domain matching a filter
    #[command(flatten)]
    filter: FilterArgs,
}

impl Remove {
    #[instrument(skip(context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        use terminal::Colorize;

        if let Some(domain) = &self.domain {
            let domain = domain.trim();
            if !context.pipeline.remove_one(domain).context("failed to remove domain")? {
                anyhow::bail!("{domain} is not stored");
            }
            context.status(format!("Removed {domain}").success());
            return Ok(());
        }

        if let Some(path) = &self.file {
            let lines = open_input(Some(path.as_path()))?
                .lines()
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read the removal list")?;
            let summary = context
                .pipeline
                .remove_lines(&lines, context.config.remove_batch_size())
                .context("failed to remove domains")?;
            if summary.total > 0 && summary.removed == 0 {
                anyhow::bail!("none of the {} listed domains are stored", summary.total);
            }
            context.status(
                format!("Removed {} of {} listed domains", summary.removed, summary.total).success(),
            );
            return Ok(());
        }

        if let Some(filter) = self.filter.build()? {
            let removed = context
                .pipeline
                .remove_by_filter(filter, context.config.scan_batch_size())
                .context("failed to remove domains")?;
            if removed == 0 {
                anyhow::bail!("no stored domains match the filter");
            }
            context.status(format!("Removed {removed} matching domains").success());
            return Ok(());
        }

        context.status("Pass --domain, --file, --match or --regex to choose what to remove".dim());
        anyhow::bail!("nothing to remove");
    }
}
