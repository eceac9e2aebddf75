use std::{
    io::{self, BufRead},
    num::NonZeroUsize,
    path::PathBuf,
    time::Instant,
};

use anyhow::Context as _;
use bountycatch::{IngestSummary, export};
use clap::Parser;
use tracing::instrument;

use super::{Context, Format, open_input, terminal};

// Spinner updates are throttled to one per this many lines.
const PROGRESS_INTERVAL: u64 = 10_000;

#[derive(Debug, Parser)]
pub struct Add {
    /// Read domains from this file ('-' or omitted for standard input)
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Store every non-blank line, valid domain or not
    #[arg(long)]
    no_validate: bool,

    /// Input format; json reads a document written by `export --format json`
    #[arg(long, value_enum, default_value_t)]
    format: Format,

    /// Domains written per batch [default: ingest_batch_size from the config]
    #[arg(long, value_name = "N")]
    batch_size: Option<NonZeroUsize>,
}

impl Add {
    #[instrument(skip(context))]
    pub fn run(self, context: &Context) -> anyhow::Result<()> {
        use terminal::Colorize;

        let started = Instant::now();
        let validate = !self.no_validate;
        let batch_size = self
            .batch_size
            .unwrap_or_else(|| context.config.ingest_batch_size());
        let input = open_input(self.file.as_deref())?;

        let (summary, read_error) = match self.format {
            Format::Text => Self::ingest_text(context, input, validate, batch_size),
            Format::Json => {
                let document =
                    export::read_json(input).context("failed to read the export document")?;
                let summary = context
                    .pipeline
                    .ingest_lines(&document.domains, validate, batch_size);
                (summary, None)
            }
        };

        context.status(format!(
            "{} {} new, {} duplicates ({:.2}%), {} invalid in {:.1}s",
            format!("Processed {} domains:", summary.total).success(),
            summary.inserted,
            summary.duplicates(),
            summary.duplicate_percentage(),
            summary.invalid,
            started.elapsed().as_secs_f64()
        ));

        if let Some(error) = read_error {
            context.status(
                format!("Input stopped after {} domains; those were stored", summary.total).error(),
            );
            return Err(error).context("failed to read input");
        }
        if summary.failed > 0 {
            context.status(
                format!("{} domains were not written; see the log for details", summary.failed)
                    .error(),
            );
            anyhow::bail!("{} domains could not be written to the store", summary.failed);
        }
        Ok(())
    }

    /// Ingests every line up to the end of the input or the first read
    /// error. Domains read before an error are still written.
    fn ingest_text(
        context: &Context,
        input: impl BufRead,
        validate: bool,
        batch_size: NonZeroUsize,
    ) -> (IngestSummary, Option<io::Error>) {
        let spinner = terminal::spinner("Reading domains", context.silent);
        let mut ingest = context.pipeline.ingest(validate, batch_size);
        let mut read_error = None;

        for line in input.lines() {
            match line {
                Ok(line) => ingest.push(&line),
                Err(error) => {
                    tracing::warn!("Stopped reading input: {error}");
                    read_error = Some(error);
                    break;
                }
            }
            let total = ingest.progress().total;
            if total % PROGRESS_INTERVAL == 0 && total > 0 {
                spinner.set_message(format!("Read {total} domains"));
            }
        }

        spinner.set_message("Writing final batch");
        let summary = ingest.finish();
        spinner.finish_and_clear();
        (summary, read_error)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bountycatch::{Config, DomainStore, storage::MemoryStore};
    use tempfile::NamedTempFile;

    use super::*;

    fn add_file(file: &NamedTempFile, format: Format, no_validate: bool) -> Add {
        Add {
            file: Some(file.path().to_path_buf()),
            no_validate,
            format,
            batch_size: NonZeroUsize::new(2),
        }
    }

    #[test]
    fn adds_valid_domains_from_a_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a.com\n\n*.b.com\nnot valid\na.com").unwrap();
        let config = Config::default();
        let store = MemoryStore::new();

        add_file(&file, Format::Text, false)
            .run(&Context::new(&config, &store, true))
            .expect("add command should succeed");

        let stored = store.all().unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.contains("*.b.com"));
    }

    #[test]
    fn no_validate_keeps_invalid_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid").unwrap();
        let config = Config::default();
        let store = MemoryStore::new();

        add_file(&file, Format::Text, true)
            .run(&Context::new(&config, &store, true))
            .unwrap();

        assert!(store.all().unwrap().contains("not valid"));
    }

    #[test]
    fn json_input_must_be_an_export_document() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a.com").unwrap();
        let config = Config::default();
        let store = MemoryStore::new();

        let result = add_file(&file, Format::Json, false).run(&Context::new(&config, &store, true));

        assert!(result.is_err());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn domains_before_a_read_error_are_stored() {
        let config = Config::default();
        let store = MemoryStore::new();
        let context = Context::new(&config, &store, true);

        let input: &[u8] = b"a.com\nb.com\n\xff\xfe\nc.com\n";
        let (summary, read_error) =
            Add::ingest_text(&context, input, true, NonZeroUsize::new(10).unwrap());

        assert_eq!(read_error.unwrap().kind(), io::ErrorKind::InvalidData);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.inserted, 2);
        let stored = store.all().unwrap();
        assert!(stored.contains("a.com") && stored.contains("b.com"));
    }

    #[test]
    fn a_read_error_fails_the_command_after_storing() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"a.com\n\xff\nc.com\n").unwrap();
        let config = Config::default();
        let store = MemoryStore::new();

        let result = add_file(&file, Format::Text, false).run(&Context::new(&config, &store, true));

        assert!(result.is_err());
        assert_eq!(store.all().unwrap().into_iter().collect::<Vec<_>>(), ["a.com"]);
    }
}
