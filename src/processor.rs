use std::fs::File;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, error, info};
use thiserror::Error;

use crate::encoding::{LineReader, LineWriter, detect_encoding};
use crate::mappings::Mapping;
use crate::substitute::Substituter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStats {
    pub lines: usize,
    pub changed: usize,
    pub encoding: &'static str,
}

#[derive(Debug, Error)]
enum ProcessError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Streams `input` into `output`, substituting every line. Failures are logged
/// and end the run early; whatever was already written stays in place.
pub fn process_file(input: &Path, output: &Path, mapping: &Mapping) -> Option<ProcessStats> {
    match run(input, output, mapping) {
        Ok(stats) => {
            info!(
                "Successfully processed file: {} and saved to: {}",
                input.display(),
                output.display()
            );
            debug!(
                "{} line(s) read as {}, {} changed",
                stats.lines, stats.encoding, stats.changed
            );
            Some(stats)
        }
        Err(err @ ProcessError::InputNotFound(_)) => {
            error!("{err}");
            None
        }
        Err(ProcessError::Failed(err)) => {
            error!("Error processing file: {err:#}");
            None
        }
    }
}

fn run(input: &Path, output: &Path, mapping: &Mapping) -> Result<ProcessStats, ProcessError> {
    let decision = detect_encoding(input);

    let source = match File::open(input) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ProcessError::InputNotFound(input.to_path_buf()));
        }
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context(format!("opening {}", input.display()))
                .into());
        }
    };
    let sink =
        File::create(output).with_context(|| format!("creating {}", output.display()))?;

    let substituter = Substituter::new(mapping);
    let mut writer = LineWriter::new(BufWriter::new(sink), &decision)?;
    let mut stats = ProcessStats {
        lines: 0,
        changed: 0,
        encoding: decision.label(),
    };

    for line in LineReader::new(source, &decision) {
        let line = line.with_context(|| format!("reading {}", input.display()))?;
        let (replaced, terminator) = substituter.apply_line(&line);
        if replaced != &line[..line.len() - terminator.len()] {
            stats.changed += 1;
        }
        for text in [&*replaced, terminator] {
            writer
                .write_text(text)
                .with_context(|| format!("writing {}", output.display()))?;
        }
        stats.lines += 1;
    }
    writer
        .finish()
        .with_context(|| format!("writing {}", output.display()))?;

    Ok(stats)
}
