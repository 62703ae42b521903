use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueHint};
use log::error;

mod encoding;
mod logging;
mod mappings;
mod processor;
mod substitute;

use logging::LogLevel;
use mappings::load_mappings;

/// Replaces specific location names with broader geographical categories.
#[derive(Debug, Parser)]
#[command(name = "locgen", version)]
struct Cli {
    /// Path to the input file.
    #[arg(value_name = "INPUT_FILE", value_hint = ValueHint::FilePath)]
    input_file: PathBuf,
    /// Path to the output file.
    #[arg(value_name = "OUTPUT_FILE", value_hint = ValueHint::FilePath)]
    output_file: PathBuf,
    /// Custom location mappings (JSON object of regex → replacement; .yaml/.yml read as YAML).
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    mappings: Option<PathBuf>,
    /// Set the logging level.
    #[arg(long = "log_level", value_name = "LEVEL", value_enum, default_value = "INFO")]
    log_level: LogLevel,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level);
    run(cli)
}

fn run(cli: Cli) -> ExitCode {
    if !cli.input_file.is_file() {
        error!("Input file does not exist: {}", cli.input_file.display());
        return ExitCode::FAILURE;
    }

    let mapping = load_mappings(cli.mappings.as_deref());
    // Processing failures are logged by the processor and do not change the exit status.
    let _ = processor::process_file(&cli.input_file, &cli.output_file, &mapping);
    ExitCode::SUCCESS
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn positional_paths_and_defaults() {
        let cli = Cli::try_parse_from(["locgen", "in.txt", "out.txt"]).expect("parses");
        assert_eq!(cli.input_file, PathBuf::from("in.txt"));
        assert_eq!(cli.output_file, PathBuf::from("out.txt"));
        assert!(cli.mappings.is_none());
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn mappings_and_log_level_flags() {
        let cli = Cli::try_parse_from([
            "locgen",
            "in.txt",
            "out.txt",
            "--mappings",
            "custom.json",
            "--log_level",
            "WARNING",
        ])
        .expect("parses");
        assert_eq!(cli.mappings, Some(PathBuf::from("custom.json")));
        assert_eq!(cli.log_level, LogLevel::Warning);
    }

    #[test]
    fn log_level_names_are_case_sensitive() {
        assert!(Cli::try_parse_from(["locgen", "a", "b", "--log_level", "debug"]).is_err());
        assert!(Cli::try_parse_from(["locgen", "a", "b", "--log_level", "TRACE"]).is_err());
    }

    #[test]
    fn output_path_is_required() {
        assert!(Cli::try_parse_from(["locgen", "in.txt"]).is_err());
    }
}
