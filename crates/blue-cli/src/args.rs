//! Command-line argument definitions for the Blue CLI.
//!
//! This module defines the [`Args`] structure parsed from the command line
//! using [`clap`]. Each subcommand takes one input: a file path, an
//! `http(s)://` URL, a `sha256:` content reference, or `-` for stdin.

use clap::{Parser, Subcommand};

use blue::Format;

/// Command-line arguments for the Blue type resolver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve imports and print the linked types
    Resolve(ResolveArgs),

    /// Parse a document and print its syntax tree
    Parse(ParseArgs),

    /// Print the content hash of a document
    Hash {
        #[arg(help = "Path, URL, or content reference of the document")]
        input: String,
    },
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    #[arg(help = "Path, URL, or content reference of the root document")]
    pub input: String,

    /// Output format (json, yaml)
    #[arg(short, long, default_value = "json")]
    pub format: Format,

    /// Write the output to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Reject fields not declared by a base type
    #[arg(long)]
    pub closed: bool,

    /// Allow types that refer to themselves
    #[arg(long)]
    pub allow_recursive: bool,
}

#[derive(clap::Args, Debug)]
pub struct ParseArgs {
    #[arg(help = "Path, URL, or content reference of the document")]
    pub input: String,

    /// Output format (json, yaml)
    #[arg(short, long, default_value = "json")]
    pub format: Format,

    /// Write the output to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_arguments() {
        let args = Args::try_parse_from([
            "blue",
            "resolve",
            "main.yaml",
            "--format",
            "yaml",
            "--closed",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.log_level, "debug");
        match args.command {
            Command::Resolve(resolve) => {
                assert_eq!(resolve.input, "main.yaml");
                assert_eq!(resolve.format, Format::Yaml);
                assert!(resolve.closed);
                assert!(!resolve.allow_recursive);
                assert!(resolve.output.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let args = Args::try_parse_from(["blue", "hash", "a.yaml", "-c", "blue.toml"]).unwrap();
        assert_eq!(args.config.as_deref(), Some("blue.toml"));
        assert_eq!(args.log_level, "warn");
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(Args::try_parse_from(["blue", "parse", "a.yaml", "-f", "toml"]).is_err());
    }
}
