//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Source-file inclusion preprocessor: resolves include/insert directives into one output
#[derive(Parser, Debug)]
#[command(name = "sniff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub debug: u8,

    /// Project directory (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    /// Config file replacing the project's .sniff.toml
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by every command that resolves a root file.
#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Root source file(s), relative to the project directory
    #[arg(required = true, num_args = 1.., value_hint = ValueHint::FilePath)]
    pub roots: Vec<PathBuf>,

    /// Source root relative to the project directory
    #[arg(long)]
    pub source_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve root files and print the concatenated output
    Build {
        #[command(flatten)]
        resolve: ResolveArgs,

        /// Write output to a file instead of stdout
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Mirror each processed file below this directory
        #[arg(long, value_hint = ValueHint::DirPath)]
        copy_dest: Option<PathBuf>,

        /// Keep surrounding whitespace of each file
        #[arg(long)]
        no_trim: bool,

        /// Keep the leading "use strict" pragma of each file
        #[arg(long)]
        keep_pragma: bool,
    },

    /// Show the dependency tree
    Tree {
        #[command(flatten)]
        resolve: ResolveArgs,

        /// Append a summary (file count, depth)
        #[arg(long)]
        resume: bool,
    },

    /// List resolved files in output order (inserted files excluded)
    Files {
        #[command(flatten)]
        resolve: ResolveArgs,

        /// Use forward slashes
        #[arg(long)]
        url: bool,

        /// Prefix every path with this directory
        #[arg(long, default_value = "")]
        dir: String,

        /// Write list to a file instead of stdout
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },

    /// Print HTML script tags for the resolved files
    Scripts {
        #[command(flatten)]
        resolve: ResolveArgs,

        /// Prefix every src with this directory
        #[arg(long, default_value = "")]
        dir: String,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print a commented config template
    Template,

    /// Show config paths
    Path,
}
