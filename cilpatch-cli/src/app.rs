use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cilpatch - static CIL rewriting of .NET assemblies
#[derive(Debug, Parser)]
#[command(name = "cilpatch", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the standard passes registered for a module.
    Patch {
        /// Path to the module (JSON).
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Helper module providing replacement members (repeatable).
        #[arg(short, long = "reference", value_name = "FILE")]
        references: Vec<PathBuf>,

        /// Assembly the module was read from; enables the patch cache.
        #[arg(long, value_name = "DLL")]
        target_file: Option<PathBuf>,

        /// Output file (default: overwrite the input).
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,

        /// Directory for patch caches and dumped modules.
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,

        /// Always scan the whole module.
        #[arg(long)]
        no_cache: bool,

        /// Also write the patched module into the cache directory.
        #[arg(long)]
        dump: bool,
    },

    /// List every type of a module, nested types included.
    Types {
        /// Path to the module (JSON).
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Show the contents of a patch cache file.
    Cache {
        /// Path to the cache file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Fingerprint to validate against (default: the one recorded in the file).
        #[arg(long)]
        fingerprint: Option<String>,
    },

    /// List the target assemblies and passes of the standard registry.
    Passes,
}
