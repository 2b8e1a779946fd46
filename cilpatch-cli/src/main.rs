mod app;
mod commands;
mod output;

use anyhow::Context;
use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    // Show cilpatch info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("cilpatch", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Patch {
            path,
            references,
            target_file,
            out,
            cache_dir,
            no_cache,
            dump,
        } => commands::patch::run(
            path,
            &commands::patch::PatchOptions {
                references,
                target_file: target_file.as_deref(),
                out: out.as_deref(),
                cache_dir: cache_dir.as_deref(),
                no_cache: *no_cache,
                dump: *dump,
                global: &cli.global,
            },
        ),
        Command::Types { path } => commands::types::run(path, &cli.global),
        Command::Cache { path, fingerprint } => {
            commands::cache::run(path, fingerprint.as_deref(), &cli.global)
        }
        Command::Passes => commands::passes::run(&cli.global),
    }
}
