use std::path::{Path, PathBuf};

use anyhow::Context;
use cilpatch::{
    metadata::AssemblyResolver,
    patching::{PatchEnvironment, PatchReport, PatcherConfig, PatcherRegistry},
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_module},
    output::{Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct PassEntry {
    pass: &'static str,
    #[serde(flatten)]
    report: PatchReport,
}

#[derive(Debug, Serialize)]
struct PatchOutput {
    module: String,
    output: String,
    passes: Vec<PassEntry>,
    total: PatchReport,
}

pub struct PatchOptions<'a> {
    pub references: &'a [PathBuf],
    pub target_file: Option<&'a Path>,
    pub out: Option<&'a Path>,
    pub cache_dir: Option<&'a Path>,
    pub no_cache: bool,
    pub dump: bool,
    pub global: &'a GlobalOptions,
}

fn build_config(opts: &PatchOptions) -> PatcherConfig {
    let config = PatcherConfig::new()
        .with_patch_cache(!opts.no_cache)
        .with_write_patched_modules(opts.dump);
    match opts.cache_dir {
        Some(dir) => config.with_cache_dir(dir),
        None => config,
    }
}

pub fn run(path: &Path, opts: &PatchOptions) -> anyhow::Result<()> {
    let mut module = load_module(path)?;

    let mut resolver = AssemblyResolver::new();
    for reference in opts.references {
        resolver
            .add_file(reference)
            .with_context(|| format!("failed to load reference: {}", reference.display()))?;
    }

    let config = build_config(opts);
    if opts.dump && config.cache_dir().is_none() {
        eprintln!("--dump has no effect without --cache-dir");
    }
    let env = match opts.target_file {
        Some(target) => PatchEnvironment::new(&config, &resolver).with_target_path(target),
        None => PatchEnvironment::new(&config, &resolver),
    };

    let registry = PatcherRegistry::standard();
    let reports = registry
        .patch(&mut module, &env)
        .with_context(|| format!("patching failed: {}", path.display()))?;

    let output_path = opts.out.unwrap_or(path);
    module
        .save(output_path)
        .with_context(|| format!("failed to write output: {}", output_path.display()))?;

    let mut total = PatchReport::default();
    for (_, report) in &reports {
        total += *report;
    }
    let output = PatchOutput {
        module: module.file_name(),
        output: output_path.display().to_string(),
        passes: reports
            .into_iter()
            .map(|(pass, report)| PassEntry { pass, report })
            .collect(),
        total,
    };

    if opts.global.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if output.passes.is_empty() {
        eprintln!("No passes registered for {}", output.module);
        return Ok(());
    }

    let mut tw = TabWriter::new(&[
        ("Pass", Align::Left),
        ("Methods", Align::Right),
        ("Replaced", Align::Right),
        ("Missed", Align::Right),
        ("Failed", Align::Right),
        ("Cached", Align::Left),
        ("Time", Align::Right),
    ]);
    let rows = output.passes.iter().map(|entry| (entry.pass, &entry.report));
    for (pass, report) in rows.chain(std::iter::once(("Total", &output.total))) {
        tw.row(vec![
            pass.to_string(),
            report.methods_patched.to_string(),
            report.replaced.to_string(),
            report.missed.to_string(),
            report.failed_methods.to_string(),
            if report.from_cache { "yes" } else { "no" }.to_string(),
            format!("{} ms", report.elapsed_ms),
        ]);
    }
    tw.print();
    eprintln!(
        "\nPatched {} -> {}",
        file_display_name(path),
        file_display_name(output_path)
    );
    Ok(())
}
