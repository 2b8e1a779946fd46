use std::path::Path;

use anyhow::Context;
use cilpatch::patching::PatchCache;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct CacheEntry {
    type_name: String,
    method: String,
}

#[derive(Debug, Serialize)]
struct CacheOutput {
    fingerprint: String,
    valid: bool,
    entries: Vec<CacheEntry>,
}

/// The fingerprint recorded on the `X` line of a cache file.
fn recorded_fingerprint(text: &str) -> Option<&str> {
    text.lines().next()?.strip_prefix("X ")
}

pub fn run(path: &Path, fingerprint: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read cache: {}", path.display()))?;
    let fingerprint = fingerprint
        .or_else(|| recorded_fingerprint(&text))
        .with_context(|| format!("no fingerprint recorded in {}", path.display()))?;

    let cache = PatchCache::from_text(&text, &path.display().to_string(), fingerprint)?;
    let output = CacheOutput {
        fingerprint: fingerprint.to_string(),
        valid: cache.is_some(),
        entries: cache
            .iter()
            .flat_map(PatchCache::iter)
            .map(|(type_name, method)| CacheEntry {
                type_name: type_name.to_string(),
                method: method.to_string(),
            })
            .collect(),
    };

    print_output(&output, opts, |out| {
        println!("Fingerprint: {}", out.fingerprint);
        if !out.valid {
            println!("Cache is stale or unreadable, a full scan will run.");
            return;
        }
        let mut tw = TabWriter::new(&[("Type", Align::Left), ("Method", Align::Left)]);
        for e in &out.entries {
            tw.row(vec![e.type_name.clone(), e.method.clone()]);
        }
        tw.print();
        println!("\n{} method(s) recorded.", out.entries.len());
    })
}
