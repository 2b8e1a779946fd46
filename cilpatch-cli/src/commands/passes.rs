use cilpatch::patching::PatcherRegistry;
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct PassEntry {
    assembly: String,
    order: usize,
    pass: &'static str,
    description: &'static str,
}

pub fn run(opts: &GlobalOptions) -> anyhow::Result<()> {
    let registry = PatcherRegistry::standard();
    let mut entries = Vec::new();
    for assembly in registry.target_assemblies() {
        for (order, patcher) in registry.patchers_for(assembly).iter().enumerate() {
            entries.push(PassEntry {
                assembly: assembly.to_string(),
                order: order + 1,
                pass: patcher.name(),
                description: patcher.description(),
            });
        }
    }

    print_output(&entries, opts, |entries| {
        let mut tw = TabWriter::new(&[
            ("Assembly", Align::Left),
            ("#", Align::Right),
            ("Pass", Align::Left),
            ("Description", Align::Left),
        ]);
        for e in entries {
            tw.row(vec![
                e.assembly.clone(),
                e.order.to_string(),
                e.pass.to_string(),
                e.description.to_string(),
            ]);
        }
        tw.print();
    })
}
