use std::path::Path;

use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::load_module,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct TypeEntry {
    token: String,
    kind: &'static str,
    name: String,
    fields: usize,
    methods: usize,
}

#[derive(Debug, Serialize)]
struct TypesOutput {
    types: Vec<TypeEntry>,
    count: usize,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let module = load_module(path)?;

    let types: Vec<TypeEntry> = module
        .all_types()
        .map(|ty| TypeEntry {
            token: ty.token.to_string(),
            kind: match (ty.is_interface(), ty.is_nested()) {
                (true, _) => "interface",
                (false, true) => "nested",
                (false, false) => "class",
            },
            name: module.type_full_name(ty),
            fields: ty.fields.len(),
            methods: ty.methods.len(),
        })
        .collect();
    let output = TypesOutput {
        count: types.len(),
        types,
    };

    print_output(&output, opts, |out| {
        let mut tw = TabWriter::new(&[
            ("Token", Align::Left),
            ("Kind", Align::Left),
            ("Name", Align::Left),
            ("Fields", Align::Right),
            ("Methods", Align::Right),
        ]);
        for e in &out.types {
            tw.row(vec![
                e.token.clone(),
                e.kind.to_string(),
                e.name.clone(),
                e.fields.to_string(),
                e.methods.to_string(),
            ]);
        }
        tw.print();
        println!("\n{} type(s) listed.", out.count);
    })
}
