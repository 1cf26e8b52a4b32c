//! The `proctor kinds` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use proctor_core::kinds::all_specs;

pub fn execute() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Kind", "Answer shape", "Description"]);
    for spec in all_specs() {
        table.add_row(vec![
            Cell::new(spec.kind),
            Cell::new(spec.shape.as_str()),
            Cell::new(spec.description),
        ]);
    }
    println!("{table}");
    Ok(())
}
