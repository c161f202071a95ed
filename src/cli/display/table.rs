use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::style;

/// Borderless list table with upper-cased headers.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)));
    table
}

/// Render the table under a "N entities:" line.
pub fn render_list(entity_name: &str, table: &Table, total: usize) -> String {
    if total == 0 {
        return format!("No {entity_name}s found.");
    }
    let noun = if total == 1 { entity_name.to_string() } else { format!("{entity_name}s") };
    format!("{} {}:\n{}", style(total).bold(), noun, table)
}
