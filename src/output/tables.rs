use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};
use serde_json::Value;

use mqm_bridge::types::{
    FieldMetadata, JobConfiguration, ListItem, PagedList, Pipeline, Release, Taxonomy,
    TestResultStatus,
};

use super::styling::{paint, Tone};

/// Values that can be shown as a terminal table.
pub trait TableView {
    fn to_table(&self) -> Table;

    fn render_table(&self) -> String {
        self.to_table().to_string()
    }
}

/// One table row per value.
pub trait TableRow {
    fn header() -> Vec<&'static str>;
    fn row(&self) -> Vec<Cell>;
}

pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn rows_table<'a, T: TableRow + 'a>(items: impl IntoIterator<Item = &'a T>) -> Table {
    let mut table = create_table();
    table.set_header(T::header());
    for item in items {
        table.add_row(item.row());
    }
    table
}

fn optional_cell<T: ToString>(value: Option<T>) -> Cell {
    value.map_or_else(|| Cell::new("-").fg(TableColor::DarkGrey), |v| Cell::new(v.to_string()))
}

fn flag_cell(value: bool) -> Cell {
    if value {
        Cell::new("yes").fg(TableColor::Green)
    } else {
        Cell::new("no")
    }
}

pub fn status_cell(status: &str) -> Cell {
    match status.to_ascii_lowercase().as_str() {
        "success" => Cell::new(status).fg(TableColor::Green),
        "warning" => Cell::new(status).fg(TableColor::Yellow),
        "failed" => Cell::new(status).fg(TableColor::Red),
        _ => Cell::new(status).fg(TableColor::Cyan),
    }
}

impl TableRow for Release {
    fn header() -> Vec<&'static str> {
        vec!["ID", "Name"]
    }

    fn row(&self) -> Vec<Cell> {
        vec![Cell::new(self.id), Cell::new(&self.name)]
    }
}

impl TableRow for ListItem {
    fn header() -> Vec<&'static str> {
        vec!["ID", "Name"]
    }

    fn row(&self) -> Vec<Cell> {
        vec![Cell::new(self.id), Cell::new(&self.name)]
    }
}

impl TableRow for Taxonomy {
    fn header() -> Vec<&'static str> {
        vec!["ID", "Name", "Category"]
    }

    fn row(&self) -> Vec<Cell> {
        vec![
            optional_cell(self.id),
            optional_cell(self.name.as_deref()),
            optional_cell(self.parent.as_deref().and_then(|p| p.name.as_deref())),
        ]
    }
}

impl TableRow for FieldMetadata {
    fn header() -> Vec<&'static str> {
        vec!["ID", "Name", "Logical name", "Open list", "Multi value"]
    }

    fn row(&self) -> Vec<Cell> {
        vec![
            Cell::new(self.id),
            Cell::new(&self.name),
            Cell::new(&self.logical_name),
            flag_cell(self.open_list),
            flag_cell(self.multi_value),
        ]
    }
}

impl TableRow for Pipeline {
    fn header() -> Vec<&'static str> {
        vec!["ID", "Name", "Root", "Workspace", "Release", "Taxonomies", "Fields"]
    }

    fn row(&self) -> Vec<Cell> {
        vec![
            Cell::new(self.id),
            Cell::new(&self.name),
            flag_cell(self.root),
            Cell::new(self.workspace_id),
            optional_cell(self.release_id),
            Cell::new(self.taxonomies.len()),
            Cell::new(self.fields.len()),
        ]
    }
}

impl<T: TableRow> TableView for PagedList<T> {
    fn to_table(&self) -> Table {
        rows_table(&self.items)
    }

    fn render_table(&self) -> String {
        let footer = if self.items.is_empty() {
            format!("0 of {}", self.total_count)
        } else {
            format!(
                "{}-{} of {}",
                self.offset + 1,
                self.offset + self.items.len(),
                self.total_count
            )
        };
        format!("{}\n{}", self.to_table(), paint(footer, Tone::Muted))
    }
}

impl<T: TableRow> TableView for Vec<T> {
    fn to_table(&self) -> Table {
        rows_table(self)
    }
}

impl TableView for Pipeline {
    fn to_table(&self) -> Table {
        rows_table(std::iter::once(self))
    }
}

impl TableView for JobConfiguration {
    fn to_table(&self) -> Table {
        rows_table(&self.pipelines)
    }
}

impl TableView for TestResultStatus {
    fn to_table(&self) -> Table {
        let mut table = create_table();
        table.set_header(vec!["Status", "Until"]);
        table.add_row(vec![
            status_cell(&self.status),
            optional_cell(self.until.map(|until| until.to_rfc3339())),
        ]);
        table
    }
}

/// Objects become key/value rows; anything else a single cell.
impl TableView for Value {
    fn to_table(&self) -> Table {
        let mut table = create_table();
        match self {
            Value::Object(map) => {
                table.set_header(vec!["Key", "Value"]);
                for (key, value) in map {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    table.add_row(vec![Cell::new(key), Cell::new(text)]);
                }
            }
            other => {
                table.add_row(vec![Cell::new(other.to_string())]);
            }
        }
        table
    }
}
