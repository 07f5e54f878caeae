use crate::table::TableStats;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "State")]
    pub label: String,
    #[tabled(rename = "Symbols")]
    pub value: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            label: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

/// Render per-state counts
pub fn stats_table(stats: &TableStats) -> String {
    let mut builder = TableBuilder::new();
    for (label, count) in stats.rows() {
        builder.add_row(label, &count.to_string());
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_table_lists_every_state() {
        let stats = TableStats { total: 3, lazy: 1, ready: 2, ..Default::default() };
        let rendered = stats_table(&stats);
        for label in ["Lazy", "Materializing", "Resolved", "Ready", "Failed", "Total"] {
            assert!(rendered.contains(label), "missing {}", label);
        }
    }

    #[test]
    fn test_empty_builder_renders_nothing() {
        assert!(TableBuilder::new().build().is_empty());
    }
}
