use comfy_table::{presets::NOTHING, Attribute, Cell, ContentArrangement, Table};

/// Create a table with the standard CLI styling (no borders, no wrapping)
pub fn styled_table() -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Disabled);
    table
}

/// Truncate text to `max_chars` characters, ending with an ellipsis when cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}

/// Apply padding to all columns (call after setting headers)
pub fn apply_column_padding(table: &mut Table, padding: (u16, u16)) {
    for i in 0..table.column_count() {
        if let Some(col) = table.column_mut(i) {
            col.set_padding(padding);
        }
    }
}

/// Create a header cell with dim + bold styling
pub fn header(text: &str) -> Cell {
    Cell::new(text)
        .add_attribute(Attribute::Bold)
        .add_attribute(Attribute::Dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate("mnist", 10), "mnist");
        assert_eq!(truncate("", 3), "");
    }

    #[test]
    fn long_text_ends_with_ellipsis() {
        assert_eq!(truncate("2024-05-01T12:00:00", 10), "2024-05-0…");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate("ééééé", 3), "éé…");
    }
}
