//! Output formatting utilities.

use meshvec_core::{CollectionId, HistoryEntry, Metadata};
use meshvec_vector::Neighbor;
use serde_json::json;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::error::Result;
use crate::OutputFormat;

/// A property/value row for a single stored vector.
#[derive(Tabled)]
pub struct VectorRow {
    #[tabled(rename = "Property")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// One query result.
#[derive(Tabled)]
pub struct NeighborRow {
    #[tabled(rename = "Handle")]
    pub handle: u64,
    #[tabled(rename = "Distance")]
    pub distance: String,
    #[tabled(rename = "Id")]
    pub id: String,
}

impl From<&Neighbor> for NeighborRow {
    fn from(n: &Neighbor) -> Self {
        Self {
            handle: n.handle.as_u64(),
            distance: format!("{:.6}", n.distance),
            id: n.external_id.clone().unwrap_or_else(|| "-".to_owned()),
        }
    }
}

/// One history entry.
#[derive(Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "Timestamp")]
    pub timestamp: String,
    #[tabled(rename = "Action")]
    pub action: String,
    #[tabled(rename = "Fingerprint")]
    pub fingerprint: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

impl From<&HistoryEntry> for HistoryRow {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            timestamp: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            action: entry.action.to_string(),
            fingerprint: entry.fingerprint.map_or_else(|| "-".to_owned(), |fp| fp.to_hex()[..16].to_owned()),
            detail: entry.detail.clone(),
        }
    }
}

/// Format the id of a newly created collection.
pub fn format_created(id: CollectionId, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(id.to_string()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({ "id": id }))?),
    }
}

/// Format a stored vector with its metadata.
pub fn format_vector(
    external_id: &str,
    vector: &[f32],
    metadata: Option<&Metadata>,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Table => {
            let components: Vec<String> = vector.iter().map(f32::to_string).collect();
            let rows = vec![
                VectorRow { key: "id".to_owned(), value: external_id.to_owned() },
                VectorRow { key: "dimension".to_owned(), value: vector.len().to_string() },
                VectorRow { key: "vector".to_owned(), value: format!("[{}]", components.join(", ")) },
                VectorRow {
                    key: "metadata".to_owned(),
                    value: metadata.map_or_else(|| "(none)".to_owned(), describe_metadata),
                },
            ];
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            Ok(table.to_string())
        }
        OutputFormat::Json => {
            let metadata = metadata.map(|m| m.as_text().map_or_else(|| json!(m.as_bytes()), |t| json!(t)));
            Ok(serde_json::to_string_pretty(&json!({
                "id": external_id,
                "vector": vector,
                "metadata": metadata,
            }))?)
        }
    }
}

/// Format query results as `(handle, distance)` rows.
pub fn format_neighbors(neighbors: &[Neighbor], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => {
            if neighbors.is_empty() {
                return Ok("(0 results)".to_owned());
            }
            let mut table = Table::new(neighbors.iter().map(NeighborRow::from));
            table.with(Style::rounded());
            Ok(format!("{table}\n({} results)", neighbors.len()))
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(neighbors)?),
    }
}

/// Format history entries, oldest first.
pub fn format_history(entries: &[HistoryEntry], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                return Ok("(no history)".to_owned());
            }
            let mut table = Table::new(entries.iter().map(HistoryRow::from));
            table.with(Style::rounded());
            Ok(format!("{table}\n({} entries)", entries.len()))
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
    }
}

fn describe_metadata(meta: &Metadata) -> String {
    match meta.as_text() {
        Some(text) => text.to_owned(),
        None => format!("<{} bytes>", meta.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshvec_core::{Action, Fingerprint, VectorHandle};

    #[test]
    fn test_vector_table_shows_text_metadata() {
        let meta = Metadata::from_stored(b"colour=blue".to_vec());
        let out = format_vector("a", &[1.0, 0.5], Some(&meta), OutputFormat::Table).expect("format");
        assert!(out.contains("Property"));
        assert!(out.contains("[1, 0.5]"));
        assert!(out.contains("colour=blue"));
        assert!(out.contains('╭'), "rounded table border");
    }

    #[test]
    fn test_binary_metadata_is_summarised() {
        let meta = Metadata::from_stored(vec![0xff, 0xfe, 0x00]);
        let out = format_vector("a", &[1.0], Some(&meta), OutputFormat::Table).expect("format");
        assert!(out.contains("<3 bytes>"));

        let out = format_vector("a", &[1.0], None, OutputFormat::Table).expect("format");
        assert!(out.contains("(none)"));
    }

    #[test]
    fn test_neighbors_table() {
        let rows = vec![
            Neighbor { handle: VectorHandle::new(0), distance: 0.0, external_id: Some("a".into()) },
            Neighbor { handle: VectorHandle::new(2), distance: 2.0, external_id: None },
        ];
        let out = format_neighbors(&rows, OutputFormat::Table).expect("format");
        assert!(out.contains("Handle"));
        assert!(out.contains("Distance"));
        assert!(out.contains("2.000000"));
        assert!(out.contains('╭'), "rounded table border");
        assert!(out.ends_with("(2 results)"));
        assert_eq!(format_neighbors(&[], OutputFormat::Table).expect("format"), "(0 results)");
    }

    #[test]
    fn test_neighbors_json_is_an_array() {
        let rows = vec![Neighbor { handle: VectorHandle::new(1), distance: 0.25, external_id: None }];
        let out = format_neighbors(&rows, OutputFormat::Json).expect("format");
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_history_table_has_one_row_per_entry() {
        let entries = vec![
            HistoryEntry::now(Action::Add, Some(Fingerprint::from_bytes([7; 32])), "3 dims"),
            HistoryEntry::now(Action::Delete, None, "removed"),
        ];
        let out = format_history(&entries, OutputFormat::Table).expect("format");
        assert!(out.contains("Fingerprint"));
        assert!(out.contains("0707070707070707"));
        assert!(out.contains("removed"));
        assert!(out.ends_with("(2 entries)"));
        assert_eq!(format_history(&[], OutputFormat::Table).expect("format"), "(no history)");
    }
}
