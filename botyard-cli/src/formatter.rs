// Output formatting utilities for CLI commands.
// Provides unified formatting for table, JSON and YAML output.

use anyhow::{Result, anyhow};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Parse output format from string (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            _ => Err(anyhow!(
                "Unknown format: '{}'. Valid formats: table, json, yaml",
                s
            )),
        }
    }
}

/// Format data as JSON string.
pub fn format_json<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data).map_err(|e| anyhow!("JSON serialization failed: {}", e))
}

/// Format data as YAML string.
pub fn format_yaml<T: Serialize>(data: &T) -> Result<String> {
    serde_yaml::to_string(data).map_err(|e| anyhow!("YAML serialization failed: {}", e))
}

/// Print data in the specified format to the provided writer.
///
/// `table_printer` is only called for [`OutputFormat::Table`].
pub fn print_output<T, W, F>(
    writer: &mut W,
    data: &T,
    format: OutputFormat,
    table_printer: F,
) -> Result<()>
where
    T: Serialize,
    W: std::io::Write,
    F: FnOnce(&mut W, &T) -> Result<()>,
{
    match format {
        OutputFormat::Table => table_printer(writer, data),
        OutputFormat::Json => {
            writeln!(writer, "{}", format_json(data)?)?;
            Ok(())
        }
        OutputFormat::Yaml => {
            write!(writer, "{}", format_yaml(data)?)?;
            Ok(())
        }
    }
}

/// Format time as `YYYY-MM-DD HH:MM:SS TZ` (e.g. `2026-01-22 15:04:05 UTC`).
pub fn format_time<T: chrono::TimeZone>(t: &chrono::DateTime<T>) -> String
where
    T::Offset: std::fmt::Display,
{
    t.format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

/// Runtime ids are 64 hex chars; tables show the first 12 like docker does.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

pub fn create_table<T: Tabled>(data: impl IntoIterator<Item = T>) -> Table {
    let mut table = Table::new(data);
    table.with(Style::sharp());
    table
}
