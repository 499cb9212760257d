//! Structured documents the deep-copy engine can walk.

use std::fmt;

use csv::{ReaderBuilder, WriterBuilder};
use serde_json::Value;
use thiserror::Error;

/// Failure to read or write a structured document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Table(#[from] csv::Error),
    #[error("table is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Json,
    Tsv,
    Csv,
}

impl DocumentFormat {
    /// Format for a (lowercase, dotless) file extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "json" => Some(Self::Json),
            "tsv" => Some(Self::Tsv),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Tsv => "tsv",
            Self::Csv => "csv",
        }
    }

    fn delimiter(&self) -> Option<u8> {
        match self {
            Self::Json => None,
            Self::Tsv => Some(b'\t'),
            Self::Csv => Some(b','),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A JSON value tree or a table of string cells.
///
/// Tables honor double-quote quoting on both read and write, so a quoted
/// cell holding the delimiter stays one cell. Blank lines are not rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Json(Value),
    Table { format: DocumentFormat, rows: Vec<Vec<String>> },
}

impl Document {
    /// Parse `text` in `format`.
    ///
    /// # Arguments
    /// - `text`: Full document contents.
    /// - `format`: Declared format, usually taken from the file extension.
    ///
    /// # Returns
    /// The parsed document, or the JSON/table error that stopped parsing.
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self, DocumentError> {
        let Some(delimiter) = format.delimiter() else {
            return Ok(Document::Json(serde_json::from_str(text)?));
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let rows = reader
            .records()
            .map(|record| record.map(|record| record.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Ok(Document::Table { format, rows })
    }

    pub fn format(&self) -> DocumentFormat {
        match self {
            Document::Json(_) => DocumentFormat::Json,
            Document::Table { format, .. } => *format,
        }
    }

    /// Serialize back to text; JSON is pretty-printed, tables quote only where needed.
    pub fn render(&self) -> Result<String, DocumentError> {
        match self {
            Document::Json(value) => {
                let mut text = serde_json::to_string_pretty(value)?;
                text.push('\n');
                Ok(text)
            }
            Document::Table { format, rows } => {
                let mut writer = WriterBuilder::new()
                    .delimiter(format.delimiter().unwrap_or(b'\t'))
                    .flexible(true)
                    .from_writer(Vec::new());
                for row in rows {
                    writer.write_record(row)?;
                }
                let bytes = writer.into_inner().map_err(|error| csv::Error::from(error.into_error()))?;
                Ok(String::from_utf8(bytes)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rows(document: &Document) -> &[Vec<String>] {
        let Document::Table { rows, .. } = document else {
            panic!("expected table");
        };
        rows
    }

    #[test]
    fn tables_keep_ragged_rows() {
        let text = "a\tgs://b/x.json\nc\td\te\n";
        let document = Document::parse(text, DocumentFormat::Tsv).unwrap();
        let rows = rows(&document);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ["a", "gs://b/x.json"]);
        assert_eq!(rows[1].len(), 3);
        assert_eq!(document.render().unwrap(), text);
    }

    #[test]
    fn quoted_cells_stay_whole() {
        let document = Document::parse("id,path\n1,\"gs://bucket/r.fq\"\n\"a,b\",x\n", DocumentFormat::Csv).unwrap();
        assert_eq!(document.format(), DocumentFormat::Csv);
        let rows = rows(&document);
        assert_eq!(rows[1], ["1", "gs://bucket/r.fq"]);
        assert_eq!(rows[2], ["a,b", "x"]);
        assert_eq!(document.render().unwrap(), "id,path\n1,gs://bucket/r.fq\n\"a,b\",x\n");
    }

    #[test]
    fn json_round_trips_through_pretty_rendering() {
        let document = Document::parse(r#"{"a": [1, "x"]}"#, DocumentFormat::Json).unwrap();
        assert_eq!(document, Document::Json(json!({"a": [1, "x"]})));
        assert!(document.render().unwrap().ends_with("}\n"));
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(Document::parse("{not json", DocumentFormat::Json).is_err());
    }

    #[test]
    fn formats_come_from_extensions() {
        assert_eq!(DocumentFormat::from_extension("tsv"), Some(DocumentFormat::Tsv));
        assert_eq!(DocumentFormat::from_extension("bam"), None);
    }
}
