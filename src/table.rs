use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::domain::Hit;
use crate::error::DerepError;

/// Organism, Scaffold, Start, End, Score, plus at least one query column.
pub const MIN_COLUMNS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRow {
    pub row: usize,
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub header: Option<String>,
    pub hits: Vec<Hit>,
    pub malformed: Vec<MalformedRow>,
    pub total_rows: usize,
}

/// Parser for the upstream tool's "binary" hit table. The format is nominally
/// comma separated, but space-padded exports with mixed tabs exist in the
/// wild, so delimiter runs are collapsed before splitting.
pub struct TableParser {
    whitespace: Regex,
}

impl TableParser {
    pub fn new() -> Self {
        Self {
            whitespace: Regex::new(r"[ \t]+").unwrap(),
        }
    }

    pub fn parse_file(&self, path: &Path) -> Result<ParsedTable, DerepError> {
        if !path.is_file() {
            return Err(DerepError::InputNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|err| {
            DerepError::Filesystem(format!("read {}: {err}", path.display()))
        })?;
        let table = self.parse_str(&content);
        if table.hits.is_empty() && table.malformed.is_empty() {
            return Err(DerepError::MalformedTable(format!(
                "{} contains no data rows",
                path.display()
            )));
        }
        Ok(table)
    }

    pub fn parse_str(&self, content: &str) -> ParsedTable {
        let mut hits = Vec::new();
        let mut malformed = Vec::new();
        let mut header = None;
        let mut total_rows = 0usize;

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let fields = self.split_row(line);
            if total_rows == 0 && header.is_none() && looks_like_header(&fields) {
                header = Some(line.to_string());
                continue;
            }
            let row = total_rows;
            total_rows += 1;
            match parse_fields(row, &fields, line) {
                Ok(hit) => hits.push(hit),
                Err(reason) => {
                    warn!(row, reason = %reason, "skipping malformed row");
                    malformed.push(MalformedRow {
                        row,
                        line: line.to_string(),
                        reason,
                    });
                }
            }
        }

        ParsedTable {
            header,
            hits,
            malformed,
            total_rows,
        }
    }

    fn split_row(&self, line: &str) -> Vec<String> {
        let trimmed = line.trim();
        if trimmed.contains(',') {
            trimmed.split(',').map(|field| field.trim().to_string()).collect()
        } else {
            self.whitespace
                .split(trimmed)
                .map(|field| field.to_string())
                .collect()
        }
    }
}

impl Default for TableParser {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_header(fields: &[String]) -> bool {
    fields
        .iter()
        .any(|field| field.eq_ignore_ascii_case("scaffold"))
}

fn parse_fields(row: usize, fields: &[String], line: &str) -> Result<Hit, String> {
    if fields.len() < MIN_COLUMNS {
        return Err(format!(
            "expected at least {MIN_COLUMNS} columns, got {}",
            fields.len()
        ));
    }
    let start = fields[2]
        .parse::<u64>()
        .map_err(|_| format!("non-numeric start coordinate: {}", fields[2]))?;
    let end = fields[3]
        .parse::<u64>()
        .map_err(|_| format!("non-numeric end coordinate: {}", fields[3]))?;
    let score = fields[4]
        .parse::<f64>()
        .map_err(|_| format!("non-numeric score: {}", fields[4]))?;
    Ok(Hit {
        row,
        organism: fields[0].clone(),
        scaffold: fields[1].clone(),
        start,
        end,
        score,
        extra: fields[5..].to_vec(),
        raw: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMA_TABLE: &str = "\
Organism,Scaffold,Start,End,Score,Query1
Escherichia coli K-12,NC_000913.3,100,900,1.0,2
Salmonella enterica,NZ_CP014051.1,50,700,0.9,1
";

    #[test]
    fn parse_comma_table() {
        let parser = TableParser::new();
        let table = parser.parse_str(COMMA_TABLE);
        assert!(table.header.is_some());
        assert_eq!(table.hits.len(), 2);
        assert_eq!(table.hits[0].scaffold, "NC_000913.3");
        assert_eq!(table.hits[0].start, 100);
        assert_eq!(table.hits[1].extra, vec!["1".to_string()]);
    }

    #[test]
    fn parse_whitespace_table_collapses_runs() {
        let parser = TableParser::new();
        let table = parser.parse_str(
            "Ecoli\tNC_000913.3   100\t\t900  1.0   2\nSenterica  NZ_CP014051.1 50 700 0.9 1\n",
        );
        assert_eq!(table.hits.len(), 2);
        assert_eq!(table.hits[0].scaffold, "NC_000913.3");
        assert_eq!(table.hits[1].score, 0.9);
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let parser = TableParser::new();
        let table = parser.parse_str(
            "Ecoli,NC_000913.3,100,900,1.0,2\nonly,three,fields\nEcoli,NC_000913.4,abc,900,1.0,2\nSent,NZ_CP014051.1,50,700,0.9,1\n",
        );
        assert_eq!(table.hits.len(), 2);
        assert_eq!(table.malformed.len(), 2);
        assert_eq!(table.total_rows, 4);
        assert!(table.malformed[0].reason.contains("columns"));
        assert!(table.malformed[1].reason.contains("start"));
        // Row indices of surviving hits are stable.
        assert_eq!(table.hits[0].row, 0);
        assert_eq!(table.hits[1].row, 3);
    }

    #[test]
    fn raw_line_is_preserved_verbatim() {
        let parser = TableParser::new();
        let line = "Ecoli,NC_000913.3,100,900,1.0,2,extra,columns";
        let table = parser.parse_str(line);
        assert_eq!(table.hits[0].raw, line);
        assert_eq!(
            table.hits[0].extra,
            vec!["2".to_string(), "extra".to_string(), "columns".to_string()]
        );
    }
}
