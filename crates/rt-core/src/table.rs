//! CSV tokenizing and fuzzy header lookup for timing exports.

use csv::{ReaderBuilder, Trim};

/// How many leading records may be title/preamble rows before the header.
const HEADER_SCAN_ROWS: usize = 10;

/// Minimum candidate length for substring header matches.
const MIN_CONTAINS_LEN: usize = 3;

/// A tokenized CSV document.
#[derive(Debug, Clone, Default)]
pub struct Table {
    records: Vec<Vec<String>>,
}

impl Table {
    /// Tokenize a CSV document. Blank records are dropped, rows may be ragged.
    pub fn parse(text: &str) -> Result<Self, csv::Error> {
        let text = text.trim_start_matches('\u{feff}');
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            records.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { records })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Locate the header row and return it with the data rows below it.
    ///
    /// The header is the first of the leading rows in which every group of
    /// `required` candidates resolves to a column. Returns the name of the
    /// first unresolved group when no row qualifies.
    pub fn with_header(
        &self,
        required: &[(&'static str, &[&str])],
    ) -> Result<(HeaderIndex, &[Vec<String>]), &'static str> {
        let mut first_missing = required.first().map_or("header", |(name, _)| *name);

        for (idx, record) in self.records.iter().take(HEADER_SCAN_ROWS).enumerate() {
            let header = HeaderIndex::new(record);
            match required
                .iter()
                .find(|(_, candidates)| header.find(candidates).is_none())
            {
                None => return Ok((header, &self.records[idx + 1..])),
                Some((name, _)) if idx == 0 => first_missing = *name,
                Some(_) => {}
            }
        }
        Err(first_missing)
    }
}

/// Normalized header names for fuzzy column lookup.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    normalized: Vec<String>,
}

impl HeaderIndex {
    pub fn new(headers: &[String]) -> Self {
        Self {
            normalized: headers.iter().map(|h| normalize(h)).collect(),
        }
    }

    /// Find the column for the first matching candidate.
    ///
    /// Exact normalized matches win over substring matches; within each
    /// pass candidates are tried in order.
    pub fn find(&self, candidates: &[&str]) -> Option<usize> {
        let candidates: Vec<String> = candidates.iter().map(|c| normalize(c)).collect();

        for candidate in &candidates {
            if let Some(idx) = self.normalized.iter().position(|h| h == candidate) {
                return Some(idx);
            }
        }

        candidates
            .iter()
            .filter(|c| c.len() >= MIN_CONTAINS_LEN)
            .find_map(|candidate| self.normalized.iter().position(|h| h.contains(candidate.as_str())))
    }
}

/// Read a field by optional column index, empty when absent.
pub fn field(row: &[String], column: Option<usize>) -> &str {
    column
        .and_then(|idx| row.get(idx))
        .map_or("", String::as_str)
}

/// Parse the leading integer of a field (`"12"`, `"P3"` → 3, `"5."`).
pub fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .trim()
        .trim_start_matches(['P', 'p'])
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn normalize(header: &str) -> String {
    header
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_quoted_fields_and_ragged_rows() {
        let table = Table::parse("\u{feff}No,Name\r\n7,\"Smith, J.\"\n\n12\n").unwrap();
        let (header, rows) = table.with_header(&[("number", &["no"])]).unwrap();
        assert_eq!(header.find(&["name"]), Some(1));
        assert_eq!(rows.len(), 2);
        assert_eq!(field(&rows[0], Some(1)), "Smith, J.");
        assert_eq!(field(&rows[1], Some(1)), "");
    }

    #[test]
    fn skips_title_preamble() {
        let text = "Race Results,,\nSebring 12 Hours,,\nPos,No.,Class\n1,7,GTP\n";
        let table = Table::parse(text).unwrap();
        let (header, rows) = table
            .with_header(&[("position", &["pos"]), ("number", &["no"])])
            .unwrap();
        assert_eq!(header.find(&["class"]), Some(2));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn reports_missing_required_column() {
        let table = Table::parse("Pos,Name\n1,A\n").unwrap();
        let err = table
            .with_header(&[("position", &["pos"]), ("number", &["no", "number"])])
            .unwrap_err();
        assert_eq!(err, "number");
    }

    #[test]
    fn exact_match_beats_substring() {
        let header = HeaderIndex::new(&["Class Pos".to_string(), "Pos".to_string()]);
        assert_eq!(header.find(&["pos"]), Some(1));

        let header = HeaderIndex::new(&["Lap Time".to_string(), "Lap".to_string()]);
        assert_eq!(header.find(&["lap"]), Some(1));
        assert_eq!(header.find(&["laptime"]), Some(0));
    }

    #[test]
    fn substring_match_as_fallback() {
        let header = HeaderIndex::new(&["Best Lap Time (s)".to_string()]);
        assert_eq!(header.find(&["laptime"]), Some(0));
        assert_eq!(header.find(&["no"]), None);
    }

    #[test]
    fn leading_numbers() {
        assert_eq!(leading_number("12"), Some(12));
        assert_eq!(leading_number("P3"), Some(3));
        assert_eq!(leading_number("5."), Some(5));
        assert_eq!(leading_number("DNF"), None);
    }
}
