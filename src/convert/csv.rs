//! Minimal RFC 4180 reader and writer

use crate::error::{Error, Result};

/// Parse CSV text into records
///
/// Quoted fields may contain the delimiter, doubled quotes and line breaks.
/// Blank lines between records are skipped.
pub fn parse_csv(text: &str, delimiter: char) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                field_started = true;
            }
            c if c == delimiter => {
                record.push(std::mem::take(&mut field));
                field_started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if field_started || !field.is_empty() || !record.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                field_started = false;
            }
            c => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(Error::csv(format!(
            "unterminated quoted field in record {}",
            records.len() + 1
        )));
    }
    if field_started || !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

/// Write records as CSV, quoting fields only where needed
pub fn write_csv(records: &[Vec<String>], delimiter: char) -> String {
    let mut out = String::new();
    for record in records {
        let line: Vec<String> = record.iter().map(|f| quote_field(f, delimiter)).collect();
        out.push_str(&line.join(&delimiter.to_string()));
        out.push_str("\r\n");
    }
    out
}

fn quote_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains(['"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rec(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_simple() {
        let records = parse_csv("id,name\n1,Ann\n2,Bob\n", ',').unwrap();
        assert_eq!(
            records,
            vec![rec(&["id", "name"]), rec(&["1", "Ann"]), rec(&["2", "Bob"])]
        );
    }

    #[test]
    fn test_parse_quoted_fields() {
        let records =
            parse_csv("a,b\r\n\"x, y\",\"say \"\"hi\"\"\"\r\n\"multi\nline\",\r\n", ',').unwrap();
        assert_eq!(
            records,
            vec![
                rec(&["a", "b"]),
                rec(&["x, y", "say \"hi\""]),
                rec(&["multi\nline", ""])
            ]
        );
    }

    #[test]
    fn test_parse_skips_blank_lines_and_bom() {
        let records = parse_csv("\u{feff}a\n\n1\n", ',').unwrap();
        assert_eq!(records, vec![rec(&["a"]), rec(&["1"])]);
    }

    #[test]
    fn test_parse_empty_quoted_field_kept() {
        let records = parse_csv("a\n\"\"\n", ',').unwrap();
        assert_eq!(records, vec![rec(&["a"]), rec(&[""])]);
    }

    #[test]
    fn test_parse_unterminated_quote() {
        let err = parse_csv("a\n\"open", ',').unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_write_quotes_when_needed() {
        let text = write_csv(&[rec(&["a", "b"]), rec(&["x,y", "q\"t"])], ',');
        assert_eq!(text, "a,b\r\n\"x,y\",\"q\"\"t\"\r\n");
        assert_eq!(
            parse_csv(&text, ',').unwrap(),
            vec![rec(&["a", "b"]), rec(&["x,y", "q\"t"])]
        );
    }
}
