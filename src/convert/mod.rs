//! CSV to JSON conversion
//!
//! Turns the input table into request payloads. Column names are renamed,
//! then split on the nesting delimiter into nested objects; values are typed
//! from explicit overrides or by inference; rows are grouped into chunks and
//! optionally wrapped in a user supplied JSON template.

mod csv;

pub use csv::{parse_csv, write_csv};

use crate::config::JsonMapping;
use crate::error::{Error, Result};
use crate::resolver::string_form;
use crate::types::{DataType, JsonObject};
use serde_json::{Number, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Placeholders replaced by the serialized payload in the data wrapper
const DATA_PLACEHOLDERS: [&str; 2] = ["[[data]]", "{{data}}"];

/// CSV to JSON payload converter
#[derive(Debug, Clone)]
pub struct JsonConverter {
    nesting_delimiter: String,
    /// Rows per payload, 0 puts every row into one array
    chunk_size: usize,
    infer_data_types: bool,
    column_data_types: HashMap<String, DataType>,
    column_names_override: HashMap<String, String>,
    data_wrapper: String,
}

impl JsonConverter {
    pub fn new(nesting_delimiter: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            nesting_delimiter: nesting_delimiter.into(),
            chunk_size,
            infer_data_types: false,
            column_data_types: HashMap::new(),
            column_names_override: HashMap::new(),
            data_wrapper: String::new(),
        }
    }

    /// Build from the writer's JSON mapping
    pub fn from_mapping(mapping: &JsonMapping) -> Self {
        let names = mapping
            .column_names_override
            .iter()
            .map(|(column, name)| (column.clone(), string_form(name)))
            .collect();

        Self::new(mapping.nesting_delimiter.clone(), mapping.chunk_size)
            .with_autodetect(mapping.column_data_types.autodetect)
            .with_data_types(mapping.column_data_types.overrides())
            .with_column_names(names)
            .with_wrapper(mapping.request_data_wrapper.clone())
    }

    /// Infer types of columns without an explicit type
    #[must_use]
    pub fn with_autodetect(mut self, enabled: bool) -> Self {
        self.infer_data_types = enabled;
        self
    }

    #[must_use]
    pub fn with_data_types(mut self, types: HashMap<String, DataType>) -> Self {
        self.column_data_types = types;
        self
    }

    #[must_use]
    pub fn with_column_names(mut self, names: HashMap<String, String>) -> Self {
        self.column_names_override = names;
        self
    }

    #[must_use]
    pub fn with_wrapper(mut self, wrapper: impl Into<String>) -> Self {
        self.data_wrapper = wrapper.into();
        self
    }

    /// Force one row per payload without a wrapper, as form encoding needs
    #[must_use]
    pub fn single_row(mut self) -> Self {
        self.chunk_size = 1;
        self.data_wrapper.clear();
        self
    }

    /// Convert CSV text into payloads
    pub fn convert(&self, text: &str) -> Result<Vec<Value>> {
        let records = parse_csv(text, ',')?;
        self.convert_records(&records)
    }

    /// Convert parsed records, the first being the header
    pub fn convert_records(&self, records: &[Vec<String>]) -> Result<Vec<Value>> {
        self.payloads(records).collect()
    }

    /// Payloads built one chunk at a time as the iterator is advanced
    pub fn payloads<'a>(&'a self, records: &'a [Vec<String>]) -> Payloads<'a> {
        let (columns, rows): (Vec<Column>, &[Vec<String>]) = match records.split_first() {
            Some((header, rows)) => (header.iter().map(|name| self.column(name)).collect(), rows),
            None => {
                warn!("The file is empty!");
                (Vec::new(), &[][..])
            }
        };
        let chunk_size = match self.chunk_size {
            0 => rows.len().max(1),
            size => size,
        };
        Payloads {
            converter: self,
            columns,
            rows,
            chunk_size,
            position: 0,
        }
    }

    fn column(&self, source: &str) -> Column {
        let name = self
            .column_names_override
            .get(source)
            .cloned()
            .unwrap_or_else(|| source.to_string());
        let data_type = self
            .column_data_types
            .get(&name)
            .or_else(|| self.column_data_types.get(source))
            .copied();
        let path = if self.nesting_delimiter.is_empty() {
            vec![name.clone()]
        } else {
            name.split(self.nesting_delimiter.as_str())
                .map(str::to_string)
                .collect()
        };
        Column {
            name,
            path,
            data_type,
        }
    }

    fn convert_row(&self, columns: &[Column], row: &[String], line: usize) -> Result<JsonObject> {
        if row.len() > columns.len() {
            return Err(Error::csv(format!(
                "row {line} has {} fields, the header has {}",
                row.len(),
                columns.len()
            )));
        }

        let mut object = JsonObject::new();
        for (index, column) in columns.iter().enumerate() {
            let raw = row.get(index).map_or("", String::as_str);
            let value = match column.data_type {
                Some(data_type) => typed_value(raw, data_type).map_err(|message| {
                    Error::csv(format!("row {line}, column '{}': {message}", column.name))
                })?,
                None if self.infer_data_types => infer_value(raw),
                None => Value::String(raw.to_string()),
            };
            insert_nested(&mut object, &column.path, value);
        }
        Ok(object)
    }

    fn wrap(&self, payload: Value) -> Result<Value> {
        if self.data_wrapper.is_empty() {
            return Ok(payload);
        }
        let data = serde_json::to_string(&payload)?;
        let wrapped = DATA_PLACEHOLDERS
            .iter()
            .fold(self.data_wrapper.clone(), |acc, placeholder| {
                acc.replace(placeholder, &data)
            });
        serde_json::from_str(&wrapped).map_err(|e| {
            Error::config(format!("request_data_wrapper is not valid JSON after substitution: {e}"))
        })
    }
}

/// Lazy sequence of payloads, see [`JsonConverter::payloads`]
#[derive(Debug)]
pub struct Payloads<'a> {
    converter: &'a JsonConverter,
    columns: Vec<Column>,
    rows: &'a [Vec<String>],
    chunk_size: usize,
    /// Index of the next row to convert
    position: usize,
}

impl Iterator for Payloads<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.rows.len() {
            return None;
        }
        let end = (self.position + self.chunk_size).min(self.rows.len());
        let first_line = self.position + 1;
        let chunk = &self.rows[self.position..end];
        self.position = end;

        let objects = chunk
            .iter()
            .enumerate()
            .map(|(index, row)| self.converter.convert_row(&self.columns, row, first_line + index))
            .collect::<Result<Vec<_>>>();
        let payload = match objects {
            Ok(mut objects) if self.converter.chunk_size == 1 => objects.pop().map(Value::Object),
            Ok(objects) => Some(Value::Array(objects.into_iter().map(Value::Object).collect())),
            Err(e) => {
                // a conversion error ends the sequence
                self.position = self.rows.len();
                return Some(Err(e));
            }
        };
        debug!("Converted rows {first_line}..={end} into a payload");
        payload.map(|p| self.converter.wrap(p))
    }
}

#[derive(Debug)]
struct Column {
    name: String,
    path: Vec<String>,
    data_type: Option<DataType>,
}

fn insert_nested(object: &mut JsonObject, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = object;
    for key in parents {
        let entry = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(JsonObject::new()));
        if !entry.is_object() {
            *entry = Value::Object(JsonObject::new());
        }
        let Value::Object(map) = entry else {
            return;
        };
        current = map;
    }
    current.insert(last.clone(), value);
}

/// Value of an explicitly typed column; empty cells become null except for strings
fn typed_value(raw: &str, data_type: DataType) -> std::result::Result<Value, String> {
    if raw.is_empty() && data_type != DataType::String {
        return Ok(Value::Null);
    }
    match data_type {
        DataType::String => Ok(Value::String(raw.to_string())),
        DataType::Number => {
            parse_number(raw.trim()).ok_or_else(|| format!("'{raw}' is not a number"))
        }
        DataType::Bool => parse_bool(raw.trim())
            .map(Value::Bool)
            .ok_or_else(|| format!("'{raw}' is not a boolean")),
        DataType::Object => {
            serde_json::from_str(raw).map_err(|e| format!("'{raw}' is not valid JSON: {e}"))
        }
    }
}

/// Numbers and `true`/`false` are typed, everything else stays a string
fn infer_value(raw: &str) -> Value {
    if let Some(number) = parse_number(raw) {
        return number;
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }
    // Rust accepts "inf" and "NaN", JSON cannot represent them
    if !raw.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
