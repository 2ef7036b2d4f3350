//! User functions callable from configuration
//!
//! The set is a fixed allow-list. A function object such as
//! `{"function": "concat", "args": ["Basic ", {"attr": "#token"}]}` is
//! evaluated by the resolver once its arguments are known.

use super::string_form;
use crate::error::{Error, Result};
use base64::Engine;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use md5::{Digest, Md5};
use serde_json::Value;
use std::fmt::Write as _;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Functions available to configuration authors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFunction {
    Base64Encode,
    Concat,
    Md5Encode,
    StringToDate,
}

impl UserFunction {
    /// Every supported function, sorted by name
    pub const ALL: [UserFunction; 4] = [
        UserFunction::Base64Encode,
        UserFunction::Concat,
        UserFunction::Md5Encode,
        UserFunction::StringToDate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UserFunction::Base64Encode => "base64_encode",
            UserFunction::Concat => "concat",
            UserFunction::Md5Encode => "md5_encode",
            UserFunction::StringToDate => "string_to_date",
        }
    }

    /// Look up a function by its configuration name
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| Error::UnsupportedFunction {
                name: name.to_string(),
                supported: supported_functions(),
            })
    }

    /// Run the function on already evaluated arguments
    pub fn call(self, args: &[Value]) -> Result<Value> {
        let args = args
            .iter()
            .map(|arg| scalar_argument(self, arg))
            .collect::<Result<Vec<_>>>()?;

        let result = match self {
            UserFunction::Concat => args.concat(),
            UserFunction::Base64Encode => {
                let [s] = exact_args::<1>(self, &args)?;
                base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
            }
            UserFunction::Md5Encode => {
                let [s] = exact_args::<1>(self, &args)?;
                hex::encode(Md5::digest(s.as_bytes()))
            }
            UserFunction::StringToDate => match args.as_slice() {
                [date] => string_to_date(date, DEFAULT_DATE_FORMAT)?,
                [date, format] => string_to_date(date, format)?,
                _ => {
                    return Err(Error::function_argument(
                        self.name(),
                        format!("expected 1 or 2 arguments, got {}", args.len()),
                    ))
                }
            },
        };

        Ok(Value::String(result))
    }
}

/// Names of all supported functions
pub fn supported_functions() -> Vec<&'static str> {
    UserFunction::ALL.iter().map(|f| f.name()).collect()
}

/// Whether a function name is on the allow-list
pub fn is_supported(name: &str) -> bool {
    UserFunction::ALL.iter().any(|f| f.name() == name)
}

/// Execute a function by name with already evaluated arguments
pub fn execute(name: &str, args: &[Value]) -> Result<Value> {
    UserFunction::from_name(name)?.call(args)
}

fn scalar_argument(function: UserFunction, arg: &Value) -> Result<String> {
    match arg {
        Value::Object(_) | Value::Array(_) => Err(Error::function_argument(
            function.name(),
            format!("arguments must be scalar values, got {arg}"),
        )),
        other => Ok(string_form(other)),
    }
}

fn exact_args<const N: usize>(function: UserFunction, args: &[String]) -> Result<[&str; N]> {
    if args.len() != N {
        return Err(Error::function_argument(
            function.name(),
            format!("expected {N} argument(s), got {}", args.len()),
        ));
    }
    Ok(std::array::from_fn(|i| args[i].as_str()))
}

/// Parse a date expression and re-format it
fn string_to_date(date_string: &str, format: &str) -> Result<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(Error::function_argument(
            UserFunction::StringToDate.name(),
            format!("invalid date format '{format}'"),
        ));
    }

    let datetime = parse_date_expression(date_string, Utc::now()).ok_or_else(|| {
        Error::function_argument(
            UserFunction::StringToDate.name(),
            format!("unable to parse date '{date_string}'"),
        )
    })?;

    let mut out = String::new();
    write!(out, "{}", datetime.format_with_items(items.iter())).map_err(|_| {
        Error::function_argument(
            UserFunction::StringToDate.name(),
            format!("date format '{format}' does not apply to '{date_string}'"),
        )
    })?;
    Ok(out)
}

/// Parse an absolute or relative date expression
///
/// Absolute: `2021-01-31`, `2021-01-31 10:00:00`, `2021-01-31T10:00:00`, RFC 3339.
/// Relative: `now`, `today`, `yesterday`, `<n> <unit>[s] ago`.
pub(crate) fn parse_date_expression(input: &str, now: DateTime<Utc>) -> Option<NaiveDateTime> {
    let input = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }

    let now = now.naive_utc();
    let lowered = input.to_ascii_lowercase();
    match lowered.as_str() {
        "now" => return Some(now),
        "today" => return now.date().and_hms_opt(0, 0, 0),
        "yesterday" => return (now.date() - Duration::days(1)).and_hms_opt(0, 0, 0),
        _ => {}
    }

    let parts: Vec<&str> = lowered.split_whitespace().collect();
    let [amount, unit, "ago"] = parts.as_slice() else {
        return None;
    };
    let amount: u32 = amount.parse().ok()?;
    let unit = unit.trim_end_matches('s');
    match unit {
        "second" => Some(now - Duration::seconds(i64::from(amount))),
        "minute" => Some(now - Duration::minutes(i64::from(amount))),
        "hour" => Some(now - Duration::hours(i64::from(amount))),
        "day" => Some(now - Duration::days(i64::from(amount))),
        "week" => Some(now - Duration::weeks(i64::from(amount))),
        "month" => now.checked_sub_months(Months::new(amount)),
        "year" => now.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        _ => None,
    }
}
