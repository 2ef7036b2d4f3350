//! Placeholder recognition
//!
//! Configuration trees are plain JSON. A handful of object shapes carry
//! meaning for the resolver:
//!
//! | Shape                                   | Placeholder         |
//! |-----------------------------------------|---------------------|
//! | `{"attr": "name"}`                      | user parameter      |
//! | `{"function": "concat", "args": [...]}` | function call       |
//! | `{"time": "currentStart"}`              | time macro          |
//! | `{"response": "data.token"}`            | login response path |
//!
//! Anything else is a literal.

use serde_json::Value;

const ATTR_KEY: &str = "attr";
const FUNCTION_KEY: &str = "function";
const ARGS_KEY: &str = "args";
const TIME_KEY: &str = "time";
const RESPONSE_KEY: &str = "response";

/// Variants of the time macro
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMacro {
    CurrentStart,
    PreviousStart,
}

impl TimeMacro {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "currentStart" => Some(Self::CurrentStart),
            "previousStart" => Some(Self::PreviousStart),
            _ => None,
        }
    }
}

/// A node of a configuration tree, classified by shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placeholder<'a> {
    /// Any value that carries no placeholder meaning
    Literal(&'a Value),
    /// Reference to a user parameter
    AttrRef(&'a str),
    /// Call into the function registry
    FunctionCall { name: &'a str, args: &'a [Value] },
    /// Current time marker
    Time(TimeMacro),
    /// Dotted path into the login response body
    Response(&'a str),
}

impl<'a> Placeholder<'a> {
    /// Classify a value
    pub fn parse(value: &'a Value) -> Self {
        let Value::Object(map) = value else {
            return Placeholder::Literal(value);
        };

        if let Some(Value::String(name)) = map.get(FUNCTION_KEY) {
            let args = match map.get(ARGS_KEY) {
                Some(Value::Array(args)) => args.as_slice(),
                _ => &[][..],
            };
            return Placeholder::FunctionCall { name, args };
        }

        if map.len() != 1 {
            return Placeholder::Literal(value);
        }

        match map.iter().next() {
            Some((key, Value::String(s))) if key == ATTR_KEY => Placeholder::AttrRef(s),
            Some((key, Value::String(s))) if key == RESPONSE_KEY => Placeholder::Response(s),
            Some((key, Value::String(s))) if key == TIME_KEY => match TimeMacro::from_name(s) {
                Some(time) => Placeholder::Time(time),
                None => Placeholder::Literal(value),
            },
            _ => Placeholder::Literal(value),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Placeholder::FunctionCall { .. })
    }
}

/// Collect every attribute reference remaining in a tree, in order of first
/// appearance and without duplicates
pub fn remaining_attr_refs(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_attr_refs(value, &mut found);
    found
}

fn collect_attr_refs(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Placeholder::AttrRef(name) = Placeholder::parse(value) {
                if !found.iter().any(|f| f == name) {
                    found.push(name.to_string());
                }
                return;
            }
            for v in map.values() {
                collect_attr_refs(v, found);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_attr_refs(v, found);
            }
        }
        _ => {}
    }
}

/// Collect every response path referenced in a tree
pub fn response_paths(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_response_paths(value, &mut found);
    found
}

fn collect_response_paths(value: &Value, found: &mut Vec<String>) {
    if let Placeholder::Response(path) = Placeholder::parse(value) {
        found.push(path.to_string());
        return;
    }
    match value {
        Value::Object(map) => map.values().for_each(|v| collect_response_paths(v, found)),
        Value::Array(items) => items.iter().for_each(|v| collect_response_paths(v, found)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_shapes() {
        let attr_ref = json!({"attr": "token"});
        assert_eq!(Placeholder::parse(&attr_ref), Placeholder::AttrRef("token"));

        let call = json!({"function": "concat", "args": ["a", "b"]});
        match Placeholder::parse(&call) {
            Placeholder::FunctionCall { name, args } => {
                assert_eq!(name, "concat");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }

        let time = json!({"time": "previousStart"});
        assert_eq!(
            Placeholder::parse(&time),
            Placeholder::Time(TimeMacro::PreviousStart)
        );

        let response = json!({"response": "data.token"});
        assert_eq!(
            Placeholder::parse(&response),
            Placeholder::Response("data.token")
        );
    }

    #[test]
    fn test_parse_literals() {
        for value in [
            json!("plain"),
            json!(42),
            json!({"attr": "x", "other": 1}),
            json!({"time": "tomorrow"}),
            json!({"nested": {"attr": "x"}}),
        ] {
            assert!(matches!(
                Placeholder::parse(&value),
                Placeholder::Literal(_)
            ));
        }
    }

    #[test]
    fn test_function_without_args() {
        let call = json!({"function": "concat"});
        assert_eq!(
            Placeholder::parse(&call),
            Placeholder::FunctionCall {
                name: "concat",
                args: &[]
            }
        );
    }

    #[test]
    fn test_remaining_attr_refs_dedup() {
        let tree = json!({
            "a": {"attr": "x"},
            "b": [{"attr": "y"}, {"attr": "x"}],
            "c": {"function": "concat", "args": [{"attr": "z"}]}
        });
        assert_eq!(remaining_attr_refs(&tree), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_remaining_attr_refs_skips_literals() {
        let tree = json!({
            "color": {"attr": "color", "value": "red"},
            "numeric": {"attr": 7},
            "inner": {"attr": "x", "other": {"attr": "y"}}
        });
        assert_eq!(remaining_attr_refs(&tree), vec!["y"]);
    }

    #[test]
    fn test_response_paths() {
        let tree = json!({
            "Authorization": {"function": "concat", "args": ["Bearer ", {"response": "access_token"}]},
            "X-Id": {"response": "user.id"}
        });
        let mut paths = response_paths(&tree);
        paths.sort();
        assert_eq!(paths, vec!["access_token", "user.id"]);
    }
}
