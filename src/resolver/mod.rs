//! Parameter resolution for configuration trees
//!
//! Configuration values may reference user parameters (`{"attr": "name"}`),
//! call one of the user functions (`{"function": "concat", "args": [...]}`)
//! or ask for the current time (`{"time": "currentStart"}`). The resolver
//! walks the tree structurally and replaces those nodes with concrete values.
//!
//! Resolution order:
//!
//! 1. time macros in the tree and in the user parameters
//! 2. user parameters, evaluated eagerly; references between parameters are
//!    followed depth-first on first use
//! 3. attribute references in the tree, replaced by the parameter's string form
//! 4. any reference left over fails the whole resolution
//! 5. optionally, function objects directly under the root of the result

pub mod functions;
mod placeholder;

pub use placeholder::{remaining_attr_refs, response_paths, Placeholder, TimeMacro};

use crate::error::{Error, Result};
use crate::types::JsonObject;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Resolve a configuration tree against a set of user parameters
///
/// With `evaluate_functions` set, function objects found directly under the
/// root object of the result are evaluated as well. The login handshake uses
/// this once response values have been substituted.
pub fn resolve(tree: &Value, user_params: &JsonObject, evaluate_functions: bool) -> Result<Value> {
    let now = Utc::now().timestamp();
    let tree = substitute_time(tree, now);
    let params = substitute_time_in_object(user_params, now);

    let mut scope = ParameterScope::new(&params);
    scope.evaluate_all()?;

    let resolved = scope.substitute(&tree)?;
    let unmatched = remaining_attr_refs(&resolved);
    if !unmatched.is_empty() {
        return Err(Error::UnresolvedReference { keys: unmatched });
    }

    if evaluate_functions {
        scope.evaluate_top_level(resolved)
    } else {
        Ok(resolved)
    }
}

/// Resolve an object, see [`resolve`]
pub fn resolve_object(
    tree: &JsonObject,
    user_params: &JsonObject,
    evaluate_functions: bool,
) -> Result<JsonObject> {
    match resolve(&Value::Object(tree.clone()), user_params, evaluate_functions)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::config(format!(
            "Expected an object after resolution, got {other}"
        ))),
    }
}

/// Resolve user parameters against themselves
///
/// Function parameters are replaced by their results and references between
/// parameters are followed.
pub fn resolve_user_parameters(user_params: &JsonObject) -> Result<JsonObject> {
    let params = substitute_time_in_object(user_params, Utc::now().timestamp());
    let mut scope = ParameterScope::new(&params);

    let mut resolved = JsonObject::new();
    for key in params.keys() {
        resolved.insert(key.clone(), scope.lookup(key)?);
    }
    debug!("Resolved {} user parameters", resolved.len());
    Ok(resolved)
}

/// Convert a JSON value to the string used for substitution
pub fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // For complex types, use JSON serialization
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn substitute_time(value: &Value, now: i64) -> Value {
    if let Placeholder::Time(_) = Placeholder::parse(value) {
        return Value::from(now);
    }
    match value {
        Value::Object(map) => Value::Object(substitute_time_in_object(map, now)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_time(v, now)).collect()),
        other => other.clone(),
    }
}

fn substitute_time_in_object(map: &JsonObject, now: i64) -> JsonObject {
    map.iter()
        .map(|(k, v)| (k.clone(), substitute_time(v, now)))
        .collect()
}

/// User parameters with lazily evaluated, memoised values
struct ParameterScope<'a> {
    raw: &'a JsonObject,
    resolved: HashMap<String, Value>,
    /// Parameters currently being evaluated, for cycle detection
    stack: Vec<String>,
}

impl<'a> ParameterScope<'a> {
    fn new(raw: &'a JsonObject) -> Self {
        Self {
            raw,
            resolved: HashMap::new(),
            stack: Vec::new(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.raw.contains_key(name)
    }

    fn evaluate_all(&mut self) -> Result<()> {
        let raw: &'a JsonObject = self.raw;
        for key in raw.keys() {
            self.lookup(key)?;
        }
        Ok(())
    }

    fn lookup(&mut self, name: &str) -> Result<Value> {
        if let Some(value) = self.resolved.get(name) {
            return Ok(value.clone());
        }

        if let Some(start) = self.stack.iter().position(|n| n == name) {
            let mut chain = self.stack[start..].to_vec();
            chain.push(name.to_string());
            return Err(Error::CyclicReference { chain });
        }

        let raw: &'a JsonObject = self.raw;
        let value = raw.get(name).ok_or_else(|| Error::UnresolvedReference {
            keys: vec![name.to_string()],
        })?;

        self.stack.push(name.to_string());
        let result = self.evaluate(name, value);
        self.stack.pop();

        let value = result?;
        self.resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Evaluate a parameter value or a function argument
    fn evaluate(&mut self, key: &str, value: &Value) -> Result<Value> {
        match Placeholder::parse(value) {
            Placeholder::AttrRef(name) => self.lookup(name),
            Placeholder::FunctionCall { name, args } => {
                let function = functions::UserFunction::from_name(name)?;
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(key, arg))
                    .collect::<Result<Vec<_>>>()?;
                function.call(&args)
            }
            Placeholder::Literal(Value::Object(map)) if map.contains_key("function") => {
                Err(Error::InvalidFunction {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            _ => {
                let substituted = self.substitute(value)?;
                let unmatched = remaining_attr_refs(&substituted);
                if unmatched.is_empty() {
                    Ok(substituted)
                } else {
                    Err(Error::UnresolvedReference { keys: unmatched })
                }
            }
        }
    }

    /// Replace known attribute references anywhere in the tree
    fn substitute(&mut self, node: &Value) -> Result<Value> {
        if let Placeholder::AttrRef(name) = Placeholder::parse(node) {
            if self.contains(name) {
                return Ok(Value::String(string_form(&self.lookup(name)?)));
            }
            return Ok(node.clone());
        }

        match node {
            Value::Object(map) => {
                let mut out = JsonObject::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.substitute(v)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|v| self.substitute(v))
                    .collect::<Result<Vec<_>>>()?,
            )),
            other => Ok(other.clone()),
        }
    }

    fn evaluate_top_level(&mut self, resolved: Value) -> Result<Value> {
        let Value::Object(map) = resolved else {
            return Ok(resolved);
        };

        let mut out = JsonObject::new();
        for (key, value) in map {
            let value = if Placeholder::parse(&value).is_function() {
                self.evaluate(&key, &value)?
            } else {
                value
            };
            out.insert(key, value);
        }
        Ok(Value::Object(out))
    }
}
