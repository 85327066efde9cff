//! Wire types of the call batch protocol.
//!
//! Request: `{globalHash, sessionHash, functions: [{function, params}]}`.
//! Response: `{globalHash, sessionHash, results: [{value, error}]}`, one
//! result per descriptor, in descriptor order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A decoded call batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterRequest {
    /// Browser-wide session id; absent or empty means "issue one".
    #[serde(default)]
    pub global_hash: Option<String>,
    /// Tab session id; absent or empty means "issue one".
    #[serde(default)]
    pub session_hash: Option<String>,
    /// Calls to run, in order.
    #[serde(default)]
    pub functions: Vec<CallDescriptor>,
}

/// One requested call.
///
/// Decoding never fails: a missing or non-string `function`, or an entry that
/// is not an object at all, decodes with an empty `function` and is rejected
/// in its own result slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct CallDescriptor {
    /// `"Class.method"`.
    pub function: String,
    /// Positional arguments. Anything but an array is rejected per call.
    pub params: Option<Value>,
}

impl From<Value> for CallDescriptor {
    fn from(value: Value) -> Self {
        let Value::Object(mut entry) = value else {
            return Self::default();
        };
        let function = match entry.remove("function") {
            Some(Value::String(function)) => function,
            _ => String::new(),
        };
        Self {
            function,
            params: entry.remove("params").filter(|p| !p.is_null()),
        }
    }
}

impl CallDescriptor {
    /// A descriptor with array params.
    pub fn new(function: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            params: Some(Value::Array(params)),
        }
    }
}

/// Outcome of one call. Exactly one of `value` and `error` is meaningful;
/// `value` is `null` whenever `error` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Returned value.
    pub value: Value,
    /// Client-facing error string.
    pub error: Option<String>,
}

impl CallResult {
    /// A successful call.
    pub fn ok(value: Value) -> Self {
        Self { value, error: None }
    }

    /// A failed call.
    pub fn failed(error: &CallError) -> Self {
        Self {
            value: Value::Null,
            error: Some(error.to_string()),
        }
    }

    /// Whether the call failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The response to a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterResponse {
    /// Browser-wide session id the client must send next time.
    pub global_hash: String,
    /// Tab session id the client must send next time.
    pub session_hash: String,
    /// One result per requested call.
    pub results: Vec<CallResult>,
}

/// Per-call failure. The display strings are part of the wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CallError {
    /// Empty `function`.
    #[error("no function specified")]
    NoFunction,
    /// `function` is not exactly `Class.method`.
    #[error("class not specified")]
    ClassNotSpecified,
    /// The class is unknown or could not be bound to the session.
    #[error("class does not exist")]
    ClassNotFound,
    /// The class has no remote method of that name.
    #[error("function does not exist")]
    FunctionNotFound,
    /// `params` missing or not an array.
    #[error("parameter format error")]
    ParameterFormat,
    /// `params` length differs from the declared arity.
    #[error("parameter count mismatch")]
    ParameterCount,
    /// The method returned an error or panicked.
    #[error("module execution error")]
    Execution,
}

impl CallError {
    /// Stable label for metrics.
    pub fn code(self) -> &'static str {
        match self {
            Self::NoFunction => "no_function",
            Self::ClassNotSpecified => "class_not_specified",
            Self::ClassNotFound => "class_not_found",
            Self::FunctionNotFound => "function_not_found",
            Self::ParameterFormat => "parameter_format",
            Self::ParameterCount => "parameter_count",
            Self::Execution => "execution",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_tolerates_missing_fields() {
        let req: AdapterRequest = serde_json::from_value(json!({
            "functions": [{"function": "Foo.add"}, {"params": [1]}]
        }))
        .unwrap();
        assert!(req.global_hash.is_none());
        assert!(req.session_hash.is_none());
        assert_eq!(req.functions[0].params, None);
        assert_eq!(req.functions[1].function, "");
    }

    #[test]
    fn malformed_descriptors_decode_as_empty_calls() {
        let req: AdapterRequest = serde_json::from_value(json!({
            "functions": [
                {"function": null, "params": []},
                {"function": 5},
                null,
                "Foo.add",
                {"function": "Foo.add", "params": [1, 2]}
            ]
        }))
        .unwrap();
        assert_eq!(req.functions.len(), 5);
        assert!(req.functions[..4].iter().all(|c| c.function.is_empty()));
        assert_eq!(req.functions[0].params, Some(json!([])));
        assert_eq!(req.functions[4], CallDescriptor::new("Foo.add", vec![json!(1), json!(2)]));
    }

    #[test]
    fn null_params_are_absent() {
        let call: CallDescriptor =
            serde_json::from_value(json!({"function": "Foo.add", "params": null})).unwrap();
        assert!(call.params.is_none());
    }

    #[test]
    fn response_uses_wire_names() {
        let response = AdapterResponse {
            global_hash: "g".into(),
            session_hash: "s".into(),
            results: vec![
                CallResult::ok(json!(3)),
                CallResult::failed(&CallError::ParameterCount),
            ],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "globalHash": "g",
                "sessionHash": "s",
                "results": [
                    {"value": 3, "error": null},
                    {"value": null, "error": "parameter count mismatch"}
                ]
            })
        );
    }

    #[test]
    fn error_strings_are_exact() {
        let all = [
            (CallError::NoFunction, "no function specified"),
            (CallError::ClassNotSpecified, "class not specified"),
            (CallError::ClassNotFound, "class does not exist"),
            (CallError::FunctionNotFound, "function does not exist"),
            (CallError::ParameterFormat, "parameter format error"),
            (CallError::ParameterCount, "parameter count mismatch"),
            (CallError::Execution, "module execution error"),
        ];
        for (err, text) in all {
            assert_eq!(err.to_string(), text);
            assert!(!err.code().is_empty());
        }
    }
}
