//! The request contract a front end hands to the engine.
//!
//! Validation happens here, before any filesystem or network work, so a
//! malformed request is always a client error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::acquire::RefSpec;
use crate::error::{Error, Result};

/// Tokens accepted as a true `update` flag.
const TRUTHY_STRINGS: &[&str] = &["t", "T", "1", "true", "TRUE", "True"];

/// Raw parameters of an `add` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddRequest {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub dirname: Option<String>,
    /// Any JSON value; see [`is_truthy`].
    #[serde(default)]
    pub update: Option<Value>,
}

/// A validated `add` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddParams {
    pub origin: String,
    pub ref_spec: RefSpec,
    pub dirname: Option<String>,
    pub do_update: bool,
}

impl AddRequest {
    /// Checks the request and converts it into engine parameters.
    pub fn validate(&self) -> Result<AddParams> {
        let origin = match self.origin.as_deref().map(str::trim) {
            Some(origin) if !origin.is_empty() => origin.to_string(),
            _ => return Err(Error::MissingParameter("origin".to_string())),
        };
        let ref_spec = RefSpec::from_selectors(
            self.tag.as_deref(),
            self.branch.as_deref(),
            self.commit.as_deref(),
        )?;

        Ok(AddParams {
            origin,
            ref_spec,
            dirname: self.dirname.clone().filter(|d| !d.is_empty()),
            do_update: self.update.as_ref().is_some_and(is_truthy),
        })
    }
}

/// Whether `value` is one of the accepted truthy tokens:
/// `true`, `1`, `"t"`, `"T"`, `"1"`, `"true"`, `"TRUE"`, `"True"`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => TRUTHY_STRINGS.contains(&s.as_str()),
        _ => false,
    }
}

/// Body returned for a completed `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddResponse {
    pub success: bool,
}

/// Body returned for a failed request, with the HTTP status it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            status: err.status_code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> AddRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn valid_request_yields_params() {
        let params = request(json!({
            "origin": "https://git.example.com/scm/team/widgets.git",
            "branch": "main",
            "dirname": "staging",
            "update": "true",
        }))
        .validate()
        .unwrap();

        assert_eq!(params.origin, "https://git.example.com/scm/team/widgets.git");
        assert_eq!(params.ref_spec, RefSpec::Branch("main".to_string()));
        assert_eq!(params.dirname.as_deref(), Some("staging"));
        assert!(params.do_update);
    }

    #[test]
    fn missing_origin_is_reported_first() {
        let err = request(json!({})).validate().unwrap_err();
        assert_eq!(err.to_string(), "InvalidUsage. Missing parameter: origin");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn selector_errors_keep_their_messages() {
        let err = request(json!({"origin": "o"})).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "InvalidUsage. Missing parameter: tag or branch or commit"
        );

        let err = request(json!({"origin": "o", "tag": "v1", "branch": "main"}))
            .validate()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "InvalidUsage. Invalid parameter: Cannot have both tag and branch parameters"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn empty_selectors_count_as_absent() {
        let params = request(json!({"origin": "o", "tag": "", "commit": "abc1234"}))
            .validate()
            .unwrap();
        assert_eq!(params.ref_spec, RefSpec::Commit("abc1234".to_string()));
    }

    #[test]
    fn truthy_tokens() {
        for value in [
            json!(true),
            json!(1),
            json!("t"),
            json!("T"),
            json!("1"),
            json!("true"),
            json!("TRUE"),
            json!("True"),
        ] {
            assert!(is_truthy(&value), "{value} should be truthy");
        }
        for value in [
            json!(false),
            json!(0),
            json!(2),
            json!("yes"),
            json!("tRuE"),
            json!(null),
            json!([true]),
        ] {
            assert!(!is_truthy(&value), "{value} should not be truthy");
        }
    }

    #[test]
    fn absent_update_means_no_update() {
        let params = request(json!({"origin": "o", "tag": "v1"})).validate().unwrap();
        assert!(!params.do_update);
        assert_eq!(params.dirname, None);
    }

    #[test]
    fn responses_serialize_for_the_front_end() {
        assert_eq!(
            serde_json::to_value(AddResponse { success: true }).unwrap(),
            json!({"success": true})
        );

        let err = Error::SlotConflict {
            slot: "/srv/widgets-m-1a2b3c4".into(),
            existing: "/srv/widgets-old".into(),
        };
        let body = ErrorResponse::from(&err);
        assert_eq!(body.status, 500);
        assert!(body.message.contains("widgets-m-1a2b3c4"));
    }
}
