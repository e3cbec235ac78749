//! Status-code extraction from operation outcomes
//!
//! The default classifier never knows the concrete shape of a result or an
//! error. It asks the value, through [`Inspect`], for whatever sits at a fixed
//! list of status-like locations, and for the headers it carries.

use std::borrow::Cow;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::error::HttpStatusError;

/// A place where a status-like value may live on an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusLocation {
    /// `status`
    Status,
    /// `response.status`
    ResponseStatus,
    /// `statusCode`
    StatusCodeCamel,
    /// `StatusCode`
    StatusCodePascal,
    /// `code`
    Code,
}

/// Candidate locations in scan order
pub const STATUS_LOCATIONS: [StatusLocation; 5] = [
    StatusLocation::Status,
    StatusLocation::ResponseStatus,
    StatusLocation::StatusCodeCamel,
    StatusLocation::StatusCodePascal,
    StatusLocation::Code,
];

impl StatusLocation {
    /// Dotted path of the location, as it appears in JSON-shaped outcomes
    pub fn path(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::ResponseStatus => "response.status",
            Self::StatusCodeCamel => "statusCode",
            Self::StatusCodePascal => "StatusCode",
            Self::Code => "code",
        }
    }

    fn lookup(self, value: &Value) -> Option<&Value> {
        match self {
            Self::ResponseStatus => value.get("response")?.get("status"),
            other => value.get(other.path()),
        }
    }
}

/// Raw value found at a status location, before coercion
#[derive(Debug, Clone, PartialEq)]
pub enum RawStatus {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawStatus {
    /// Coerce to an integer status
    ///
    /// Integers pass through, finite floats truncate, and strings are parsed
    /// after trimming. Anything else is not a status.
    pub fn coerce(&self) -> Option<i64> {
        match self {
            Self::Int(code) => Some(*code),
            Self::Float(code) => truncate(*code),
            Self::Text(text) => {
                let text = text.trim();
                text.parse::<i64>().ok().or_else(|| text.parse::<f64>().ok().and_then(truncate))
            }
        }
    }
}

fn truncate(value: f64) -> Option<i64> {
    if value.is_finite() && value.abs() < i64::MAX as f64 {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

impl From<u16> for RawStatus {
    fn from(code: u16) -> Self {
        Self::Int(i64::from(code))
    }
}

/// A raw value found at one location
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCandidate {
    pub location: StatusLocation,
    pub value: RawStatus,
}

impl StatusCandidate {
    pub fn new(location: StatusLocation, value: impl Into<RawStatus>) -> Self {
        Self { location, value: value.into() }
    }
}

/// Read access to the parts of an outcome the classifier cares about
///
/// Both methods default to "nothing here", so an error type with no status
/// opts in with an empty `impl Inspect for MyError {}` and is treated as
/// unclassified.
pub trait Inspect {
    /// Values found at the locations of [`STATUS_LOCATIONS`], in scan order
    fn status_candidates(&self) -> Vec<StatusCandidate> {
        Vec::new()
    }

    /// Headers carried by the outcome, if any
    fn headers(&self) -> Option<Cow<'_, HeaderMap>> {
        None
    }
}

impl Inspect for Value {
    fn status_candidates(&self) -> Vec<StatusCandidate> {
        STATUS_LOCATIONS
            .iter()
            .filter_map(|location| {
                let raw = match location.lookup(self)? {
                    Value::Number(n) => match n.as_i64() {
                        Some(code) => RawStatus::Int(code),
                        None => RawStatus::Float(n.as_f64()?),
                    },
                    Value::String(s) => RawStatus::Text(s.clone()),
                    _ => return None,
                };
                Some(StatusCandidate { location: *location, value: raw })
            })
            .collect()
    }

    fn headers(&self) -> Option<Cow<'_, HeaderMap>> {
        let object = self
            .get("headers")
            .or_else(|| self.get("response").and_then(|r| r.get("headers")))?
            .as_object()?;

        let mut headers = HeaderMap::new();
        for (name, value) in object {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            if let (Ok(name), Ok(value)) =
                (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&text))
            {
                headers.append(name, value);
            }
        }
        Some(Cow::Owned(headers))
    }
}

impl Inspect for reqwest::Response {
    fn status_candidates(&self) -> Vec<StatusCandidate> {
        vec![StatusCandidate::new(StatusLocation::Status, self.status().as_u16())]
    }

    fn headers(&self) -> Option<Cow<'_, HeaderMap>> {
        Some(Cow::Borrowed(reqwest::Response::headers(self)))
    }
}

impl Inspect for reqwest::Error {
    fn status_candidates(&self) -> Vec<StatusCandidate> {
        self.status()
            .map(|status| StatusCandidate::new(StatusLocation::Status, status.as_u16()))
            .into_iter()
            .collect()
    }
}

impl Inspect for HttpStatusError {
    fn status_candidates(&self) -> Vec<StatusCandidate> {
        vec![StatusCandidate::new(StatusLocation::Status, self.status)]
    }

    fn headers(&self) -> Option<Cow<'_, HeaderMap>> {
        Some(Cow::Borrowed(&self.headers))
    }
}

impl<T: Inspect + ?Sized> Inspect for Box<T> {
    fn status_candidates(&self) -> Vec<StatusCandidate> {
        (**self).status_candidates()
    }

    fn headers(&self) -> Option<Cow<'_, HeaderMap>> {
        (**self).headers()
    }
}

impl<T: Inspect + ?Sized> Inspect for Arc<T> {
    fn status_candidates(&self) -> Vec<StatusCandidate> {
        (**self).status_candidates()
    }

    fn headers(&self) -> Option<Cow<'_, HeaderMap>> {
        (**self).headers()
    }
}

impl<T: Inspect + ?Sized> Inspect for &T {
    fn status_candidates(&self) -> Vec<StatusCandidate> {
        (**self).status_candidates()
    }

    fn headers(&self) -> Option<Cow<'_, HeaderMap>> {
        (**self).headers()
    }
}
