//! Capability records
//!
//! A slot's stereotype and a session request are both capability records:
//! a JSON object keyed by capability name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Capability name for the browser a slot runs
pub const CAPABILITY_BROWSER_NAME: &str = "browserName";

/// Capability name for the browser version a slot runs
pub const CAPABILITY_BROWSER_VERSION: &str = "browserVersion";

/// Capability name for the platform a slot runs on
pub const CAPABILITY_PLATFORM_NAME: &str = "platformName";

/// A set of WebDriver capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(Map<String, Value>);

impl Capabilities {
    /// Create an empty capability set
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Shorthand for a stereotype with only a browser name
    pub fn browser(name: impl Into<String>) -> Self {
        Self::new().with(CAPABILITY_BROWSER_NAME, name.into())
    }

    /// Return a copy with `key` set to `value`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a capability
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The requested or advertised browser name
    pub fn browser_name(&self) -> Option<&str> {
        self.get(CAPABILITY_BROWSER_NAME).and_then(Value::as_str)
    }

    /// The requested or advertised platform name
    pub fn platform_name(&self) -> Option<&str> {
        self.get(CAPABILITY_PLATFORM_NAME).and_then(Value::as_str)
    }

    /// Iterate over all capabilities
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Whether no capabilities are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a slot advertising `self` can serve `requested`.
    ///
    /// Vendor extension keys (containing `:`) are ignored. A requested value
    /// of `null` or `""` matches anything. `platformName` is compared
    /// without regard to case.
    pub fn supports(&self, requested: &Capabilities) -> bool {
        requested.iter().all(|(key, wanted)| {
            if key.contains(':') || is_wildcard(wanted) {
                return true;
            }

            match self.get(key) {
                Some(offered) if key == CAPABILITY_PLATFORM_NAME => {
                    match (offered.as_str(), wanted.as_str()) {
                        (Some(o), Some(w)) => o.eq_ignore_ascii_case(w),
                        _ => offered == wanted,
                    }
                }
                Some(offered) => offered == wanted,
                None => false,
            }
        })
    }
}

fn is_wildcard(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl From<Map<String, Value>> for Capabilities {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}
