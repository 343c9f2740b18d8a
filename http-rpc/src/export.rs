//! Router schema export
//!
//! Serializable description of every route in a router tree: its method and
//! the shapes of its input and output contracts. Suitable for client code
//! generation or documentation tooling.
//!
//! # Example
//!
//! ```rust,ignore
//! let schema = router.export_schema().with_name("users-api");
//! println!("{}", schema.to_json_pretty());
//! ```

use crate::route::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema of a whole router tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSchema {
    /// Schema version
    pub version: String,
    /// Router name/title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// All routes, keyed by path
    pub routes: BTreeMap<String, RouteSchema>,
}

impl Default for RouterSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterSchema {
    /// Create an empty router schema
    pub fn new() -> Self {
        Self {
            version: "1.0.0".to_string(),
            name: None,
            routes: BTreeMap::new(),
        }
    }

    /// Set the router name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a route
    pub fn add_route(mut self, path: impl Into<String>, route: RouteSchema) -> Self {
        self.routes.insert(path.into(), route);
        self
    }

    /// Serialize to compact JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Routes with the given method
    pub fn by_method(&self, method: Method) -> impl Iterator<Item = (&String, &RouteSchema)> {
        self.routes.iter().filter(move |(_, r)| r.method == method)
    }
}

/// Schema of one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSchema {
    /// Call method
    pub method: Method,
    /// Input shape; absent when the input contract is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    /// Output shape; absent when any output is accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}
