//! Router tree
//!
//! A [`Router`] maps path segments to endpoints or nested routers. The tree
//! is built once at startup and flattened into a path table when it is
//! mounted; it is never mutated after that.
//!
//! # Example
//! ```rust,ignore
//! let users = Router::new()
//!     .route("list", base.get(list_users))
//!     .route("create", base.input(create_schema).post(create_user));
//!
//! let router = Router::new()
//!     .route("users", users)
//!     .route("health", route().get(health));
//!
//! // "/users/list", "/users/create", "/health"
//! let table = router.flatten("");
//! ```

use crate::export::{RouteSchema, RouterSchema};
use crate::route::{Endpoint, Method};
use serde::Serialize;
use std::collections::BTreeMap;

/// Characters a path segment may not contain. Hosts read them as
/// separators or capture syntax.
pub(crate) const RESERVED_CHARS: &[char] = &['/', ':', '*', '{', '}', '?', '#'];

/// Check that `segment` is a literal path segment.
pub(crate) fn check_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("must be non-empty".to_string());
    }
    match segment.chars().find(|c| RESERVED_CHARS.contains(c)) {
        Some(c) => Err(format!("must not contain '{}'", c)),
        None => Ok(()),
    }
}

/// A router tree node.
pub enum Node<S> {
    /// A leaf
    Endpoint(Endpoint<S>),
    /// An internal node
    Router(Router<S>),
}

impl<S> From<Endpoint<S>> for Node<S> {
    fn from(endpoint: Endpoint<S>) -> Self {
        Self::Endpoint(endpoint)
    }
}

impl<S> From<Router<S>> for Node<S> {
    fn from(router: Router<S>) -> Self {
        Self::Router(router)
    }
}

/// Recursive mapping from path segment to endpoint or nested router.
pub struct Router<S> {
    nodes: BTreeMap<String, Node<S>>,
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry of the flattened route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    /// Full path, segments joined with `/`
    pub path: String,
    /// Call method
    pub method: Method,
}

impl<S> Router<S> {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    /// Add an endpoint or nested router under `segment`.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is empty, contains a reserved character
    /// (`/ : * { } ? #`), or is already taken.
    pub fn route(mut self, segment: impl Into<String>, node: impl Into<Node<S>>) -> Self {
        let segment = segment.into();
        if let Err(reason) = check_segment(&segment) {
            panic!("Invalid path segment '{}': {}", segment, reason);
        }
        if self.nodes.contains_key(&segment) {
            panic!("Duplicate path segment '{}'", segment);
        }
        self.nodes.insert(segment, node.into());
        self
    }

    /// The node directly under `segment`.
    pub fn get(&self, segment: &str) -> Option<&Node<S>> {
        self.nodes.get(segment)
    }

    /// Resolve a `/`-separated path to its endpoint.
    pub fn lookup(&self, path: &str) -> Option<&Endpoint<S>> {
        let mut segments = path.trim_start_matches('/').split('/');
        let mut node = self.get(segments.next()?)?;
        for segment in segments {
            match node {
                Node::Router(router) => node = router.get(segment)?,
                Node::Endpoint(_) => return None,
            }
        }
        match node {
            Node::Endpoint(endpoint) => Some(endpoint),
            Node::Router(_) => None,
        }
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the router has no children.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flatten the tree into `(prefix + "/" + segments..., endpoint)` pairs.
    pub fn flatten(&self, prefix: &str) -> Vec<(String, Endpoint<S>)> {
        let mut out = Vec::new();
        self.collect(prefix, &mut out);
        out
    }

    fn collect(&self, prefix: &str, out: &mut Vec<(String, Endpoint<S>)>) {
        for (segment, node) in &self.nodes {
            let path = format!("{}/{}", prefix, segment);
            match node {
                Node::Endpoint(endpoint) => out.push((path, endpoint.clone())),
                Node::Router(router) => router.collect(&path, out),
            }
        }
    }

    /// The flattened `(path, method)` table.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.flatten("")
            .into_iter()
            .map(|(path, endpoint)| RouteInfo {
                path,
                method: endpoint.method(),
            })
            .collect()
    }

    /// Describe every route and its contracts.
    pub fn export_schema(&self) -> RouterSchema {
        self.flatten("")
            .into_iter()
            .fold(RouterSchema::new(), |schema, (path, endpoint)| {
                schema.add_route(
                    path,
                    RouteSchema {
                        method: endpoint.method(),
                        input: endpoint.input().shape(),
                        output: endpoint.output().shape(),
                    },
                )
            })
    }
}
