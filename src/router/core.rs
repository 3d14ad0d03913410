//! Route table - branch flattening, ranking and path matching.

use regex::Regex;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::route::ServerRoute;

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Matched path parameters.
///
/// Names are `Arc<str>` shared with the compiled branch; values are
/// per-request data from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Param name used for a trailing `*` segment.
pub const SPLAT_PARAM: &str = "*";

const DYNAMIC_SEGMENT_VALUE: i32 = 3;
const INDEX_ROUTE_VALUE: i32 = 2;
const EMPTY_SEGMENT_VALUE: i32 = 1;
const STATIC_SEGMENT_VALUE: i32 = 10;
const SPLAT_PENALTY: i32 = -2;

/// One route in a matched hierarchy.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<ServerRoute>,
    /// Every param matched by the branch; all matches of one request share
    /// the same set.
    pub params: ParamVec,
}

impl RouteMatch {
    #[inline]
    #[must_use]
    pub fn route_id(&self) -> &str {
        &self.route.id
    }

    /// Get a path parameter by name. Last occurrence wins.
    #[inline]
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Params as an owned map. Allocates; prefer [`RouteMatch::get_param`].
    #[must_use]
    pub fn params_map(&self) -> HashMap<String, String> {
        self.params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

/// Problems found while building a [`RouteTable`].
#[derive(Debug, thiserror::Error)]
pub enum RouteTableError {
    #[error("duplicate route id `{0}`")]
    DuplicateId(String),
    #[error("route `{route_id}` references unknown parent `{parent_id}`")]
    UnknownParent { route_id: String, parent_id: String },
    #[error("index route `{0}` cannot have child routes")]
    IndexWithChildren(String),
    #[error("routes not reachable from a root route (cyclic parents?): {0:?}")]
    Unreachable(Vec<String>),
    #[error("invalid path pattern `{path}`: {source}")]
    Pattern {
        path: String,
        #[source]
        source: regex::Error,
    },
}

/// A root-to-leaf chain of routes that can match a URL on its own.
#[derive(Debug, Clone)]
struct Branch {
    path: String,
    score: i32,
    /// Sibling position of each route in the chain, for tie-breaking.
    positions: Vec<usize>,
    routes: Vec<Arc<ServerRoute>>,
    regex: Regex,
    param_names: Vec<Arc<str>>,
}

/// Ranked branches compiled from a build's route manifest.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<ServerRoute>>,
    branches: Vec<Branch>,
}

impl RouteTable {
    /// Build the table from a flat manifest linked through `parent_id`.
    pub fn new(routes: Vec<ServerRoute>) -> Result<Self, RouteTableError> {
        let routes: Vec<Arc<ServerRoute>> = routes.into_iter().map(Arc::new).collect();

        let mut ids = HashSet::with_capacity(routes.len());
        for route in &routes {
            if !ids.insert(route.id.as_str()) {
                return Err(RouteTableError::DuplicateId(route.id.clone()));
            }
        }

        let mut children: HashMap<Option<&str>, Vec<Arc<ServerRoute>>> = HashMap::new();
        for route in &routes {
            if let Some(parent_id) = route.parent_id.as_deref() {
                if !ids.contains(parent_id) {
                    return Err(RouteTableError::UnknownParent {
                        route_id: route.id.clone(),
                        parent_id: parent_id.to_string(),
                    });
                }
            }
            children
                .entry(route.parent_id.as_deref())
                .or_default()
                .push(Arc::clone(route));
        }

        let mut flattener = Flattener {
            children: &children,
            visited: HashSet::with_capacity(routes.len()),
            chain: Vec::new(),
            branches: Vec::new(),
        };
        flattener.flatten(None, "")?;
        let Flattener {
            visited,
            mut branches,
            ..
        } = flattener;

        if visited.len() != routes.len() {
            let orphans = routes
                .iter()
                .filter(|r| !visited.contains(r.id.as_str()))
                .map(|r| r.id.clone())
                .collect();
            return Err(RouteTableError::Unreachable(orphans));
        }

        branches.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| compare_positions(&a.positions, &b.positions))
        });

        let branch_summary: Vec<String> = branches
            .iter()
            .take(10)
            .map(|b| format!("{} -> {}", b.path, leaf_id(b)))
            .collect();
        info!(
            routes_count = routes.len(),
            branches_count = branches.len(),
            branch_summary = ?branch_summary,
            "Route table built"
        );

        Ok(Self { routes, branches })
    }

    #[must_use]
    pub fn routes(&self) -> &[Arc<ServerRoute>] {
        &self.routes
    }

    #[must_use]
    pub fn route(&self, id: &str) -> Option<&Arc<ServerRoute>> {
        self.routes.iter().find(|r| r.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Full paths of every branch in match order.
    #[must_use]
    pub fn branch_paths(&self) -> Vec<&str> {
        self.branches.iter().map(|b| b.path.as_str()).collect()
    }

    /// Match a URL path against the ranked branches.
    ///
    /// Returns the matched hierarchy root first, leaf last, or `None` when no
    /// branch matches.
    #[must_use]
    pub fn match_routes(&self, pathname: &str) -> Option<Vec<RouteMatch>> {
        debug!(path = %pathname, "Route match attempt");
        let match_start = Instant::now();

        for branch in &self.branches {
            let Some(captures) = branch.regex.captures(pathname) else {
                continue;
            };

            let mut params = ParamVec::new();
            for (i, name) in branch.param_names.iter().enumerate() {
                let raw = captures.get(i + 1).map_or("", |m| m.as_str());
                params.push((Arc::clone(name), decode_param(raw)));
            }

            let match_duration = match_start.elapsed();
            if match_duration > Duration::from_millis(1) {
                warn!(
                    path = %pathname,
                    route_pattern = %branch.path,
                    duration_us = match_duration.as_micros(),
                    "Slow route matching detected"
                );
            } else {
                debug!(
                    path = %pathname,
                    route_pattern = %branch.path,
                    leaf = %leaf_id(branch),
                    path_params = ?params,
                    duration_us = match_duration.as_micros(),
                    "Route matched"
                );
            }

            return Some(
                branch
                    .routes
                    .iter()
                    .map(|route| RouteMatch {
                        route: Arc::clone(route),
                        params: params.clone(),
                    })
                    .collect(),
            );
        }

        debug!(path = %pathname, "No route matched");
        None
    }
}

struct Flattener<'a> {
    children: &'a HashMap<Option<&'a str>, Vec<Arc<ServerRoute>>>,
    visited: HashSet<&'a str>,
    chain: Vec<(usize, Arc<ServerRoute>)>,
    branches: Vec<Branch>,
}

impl<'a> Flattener<'a> {
    fn flatten(&mut self, parent_id: Option<&'a str>, parent_path: &str) -> Result<(), RouteTableError> {
        let children = self.children;
        let Some(siblings) = children.get(&parent_id) else {
            return Ok(());
        };

        for (position, route) in siblings.iter().enumerate() {
            self.visited.insert(route.id.as_str());
            let path = join_paths(parent_path, route.path.as_deref().unwrap_or(""));
            self.chain.push((position, Arc::clone(route)));

            if children.contains_key(&Some(route.id.as_str())) {
                if route.index {
                    return Err(RouteTableError::IndexWithChildren(route.id.clone()));
                }
                self.flatten(Some(route.id.as_str()), &path)?;
            }

            // Pathless layouts only match through their children.
            if route.path.is_some() || route.index {
                let (regex, param_names) = path_to_regex(&path, route.case_sensitive)?;
                self.branches.push(Branch {
                    score: compute_score(&path, route.index),
                    positions: self.chain.iter().map(|(p, _)| *p).collect(),
                    routes: self.chain.iter().map(|(_, r)| Arc::clone(r)).collect(),
                    path,
                    regex,
                    param_names,
                });
            }
            self.chain.pop();
        }
        Ok(())
    }
}

fn leaf_id(branch: &Branch) -> &str {
    branch.routes.last().map_or("", |r| r.id.as_str())
}

/// Siblings (same chain up to the last route) keep manifest order; anything
/// else is a tie.
fn compare_positions(a: &[usize], b: &[usize]) -> std::cmp::Ordering {
    let siblings = a.len() == b.len()
        && !a.is_empty()
        && a[..a.len() - 1] == b[..b.len() - 1];
    if siblings {
        a[a.len() - 1].cmp(&b[b.len() - 1])
    } else {
        std::cmp::Ordering::Equal
    }
}

fn join_paths(parent: &str, child: &str) -> String {
    let joined = if child.starts_with('/') {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    };
    let mut normalized = String::with_capacity(joined.len() + 1);
    normalized.push('/');
    for segment in joined.split('/').filter(|s| !s.is_empty()) {
        if normalized.len() > 1 {
            normalized.push('/');
        }
        normalized.push_str(segment);
    }
    normalized
}

fn is_splat(segment: &str) -> bool {
    segment == SPLAT_PARAM
}

fn is_dynamic(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with(':')
        && segment[1..]
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Specificity score of a branch path; higher ranks first.
pub(crate) fn compute_score(path: &str, index: bool) -> i32 {
    let segments: Vec<&str> = path.split('/').collect();
    let mut score = i32::try_from(segments.len()).unwrap_or(i32::MAX);
    if segments.iter().any(|s| is_splat(s)) {
        score += SPLAT_PENALTY;
    }
    if index {
        score += INDEX_ROUTE_VALUE;
    }
    segments
        .iter()
        .filter(|s| !is_splat(s))
        .fold(score, |score, segment| {
            score
                + if is_dynamic(segment) {
                    DYNAMIC_SEGMENT_VALUE
                } else if segment.is_empty() {
                    EMPTY_SEGMENT_VALUE
                } else {
                    STATIC_SEGMENT_VALUE
                }
        })
}

/// Compile a normalized branch path into an anchored regex and its ordered
/// param names.
///
/// `:name` segments capture one path segment, a trailing `*` captures the
/// rest of the path. Trailing slashes in the URL are tolerated.
pub(crate) fn path_to_regex(
    path: &str,
    case_sensitive: bool,
) -> Result<(Regex, Vec<Arc<str>>), RouteTableError> {
    let mut pattern = String::with_capacity(path.len() + 16);
    if !case_sensitive {
        pattern.push_str("(?i)");
    }
    pattern.push('^');
    let mut param_names = Vec::new();

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if is_splat(segment) {
            pattern.push_str("(?:/(.*))?");
            param_names.push(Arc::from(SPLAT_PARAM));
        } else if is_dynamic(segment) {
            pattern.push_str("/([^/]+)");
            param_names.push(Arc::from(&segment[1..]));
        } else {
            pattern.push('/');
            pattern.push_str(&regex::escape(segment));
        }
    }

    pattern.push_str("/*$");
    let regex = Regex::new(&pattern).map_err(|source| RouteTableError::Pattern {
        path: path.to_string(),
        source,
    })?;
    Ok((regex, param_names))
}

fn decode_param(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!(value = %raw, error = %e, "Path param is not valid percent-encoded UTF-8");
            raw.to_string()
        }
    }
}
