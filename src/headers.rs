//! Document response headers.
//!
//! Every matched route may declare a `headers` function. The functions run
//! root first, each receiving the headers its parent produced, so the leaf
//! has the final say on conflicts. `Set-Cookie` values set by loaders and
//! actions are always carried through, whether or not a route declares
//! headers.
//!
//! When the context carries errors, the chain stops at the first errored
//! route (the boundary that renders), and the headers of the route that
//! actually failed are offered to that boundary as `error_headers`.

use crate::data::ResultContext;
use http::header::SET_COOKIE;
use http::HeaderMap;
use std::sync::Arc;

/// Arguments passed to a route's `headers` function.
#[derive(Debug, Clone, Copy)]
pub struct HeadersArgs<'a> {
    pub loader_headers: &'a HeaderMap,
    pub parent_headers: &'a HeaderMap,
    pub action_headers: &'a HeaderMap,
    /// Headers of the route that errored, only for the rendering boundary.
    pub error_headers: Option<&'a HeaderMap>,
}

/// A route module's `headers` export.
pub type HeadersFn = Arc<dyn Fn(&HeadersArgs<'_>) -> HeaderMap + Send + Sync>;

/// Append every `Set-Cookie` value of `from` missing from `to`.
fn prepend_cookies(from: &HeaderMap, to: &mut HeaderMap) {
    let missing: Vec<_> = from
        .get_all(SET_COOKIE)
        .iter()
        .filter(|cookie| !to.get_all(SET_COOKIE).iter().any(|c| c == *cookie))
        .cloned()
        .collect();
    for cookie in missing {
        to.append(SET_COOKIE, cookie);
    }
}

/// Route whose own loader or action headers became the error headers.
struct ErrorHeaders<'a> {
    route_id: &'a str,
    headers: &'a HeaderMap,
}

fn find_error_headers<'a>(context: &'a ResultContext, boundary_idx: usize) -> Option<ErrorHeaders<'a>> {
    context.matches[boundary_idx..].iter().find_map(|m| {
        let id = m.route_id();
        let action_missing = context
            .action_data
            .as_ref()
            .map_or(true, |data| !data.contains_key(id));
        if let Some(headers) = context.action_headers.get(id).filter(|_| action_missing) {
            return Some(ErrorHeaders { route_id: id, headers });
        }
        context
            .loader_headers
            .get(id)
            .filter(|_| !context.loader_data().contains_key(id))
            .map(|headers| ErrorHeaders { route_id: id, headers })
    })
}

/// Merge the headers of every rendered route into the document's headers.
#[must_use]
pub fn document_headers(context: &ResultContext) -> HeaderMap {
    let rendered = context.rendered_matches();
    let boundary = rendered
        .last()
        .filter(|m| context.errors().is_some_and(|errors| errors.contains_key(m.route_id())));
    let error_headers = boundary.and_then(|_| find_error_headers(context, rendered.len() - 1));

    let empty = HeaderMap::new();
    let mut parent_headers = HeaderMap::new();
    for (idx, m) in rendered.iter().enumerate() {
        let id = m.route_id();
        let loader_headers = context.loader_headers.get(id).unwrap_or(&empty);
        let action_headers = context.action_headers.get(id).unwrap_or(&empty);
        let boundary_error_headers = error_headers
            .as_ref()
            .filter(|_| idx + 1 == rendered.len());
        let include_error_cookies = boundary_error_headers.is_some_and(|e| e.route_id != id);

        let mut headers = match m.route.module.headers.as_ref() {
            Some(headers_fn) => headers_fn(&HeadersArgs {
                loader_headers,
                parent_headers: &parent_headers,
                action_headers,
                error_headers: boundary_error_headers.map(|e| e.headers),
            }),
            None => parent_headers.clone(),
        };

        if let Some(err) = boundary_error_headers.filter(|_| include_error_cookies) {
            prepend_cookies(err.headers, &mut headers);
        }
        prepend_cookies(action_headers, &mut headers);
        prepend_cookies(loader_headers, &mut headers);
        prepend_cookies(&parent_headers, &mut headers);
        parent_headers = headers;
    }
    parent_headers
}
