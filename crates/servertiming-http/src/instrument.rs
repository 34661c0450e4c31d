//! Instrumentation helpers for application code.
//!
//! Every helper registers into the collection of the currently bound scope
//! (see [`crate::storage`]) and fails with `UnboundContext` outside of one.

use std::future::Future;

use servertiming_core::error::Result;
use servertiming_core::Metric;

use crate::storage;

/// Measured metric registered in the current scope. Not started yet.
pub fn metric(name: &str, description: Option<&str>) -> Result<Metric> {
    let collection = storage::collection()?;
    Ok(Metric::create(name, description, None, Some(&collection)))
}

/// Metric with a known duration (milliseconds), appended immediately.
pub fn record(name: &str, description: Option<&str>, duration_ms: f64) -> Result<Metric> {
    let collection = storage::collection()?;
    Ok(Metric::create(
        name,
        description,
        Some(duration_ms),
        Some(&collection),
    ))
}

/// Measure a block of synchronous work.
pub fn timed<T>(name: &str, description: Option<&str>, f: impl FnOnce() -> T) -> Result<T> {
    metric(name, description)?.measure(f)
}

/// Measure a future, including the time it spends suspended.
pub async fn timed_async<F: Future>(
    name: &str,
    description: Option<&str>,
    fut: F,
) -> Result<F::Output> {
    let m = metric(name, description)?;
    m.measure_async(fut).await
}

/// Measure a call to `f`, named after the function unless `name` is given.
pub fn timed_fn<F, T>(name: Option<&str>, description: Option<&str>, f: F) -> Result<T>
where
    F: FnOnce() -> T,
{
    timed(name.unwrap_or(callable_name::<F>()), description, f)
}

/// Async counterpart of [`timed_fn`].
pub async fn timed_async_fn<F, Fut>(
    name: Option<&str>,
    description: Option<&str>,
    f: F,
) -> Result<Fut::Output>
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    let m = metric(name.unwrap_or(callable_name::<F>()), description)?;
    m.measure_async(f()).await
}

const ANONYMOUS: &str = "anonymous";

/// Identifier of the callable: the last path segment of its type name with
/// generic arguments stripped. Closures, function pointers and other
/// non-path types are `anonymous`.
pub fn callable_name<F>() -> &'static str {
    path_tail(std::any::type_name::<F>())
}

fn path_tail(full: &'static str) -> &'static str {
    let bytes = full.as_bytes();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'-' if bytes.get(i + 1) == Some(&b'>') => i += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                i += 1;
                start = i + 1;
            }
            b'(' | b' ' | b'&' | b'*' | b'[' if depth == 0 => return ANONYMOUS,
            _ => {}
        }
        i += 1;
    }

    let segment = &full[start..];
    let ident = segment.split('<').next().unwrap_or(segment);
    let mut chars = ident.chars();
    let leading = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_');
    if leading && chars.all(|c| c.is_alphanumeric() || c == '_') {
        ident
    } else {
        ANONYMOUS
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use servertiming_core::TimingsError;

    use super::*;
    use crate::storage::{bind, cleanup, BindMode};

    fn load_rows() -> usize {
        3
    }

    #[test]
    fn callable_names() {
        fn name_of<F>(_: &F) -> &'static str {
            callable_name::<F>()
        }
        assert_eq!(name_of(&load_rows), "load_rows");
        assert_eq!(name_of(&|| 1), "anonymous");
        assert_eq!(name_of(&String::new), "new");
        assert_eq!(name_of(&Vec::<u8>::new), "new");
        assert_eq!(name_of(&Option::<u8>::unwrap_or_default), "unwrap_or_default");

        let pointer: fn() -> usize = load_rows;
        assert_eq!(name_of(&pointer), "anonymous");
    }

    #[test]
    fn path_tail_strips_generic_groups() {
        assert_eq!(path_tail("alloc::vec::Vec<u8>::new"), "new");
        assert_eq!(path_tail("a::Map<a::Key, fn() -> u8>::get<a::Key>"), "get");
        assert_eq!(path_tail("app::handlers::{{closure}}"), "anonymous");
        assert_eq!(path_tail("fn(u8) -> alloc::string::String"), "anonymous");
        assert_eq!(path_tail("&app::load"), "anonymous");
    }

    #[test]
    fn timed_fn_names_generic_methods_by_method() {
        let scope = bind(BindMode::Sync).unwrap();
        let v: Vec<u8> = timed_fn(None, None, Vec::<u8>::new).unwrap();
        assert!(v.is_empty());
        assert_eq!(scope.collection().dump()[0].name, "new");
        cleanup();
    }

    #[test]
    fn odd_names_still_produce_a_valid_header() {
        let scope = bind(BindMode::Sync).unwrap();
        record("cache,db;x", None, 1.0).unwrap();
        record("del\u{7f}", None, 2.0).unwrap();

        let value = scope.collection().header_value().unwrap();
        assert_eq!(value, "cache-db-x;dur=1.00;, del-;dur=2.00;");
        assert!(axum::http::HeaderValue::from_str(&value).is_ok());
        cleanup();
    }

    #[test]
    fn helpers_fail_outside_scope() {
        assert_eq!(metric("x", None).unwrap_err(), TimingsError::UnboundContext);
        assert_eq!(
            record("x", None, 1.0).unwrap_err(),
            TimingsError::UnboundContext
        );
        assert_eq!(timed("x", None, || ()).unwrap_err(), TimingsError::UnboundContext);
    }

    #[test]
    fn timed_fn_defaults_to_function_name() {
        let scope = bind(BindMode::Sync).unwrap();
        let rows = timed_fn(None, Some("fixture"), load_rows).unwrap();
        assert_eq!(rows, 3);
        timed_fn(Some("named"), None, || ()).unwrap();

        let names: Vec<String> = scope
            .collection()
            .dump()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["load_rows", "named"]);
        cleanup();
    }

    #[test]
    fn record_is_visible_immediately() {
        let scope = bind(BindMode::Sync).unwrap();
        record("cache", Some("hit"), 0.5).unwrap();
        assert_eq!(
            scope.collection().header_value().as_deref(),
            Some("cache;desc=\"hit\";dur=0.50;")
        );
        cleanup();
    }
}
