//! Typed access to request values.
//!
//! [`Values`] is a read view over three sources in fixed priority order:
//! route path parameters, then query-string values, then form-body
//! values. The first source holding a key wins. Query and form sources
//! are decoded lazily from their raw representations on first access.

use std::fmt::Display;
use std::str::FromStr;

use bytes::Bytes;
use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::error::ValueError;

/// The per-request value store.
///
/// Mutation (`set`/`add`/`del`) targets the backing query layer only;
/// path parameters are injected by the router before handlers run.
#[derive(Debug, Default)]
pub struct Values {
    path: Vec<(String, String)>,
    raw_query: Option<String>,
    query: OnceCell<Vec<(String, String)>>,
    raw_form: Option<Bytes>,
    form: OnceCell<Vec<(String, String)>>,
}

impl Values {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the store for a fresh request, keeping allocations of the
    /// recycled instance where possible.
    pub(crate) fn reset(&mut self, raw_query: Option<String>, raw_form: Option<Bytes>) {
        self.path.clear();
        self.raw_query = raw_query;
        self.query.take();
        self.raw_form = raw_form;
        self.form.take();
    }

    /// Drops every request reference on release back to the pool.
    pub(crate) fn clear(&mut self) {
        self.reset(None, None);
    }

    /// Router-side injection of a path capture. Path parameters outrank
    /// every other source.
    pub(crate) fn add_path<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.path.push((key.into(), value.into()));
    }

    fn query_values(&self) -> &[(String, String)] {
        self.query.get_or_init(|| decode_pairs(self.raw_query.as_deref().map(str::as_bytes)))
    }

    fn form_values(&self) -> &[(String, String)] {
        self.form.get_or_init(|| decode_pairs(self.raw_form.as_deref()))
    }

    fn query_values_mut(&mut self) -> &mut Vec<(String, String)> {
        if self.query.get().is_none() {
            let decoded = decode_pairs(self.raw_query.as_deref().map(str::as_bytes));
            let _ = self.query.set(decoded);
        }
        // the cell was populated just above
        self.query.get_mut().expect("query cell is initialized")
    }

    /// Returns true if any source holds the key.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the first value for the key, path parameters first, then
    /// query, then form.
    pub fn get(&self, key: &str) -> Option<&str> {
        first(&self.path, key)
            .or_else(|| first(self.query_values(), key))
            .or_else(|| first(self.form_values(), key))
    }

    /// Returns every value for the key across all sources, in priority
    /// order.
    pub fn strings(&self, key: &str) -> Vec<&str> {
        self.path
            .iter()
            .chain(self.query_values())
            .chain(self.form_values())
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn string(&self, key: &str) -> Result<String, ValueError> {
        self.get(key).map(str::to_owned).ok_or_else(|| ValueError::not_found(key))
    }

    pub fn string_or(&self, key: &str, failover: &str) -> String {
        self.get(key).unwrap_or(failover).to_owned()
    }

    pub fn int(&self, key: &str) -> Result<i64, ValueError> {
        self.parsed(key)
    }

    pub fn int_or(&self, key: &str, failover: i64) -> i64 {
        self.int(key).unwrap_or(failover)
    }

    pub fn float(&self, key: &str) -> Result<f64, ValueError> {
        self.parsed(key)
    }

    pub fn float_or(&self, key: &str, failover: f64) -> f64 {
        self.float(key).unwrap_or(failover)
    }

    /// Parses a boolean value. Accepts `1`, `t`, `T`, `true`, `TRUE`,
    /// `True`, and their negative counterparts.
    pub fn boolean(&self, key: &str) -> Result<bool, ValueError> {
        let raw = self.get(key).ok_or_else(|| ValueError::not_found(key))?;
        parse_bool(raw).ok_or_else(|| ValueError::invalid(key, format!("not a boolean: {raw}")))
    }

    pub fn boolean_or(&self, key: &str, failover: bool) -> bool {
        self.boolean(key).unwrap_or(failover)
    }

    /// Sets the key on the backing query layer, replacing existing values.
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let query = self.query_values_mut();
        query.retain(|(k, _)| *k != key);
        query.push((key, value.into()));
    }

    /// Appends a value for the key on the backing query layer.
    pub fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.query_values_mut().push((key.into(), value.into()));
    }

    /// Deletes every value for the key from the backing query layer.
    pub fn del(&mut self, key: &str) {
        self.query_values_mut().retain(|(k, _)| k != key);
    }

    fn parsed<T>(&self, key: &str) -> Result<T, ValueError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.get(key).ok_or_else(|| ValueError::not_found(key))?;
        raw.parse().map_err(|e: T::Err| ValueError::invalid(key, e))
    }
}

fn first<'v>(pairs: &'v [(String, String)], key: &str) -> Option<&'v str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn decode_pairs(raw: Option<&[u8]>) -> Vec<(String, String)> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_urlencoded::from_bytes(raw) {
        Ok(pairs) => pairs,
        Err(e) => {
            debug!(cause = %e, "failed to decode url-encoded values");
            Vec::new()
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValueError;

    fn values(query: &str, form: &str) -> Values {
        let mut values = Values::new();
        let form = if form.is_empty() { None } else { Some(Bytes::copy_from_slice(form.as_bytes())) };
        values.reset(Some(query.to_owned()).filter(|q| !q.is_empty()), form);
        values
    }

    #[test]
    fn path_wins_over_query_and_form() {
        let mut v = values("id=2&name=query", "id=3");
        v.add_path("id", "1");
        assert_eq!(v.get("id"), Some("1"));
        assert_eq!(v.string_or("name", ""), "query");
    }

    #[test]
    fn query_wins_over_form() {
        let v = values("id=2", "id=3");
        assert_eq!(v.get("id"), Some("2"));
    }

    #[test]
    fn form_is_last_resort() {
        let v = values("", "id=3&tags=a&tags=b");
        assert_eq!(v.get("id"), Some("3"));
        assert_eq!(v.strings("tags"), vec!["a", "b"]);
    }

    #[test]
    fn missing_and_invalid_are_distinct() {
        let v = values("n=abc", "");
        assert!(matches!(v.int("absent"), Err(ValueError::NotFound { .. })));
        assert!(matches!(v.int("n"), Err(ValueError::Invalid { .. })));
        assert_eq!(v.int_or("n", 7), 7);
    }

    #[test]
    fn typed_accessors() {
        let v = values("n=42&pi=3.5&on=t&off=False", "");
        assert_eq!(v.int("n").unwrap(), 42);
        assert_eq!(v.float("pi").unwrap(), 3.5);
        assert!(v.boolean("on").unwrap());
        assert!(!v.boolean("off").unwrap());
        assert!(v.boolean("n").is_err());
    }

    #[test]
    fn set_add_del_target_query_layer() {
        let mut v = values("id=2", "id=3");
        v.set("id", "9");
        assert_eq!(v.get("id"), Some("9"));
        v.add("id", "10");
        assert_eq!(v.strings("id"), vec!["9", "10", "3"]);
        v.del("id");
        // the form source is untouched
        assert_eq!(v.get("id"), Some("3"));
    }

    #[test]
    fn reset_clears_previous_request() {
        let mut v = values("id=2", "");
        v.add_path("id", "1");
        assert_eq!(v.get("id"), Some("1"));
        v.reset(None, None);
        assert_eq!(v.get("id"), None);
        assert!(!v.has("id"));
    }
}
