//! `Server-Timing` wire format and the structured log dump.
//!
//! ```text
//! <entry>(, <entry>)*
//! entry := name ";" ["desc=" json-string ";"] ["dur=" ms-with-2-decimals ";"]
//! ```

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TimingsError};

/// Default response header name.
pub const HEADER_NAME: &str = "Server-Timing";

/// Separator between entries of one header value.
pub const ENTRY_SEPARATOR: &str = ", ";

/// One metric as it appears in the structured dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub name: String,
    pub description: Option<String>,
    pub duration: f64,
}

impl TimingRecord {
    /// Render the record with the same grammar as a live metric.
    pub fn header_entry(&self) -> String {
        format_entry(&self.name, self.description.as_deref(), self.duration)
    }
}

/// Log payload emitted once per request.
#[derive(Debug, Serialize)]
pub struct RequestLog<'a> {
    pub path: &'a str,
    pub timings: &'a [TimingRecord],
}

impl RequestLog<'_> {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| TimingsError::Internal(format!("encode timings failed: {e}")))
    }
}

/// Render a single entry. `dur=` is left out when the duration is exactly zero.
pub fn format_entry(name: &str, description: Option<&str>, duration_ms: f64) -> String {
    let mut out = String::with_capacity(name.len() + 24);
    out.push_str(name);
    out.push(';');
    if let Some(desc) = description {
        let _ = write!(out, "desc={};", quote_json(desc));
    }
    if duration_ms != 0.0 {
        let _ = write!(out, "dur={duration_ms:.2};");
    }
    out
}

/// Join entries with `", "`; `None` if there are none.
pub fn join_entries<I>(entries: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let joined = entries
        .into_iter()
        .collect::<Vec<_>>()
        .join(ENTRY_SEPARATOR);
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// JSON string literal restricted to visible ASCII (header-safe).
///
/// Non-ASCII characters and DEL become `\uXXXX` escapes, surrogate pairs above
/// the BMP.
pub fn quote_json(s: &str) -> String {
    let json = serde_json::Value::from(s).to_string();
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
            let _ = write!(out, "\\u{unit:04x}");
        }
    }
    out
}
