//! Deterministic cache keys for bundle lookups.
//!
//! Shape: `version=v1|prompt=...|locale=...|geo=...|filters=k=v&k=v`.
//! Filters are normalized and sorted so map iteration order never leaks into
//! the key. Literal `|` (and the escape char itself) inside a component is
//! backslash-escaped; inside a filter key or value `&` and `=` are escaped
//! too, so one filter can never read as two. The key is not hashed or
//! truncated.

/// Bump when the key layout changes so old entries stop matching.
pub const CACHE_KEY_VERSION: &str = "v1";

/// Build the cache key for a prompt + locale + geo + filter set.
///
/// `filters` accepts any iterator of string pairs (`&HashMap<String, String>`,
/// `&BTreeMap<..>`, a `Vec` of tuples, ...).
pub fn build<I, K, V>(prompt: &str, locale: Option<&str>, geo: Option<&str>, filters: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    format!(
        "version={}|prompt={}|locale={}|geo={}|filters={}",
        CACHE_KEY_VERSION,
        escape(&normalize_prompt(prompt)),
        escape(&normalize_field(locale)),
        escape(&normalize_field(geo)),
        escape(&serialize_filters(filters)),
    )
}

/// Trim, lowercase, collapse whitespace runs to one space.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn normalize_field(v: Option<&str>) -> String {
    v.map(|s| s.trim().to_lowercase()).unwrap_or_default()
}

fn serialize_filters<I, K, V>(filters: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(String, String)> = filters
        .into_iter()
        .map(|(k, v)| {
            (
                k.as_ref().trim().to_lowercase(),
                v.as_ref().trim().to_lowercase(),
            )
        })
        .collect();
    // Sorting on (key, value) keeps the result stable even when two raw keys
    // normalize to the same string.
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", escape_filter(&k), escape_filter(&v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('|', "\\|")
}

fn escape_filter(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('&', "\\&")
        .replace('=', "\\=")
}
