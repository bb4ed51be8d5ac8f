//! Form/query parameter encoding
//!
//! The session API takes `application/x-www-form-urlencoded` parameters with
//! nested objects expressed as bracket paths:
//!
//! ```text
//! {"mobile": {"fullscreen": true}}  ->  mobile[fullscreen]=true
//! {"ids": ["a", "b"]}               ->  ids[0]=a&ids[1]=b
//! ```
//!
//! `flatten` produces the scalar pairs, `encode` escapes and joins them, and
//! `decode` reverses `encode` (used by tests and mock servers).

use std::collections::BTreeMap;

use tracing::warn;
use url::Url;

use crate::error::{Error, Result};

/// Parameters keyed by name. Ordered so identical input always encodes identically.
pub type Params = BTreeMap<String, Value>;

/// A parameter value: a scalar or a nested container.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Url(Url),
    Map(Params),
    Array(Vec<Value>),
}

impl Value {
    /// Scalar rendering; `None` for containers and non-finite floats.
    fn scalar(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(n) => Some(n.to_string()),
            Value::Float(f) if f.is_finite() => Some(f.to_string()),
            Value::Float(_) => None,
            Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
            Value::Url(u) => Some(u.as_str().to_string()),
            Value::Map(_) | Value::Array(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Url> for Value {
    fn from(value: Url) -> Self {
        Value::Url(value)
    }
}

impl From<&Url> for Value {
    fn from(value: &Url) -> Self {
        Value::Url(value.clone())
    }
}

impl From<Params> for Value {
    fn from(value: Params) -> Self {
        Value::Map(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

/// Flatten nested parameters into `(bracket.path, scalar)` pairs.
///
/// Maps become `parent[child]`, arrays `parent[0]`, `parent[1]`, ... and
/// nesting recurses to any depth. Empty containers contribute nothing, and
/// neither do NaN or infinite floats, which have no decimal form.
pub fn flatten(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        flatten_into(key.clone(), value, &mut pairs);
    }
    pairs
}

fn flatten_into(path: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Map(map) => {
            for (key, nested) in map {
                flatten_into(format!("{path}[{key}]"), nested, pairs);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(format!("{path}[{index}]"), item, pairs);
            }
        }
        scalar => match scalar.scalar() {
            Some(rendered) => pairs.push((path, rendered)),
            None => warn!(param = %path, "dropping non-finite float parameter"),
        },
    }
}

/// Encode parameters as `key=value&...` with both sides percent-escaped.
///
/// Empty input encodes to the empty string.
pub fn encode(params: &Params) -> String {
    flatten(params)
        .iter()
        .map(|(key, value)| format!("{}={}", escape(key), escape(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode an encoded query/body back into its pairs, in order.
///
/// `+` is literal (the encoder always escapes it). Malformed `%` escapes and
/// non-UTF-8 results are rejected.
pub fn decode(encoded: &str) -> Result<Vec<(String, String)>> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }
    encoded
        .split('&')
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((unescape(key)?, unescape(value)?))
        })
        .collect()
}

/// Whether a byte passes through unescaped in a query component.
///
/// RFC 3986 unreserved characters plus the sub-delimiters that carry no
/// meaning inside a form pair. `&`, `=`, `+`, `#` and brackets are escaped.
fn is_query_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'\'' | b'(' | b')' | b'*' | b',' | b'/'
                | b':' | b';' | b'?' | b'@'
        )
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &byte in s.as_bytes() {
        if is_query_safe(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn unescape(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| Error::InvalidEncoding(format!("bad escape at offset {i} in {s:?}")))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| Error::InvalidEncoding(format!("not UTF-8: {e}")))
}

/// Build `Params` from `(key, value)` pairs.
pub fn params<K, V, I>(entries: I) -> Params
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_flat_params_sorted_and_escaped() {
        let p = params([
            ("name", Value::from("John Doe")),
            ("age", Value::from(30)),
            ("email", Value::from("john@example.com")),
        ]);
        assert_eq!(
            encode(&p),
            "age=30&email=john@example.com&name=John%20Doe"
        );
    }

    #[test]
    fn empty_params_encode_to_empty_string() {
        assert_eq!(encode(&Params::new()), "");
        assert!(flatten(&Params::new()).is_empty());
    }

    #[test]
    fn nested_map_uses_bracket_paths() {
        let return_url = Url::parse("myapp://return").unwrap();
        let mobile = params([
            ("fullscreen", Value::from(true)),
            ("app_return_url", Value::from(return_url)),
        ]);
        let p = params([
            ("client_secret", Value::from("fcsess_secret")),
            ("mobile", Value::from(mobile)),
        ]);

        let pairs = flatten(&p);
        assert_eq!(
            pairs,
            vec![
                ("client_secret".to_string(), "fcsess_secret".to_string()),
                (
                    "mobile[app_return_url]".to_string(),
                    "myapp://return".to_string()
                ),
                ("mobile[fullscreen]".to_string(), "true".to_string()),
            ]
        );
        assert_eq!(
            encode(&p),
            "client_secret=fcsess_secret&mobile%5Bapp_return_url%5D=myapp://return&mobile%5Bfullscreen%5D=true"
        );
    }

    #[test]
    fn arrays_recurse_into_maps_and_arrays() {
        let inner_map = params([("kind", "checking")]);
        let p = params([(
            "filters",
            Value::Array(vec![
                Value::from("a"),
                Value::from(inner_map),
                Value::from(vec![1, 2]),
            ]),
        )]);

        let pairs = flatten(&p);
        assert_eq!(
            pairs,
            vec![
                ("filters[0]".to_string(), "a".to_string()),
                ("filters[1][kind]".to_string(), "checking".to_string()),
                ("filters[2][0]".to_string(), "1".to_string()),
                ("filters[2][1]".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn flatten_leaves_no_containers() {
        let deep = params([(
            "a",
            Value::from(params([(
                "b",
                Value::Array(vec![Value::from(params([("c", Value::from(false))]))]),
            )])),
        )]);
        let pairs = flatten(&deep);
        assert_eq!(pairs, vec![("a[b][0][c]".to_string(), "false".to_string())]);
        assert!(pairs.iter().all(|(k, _)| !k.is_empty()));
    }

    #[test]
    fn empty_containers_contribute_nothing() {
        let p = params([
            ("empty_map", Value::Map(Params::new())),
            ("empty_list", Value::Array(vec![])),
            ("kept", Value::from("x")),
        ]);
        assert_eq!(encode(&p), "kept=x");
    }

    #[test]
    fn scalars_render_canonically() {
        let p = params([
            ("f", Value::from(1.5)),
            ("whole", Value::from(30.0)),
            ("neg", Value::from(-7i64)),
            ("no", Value::from(false)),
        ]);
        assert_eq!(encode(&p), "f=1.5&neg=-7&no=false&whole=30");
    }

    #[test]
    fn non_finite_floats_are_dropped() {
        let p = params([
            ("inf", Value::from(f64::INFINITY)),
            ("nan", Value::from(f64::NAN)),
            ("ok", Value::from(0.25)),
        ]);
        assert_eq!(encode(&p), "ok=0.25");
    }

    #[test]
    fn reserved_characters_are_escaped() {
        let p = params([("q", "a&b=c+d#e f")]);
        assert_eq!(encode(&p), "q=a%26b%3Dc%2Bd%23e%20f");
    }

    #[test]
    fn non_ascii_is_escaped_as_utf8_bytes() {
        let p = params([("city", "Zürich")]);
        assert_eq!(encode(&p), "city=Z%C3%BCrich");
    }

    #[test]
    fn decode_reverses_encode() {
        let p = params([
            ("client_secret", Value::from("s3cr3t+/=&")),
            (
                "mobile",
                Value::from(params([
                    ("fullscreen", Value::from(true)),
                    ("note", Value::from("snowman ☃ [x]")),
                ])),
            ),
            ("list", Value::from(vec!["a b", "c%d"])),
        ]);
        assert_eq!(decode(&encode(&p)).unwrap(), flatten(&p));
    }

    #[test]
    fn decode_rejects_malformed_escape() {
        assert!(decode("a=%2").is_err());
        assert!(decode("a=%zz").is_err());
        assert!(decode("a=%FF").is_err(), "lone 0xFF is not UTF-8");
    }

    #[test]
    fn decode_key_without_value() {
        assert_eq!(
            decode("flag").unwrap(),
            vec![("flag".to_string(), String::new())]
        );
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn encoding_is_deterministic() {
        let build = || {
            params([
                ("z", Value::from("1")),
                ("a", Value::from(params([("y", "2"), ("b", "3")]))),
            ])
        };
        assert_eq!(encode(&build()), encode(&build()));
        assert_eq!(encode(&build()), "a%5Bb%5D=3&a%5By%5D=2&z=1");
    }
}
