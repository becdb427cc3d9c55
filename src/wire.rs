//!
//! Wire encoding and decoding
//! --------------------------
//! Decodes the provider's flat query-parameter request encoding (keys encode
//! nested structure positionally, e.g. `Filter.1.Name`, `Filter.1.Value.2`,
//! `TagSpecification.1.Tag.2.Key`) into the generic `Value` tree, and renders
//! responses back out as the provider's XML envelope (query protocol) or JSON
//! document (JSON protocol).
//!
//! Decoding rules:
//! - numeric path segments denote 1-based sequence positions
//! - reconstruction is independent of key arrival order
//! - sparse indices, index zero, duplicate keys, and a key used both as a
//!   scalar and as a structure are all `MalformedParameter`

use std::collections::BTreeMap;

use crate::error::{ApiError, ApiResult};
use crate::value::Value;

/// Split and percent-decode an `application/x-www-form-urlencoded` body into
/// key/value pairs. Pair order is irrelevant to tree reconstruction.
pub fn decode_form(body: &str) -> ApiResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for pair in body.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (raw_k, raw_v) = pair.split_once('=').unwrap_or((pair, ""));
        let k = percent_decode(raw_k)?;
        let v = percent_decode(raw_v)?;
        out.push((k, v));
    }
    Ok(out)
}

fn percent_decode(s: &str) -> ApiResult<String> {
    let plus_fixed = s.replace('+', " ");
    urlencoding::decode(&plus_fixed)
        .map(|c| c.into_owned())
        .map_err(|_| ApiError::malformed(format!("invalid percent-encoding in '{}'", s)))
}

/// Decode a full query-protocol body into a parameter tree.
pub fn decode_request(body: &str) -> ApiResult<Value> {
    build_tree(decode_form(body)?)
}

/// Reconstruct the nested parameter tree from flat dotted keys.
pub fn build_tree(pairs: Vec<(String, String)>) -> ApiResult<Value> {
    let mut root = Node::default();
    for (key, value) in pairs {
        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ApiError::malformed(format!("empty path segment in parameter '{}'", key)));
        }
        root.insert(&segments, value, &key)?;
    }
    root.into_value("")
}

/// Intermediate builder node: flat keys land here in arrival order, then the
/// whole tree is converted in one pass so sequence validation sees the final
/// index set regardless of ordering.
#[derive(Default)]
struct Node {
    children: BTreeMap<String, Node>,
    leaf: Option<String>,
}

impl Node {
    fn insert(&mut self, segments: &[&str], value: String, full_key: &str) -> ApiResult<()> {
        if segments.is_empty() {
            if self.leaf.is_some() {
                return Err(ApiError::malformed(format!("duplicate parameter '{}'", full_key)));
            }
            self.leaf = Some(value);
            return Ok(());
        }
        self.children
            .entry(segments[0].to_string())
            .or_default()
            .insert(&segments[1..], value, full_key)
    }

    fn into_value(self, path: &str) -> ApiResult<Value> {
        if let Some(leaf) = self.leaf {
            if !self.children.is_empty() {
                return Err(ApiError::malformed(format!(
                    "parameter '{}' is used both as a value and as a structure",
                    path
                )));
            }
            return Ok(Value::Str(leaf));
        }

        let numeric = self.children.keys().filter(|k| is_index(k)).count();
        if numeric > 0 && numeric != self.children.len() {
            return Err(ApiError::malformed(format!(
                "parameter '{}' mixes list indices with named members",
                path
            )));
        }

        if numeric > 0 {
            let mut indexed: Vec<(usize, Node)> = Vec::with_capacity(numeric);
            for (k, child) in self.children {
                let idx: usize = k
                    .parse()
                    .map_err(|_| ApiError::malformed(format!("invalid list index '{}' under '{}'", k, path)))?;
                if idx == 0 {
                    return Err(ApiError::malformed(format!("list indices under '{}' are 1-based", path)));
                }
                indexed.push((idx, child));
            }
            indexed.sort_by_key(|(i, _)| *i);
            // contiguity: the provider's convention does not allow sparse arrays
            for (pos, (idx, _)) in indexed.iter().enumerate() {
                if *idx != pos + 1 {
                    return Err(ApiError::malformed(format!(
                        "missing list index {} under '{}'",
                        pos + 1,
                        path
                    )));
                }
            }
            let mut items = Vec::with_capacity(indexed.len());
            for (idx, child) in indexed {
                items.push(child.into_value(&format!("{}.{}", path, idx))?);
            }
            return Ok(Value::List(items));
        }

        let mut map = BTreeMap::new();
        for (k, child) in self.children {
            let child_path = if path.is_empty() { k.clone() } else { format!("{}.{}", path, k) };
            map.insert(k, child.into_value(&child_path)?);
        }
        Ok(Value::Map(map))
    }
}

fn is_index(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

// ------------------------
// Response encoding
// ------------------------

pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Success envelope for the query protocol:
/// `<{Action}Response xmlns=...><requestId>..</requestId>{body}</{Action}Response>`.
/// Lists render as repeated `<item>` elements under the field's element.
pub fn xml_response(action: &str, xmlns: &str, request_id: &str, body: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!("<{}Response xmlns=\"{}\">", action, xmlns));
    out.push_str(&format!("<requestId>{}</requestId>", xml_escape(request_id)));
    if let Value::Map(m) = body {
        for (k, v) in m {
            render_field(&mut out, k, v);
        }
    }
    out.push_str(&format!("</{}Response>", action));
    out
}

/// The provider's standard error document.
pub fn xml_error(code: &str, message: &str, request_id: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response><Errors><Error><Code>{}</Code><Message>{}</Message></Error></Errors><RequestID>{}</RequestID></Response>",
        xml_escape(code),
        xml_escape(message),
        xml_escape(request_id)
    )
}

fn render_field(out: &mut String, key: &str, v: &Value) {
    match v {
        Value::List(items) => {
            if items.is_empty() {
                out.push_str(&format!("<{}/>", key));
                return;
            }
            out.push_str(&format!("<{}>", key));
            for item in items {
                out.push_str("<item>");
                render_inner(out, item);
                out.push_str("</item>");
            }
            out.push_str(&format!("</{}>", key));
        }
        Value::Map(m) => {
            out.push_str(&format!("<{}>", key));
            for (k, c) in m {
                render_field(out, k, c);
            }
            out.push_str(&format!("</{}>", key));
        }
        scalar => {
            let text = scalar.scalar_string().unwrap_or_default();
            out.push_str(&format!("<{}>{}</{}>", key, xml_escape(&text), key));
        }
    }
}

fn render_inner(out: &mut String, v: &Value) {
    match v {
        Value::Map(m) => {
            for (k, c) in m {
                render_field(out, k, c);
            }
        }
        Value::List(items) => {
            for item in items {
                out.push_str("<item>");
                render_inner(out, item);
                out.push_str("</item>");
            }
        }
        scalar => {
            let text = scalar.scalar_string().unwrap_or_default();
            out.push_str(&xml_escape(&text));
        }
    }
}

/// JSON-protocol success body. The request id travels in a response header,
/// so the body is the result document alone.
pub fn json_response(body: &Value) -> String {
    body.to_json().to_string()
}

/// JSON-protocol error document: `{"__type": code, "message": ...}`.
pub fn json_error(code: &str, message: &str) -> String {
    serde_json::json!({ "__type": code, "message": message }).to_string()
}
