//!
//! Filter evaluator
//! ----------------
//! Pure evaluator for the provider's describe-style attribute filters. A
//! resource matches iff it matches every filter (AND across filters), and for
//! each filter its resolved attribute value matches at least one element of
//! the filter's value set (OR within a filter). Unknown attribute paths match
//! nothing rather than erroring, mirroring the provider.
//!
//! Filter values are exact-match strings unless they contain `*` or `?`, in
//! which case they are glob patterns (`*` = zero or more characters, `?` =
//! exactly one) compiled to an anchored regex.

use regex::Regex;

use crate::error::{ApiError, ApiResult};
use crate::store::Resource;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

/// Parse the decoded `Filter.N.Name` / `Filter.N.Value.M` tree of a describe
/// request. Absent `Filter` key means no filters. A filter entry without a
/// name is malformed; an entry without values matches nothing (kept as-is).
pub fn parse_filters(params: &Value) -> ApiResult<Vec<Filter>> {
    let Some(list) = params.get("Filter") else { return Ok(Vec::new()) };
    let items = list
        .as_list()
        .ok_or_else(|| ApiError::malformed("Filter must be a list"))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let name = item
            .get_str("Name")
            .ok_or_else(|| ApiError::malformed("Filter entry is missing Name"))?
            .to_string();
        let mut values = Vec::new();
        match item.get("Value") {
            Some(Value::List(vs)) => {
                for v in vs {
                    values.push(v.scalar_string().ok_or_else(|| {
                        ApiError::malformed(format!("Filter '{}' has a non-scalar value", name))
                    })?);
                }
            }
            Some(v) => {
                values.push(v.scalar_string().ok_or_else(|| {
                    ApiError::malformed(format!("Filter '{}' has a non-scalar value", name))
                })?);
            }
            None => {}
        }
        out.push(Filter { name, values });
    }
    Ok(out)
}

/// True iff the resource satisfies every filter.
pub fn matches(resource: &Resource, filters: &[Filter]) -> bool {
    filters.iter().all(|f| {
        let candidates = candidate_values(resource, &f.name);
        f.values
            .iter()
            .any(|pattern| candidates.iter().any(|c| value_matches(pattern, c)))
    })
}

/// Apply all filters to a resource sequence, preserving input order.
pub fn filter_resources(resources: Vec<Resource>, filters: &[Filter]) -> Vec<Resource> {
    if filters.is_empty() {
        return resources;
    }
    resources.into_iter().filter(|r| matches(r, filters)).collect()
}

/// Resolve a provider filter name to the candidate values on a resource.
/// `tag:<Key>` and `tag-key`/`tag-value` resolve against the tag set; `state`
/// and the per-type `*-state-name` aliases resolve the state field; anything
/// else maps the kebab-case name onto the camelCase attribute tree. Unknown
/// paths yield no candidates.
fn candidate_values(resource: &Resource, name: &str) -> Vec<String> {
    if let Some(key) = name.strip_prefix("tag:") {
        return resource
            .tags
            .iter()
            .filter(|t| t.key == key)
            .map(|t| t.value.clone())
            .collect();
    }
    match name {
        "tag-key" => return resource.tags.iter().map(|t| t.key.clone()).collect(),
        "tag-value" => return resource.tags.iter().map(|t| t.value.clone()).collect(),
        "state" | "instance-state-name" | "status" => return vec![resource.state.clone()],
        _ => {}
    }

    let path: Vec<String> = name.split('.').map(kebab_to_camel).collect();
    resolve(&resource.attributes, &path)
}

/// Walk the attribute tree along a camelCase path. Lists fan out over their
/// elements (`attachment.vpc-id` reaches into every attachment); a missing
/// map key falls back to the provider's `<key>Set` list-field naming.
fn resolve(v: &Value, segs: &[String]) -> Vec<String> {
    if segs.is_empty() {
        return flatten_scalars(v);
    }
    match v {
        Value::List(items) => items.iter().flat_map(|item| resolve(item, segs)).collect(),
        Value::Map(_) => {
            let child = v.get(&segs[0]).or_else(|| v.get(&format!("{}Set", segs[0])));
            match child {
                Some(c) => resolve(c, &segs[1..]),
                None => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

/// List-typed attributes match if any element matches, so every scalar leaf
/// under the resolved value is a candidate.
fn flatten_scalars(v: &Value) -> Vec<String> {
    match v {
        Value::List(items) => items.iter().flat_map(flatten_scalars).collect(),
        Value::Map(_) => Vec::new(),
        other => other.scalar_string().into_iter().collect(),
    }
}

fn kebab_to_camel(seg: &str) -> String {
    let mut out = String::with_capacity(seg.len());
    let mut upper_next = false;
    for ch in seg.chars() {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Match one candidate value against one filter pattern. Plain strings are
/// exact-match; only patterns containing `*` or `?` get glob semantics.
pub fn value_matches(pattern: &str, value: &str) -> bool {
    if !pattern.contains('*') && !pattern.contains('?') {
        return pattern == value;
    }
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    match Regex::new(&re) {
        Ok(rx) => rx.is_match(value),
        Err(_) => false,
    }
}
