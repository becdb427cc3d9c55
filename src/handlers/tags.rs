//! Tag actions. CreateTags and DeleteTags work across resource types by
//! inferring the type from the id prefix; DescribeTags flattens every tag on
//! every resource into one row set.

use crate::error::{ApiError, ApiResult};
use crate::filter::{self, Filter};
use crate::gateway::ActionRequest;
use crate::store::{SharedStore, Store, Tag};
use crate::types::ResourceType;
use crate::value::Value;

use super::ret_true;

pub fn create_tags(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let ids = req.str_list("ResourceId");
    if ids.is_empty() {
        return Err(ApiError::missing_parameter("ResourceId"));
    }
    let tags = parse_tag_list(req)?;
    if tags.is_empty() {
        return Err(ApiError::missing_parameter("Tag"));
    }

    let mut guard = store.0.lock();
    // validate all ids before mutating any, so the action is all-or-nothing
    verify_ids(&guard, &ids)?;
    for id in &ids {
        guard.tag_resource(id, tags.clone())?;
    }
    Ok(ret_true())
}

pub fn delete_tags(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let ids = req.str_list("ResourceId");
    if ids.is_empty() {
        return Err(ApiError::missing_parameter("ResourceId"));
    }
    let keys: Vec<String> = match req.param("Tag") {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|t| t.get_str("Key").map(|k| k.to_string()))
            .collect(),
        _ => vec![],
    };

    let mut guard = store.0.lock();
    verify_ids(&guard, &ids)?;
    for id in &ids {
        guard.untag_resource(id, &keys)?;
    }
    Ok(ret_true())
}

/// Resolve every id to a live resource before any mutation.
fn verify_ids(guard: &Store, ids: &[String]) -> ApiResult<()> {
    for id in ids {
        let rtype = ResourceType::from_id(id)
            .ok_or_else(|| ApiError::validation("InvalidID", format!("The ID '{}' is not valid", id)))?;
        guard.get(rtype, id)?;
    }
    Ok(())
}

pub fn describe_tags(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let filters = filter::parse_filters(&req.params)?;

    let guard = store.0.lock();
    let mut rows = Vec::new();
    for r in guard.all_resources() {
        for tag in &r.tags {
            if !tag_row_matches(&filters, &r.id, r.rtype.wire_name(), tag) {
                continue;
            }
            let mut row = Value::empty_map();
            row.set("resourceId", Value::str(&r.id));
            row.set("resourceType", Value::str(r.rtype.wire_name()));
            row.set("key", Value::str(&tag.key));
            row.set("value", Value::str(&tag.value));
            rows.push(row);
        }
    }
    drop(guard);

    let mut body = Value::empty_map();
    body.set("tagSet", Value::List(rows));
    Ok(body)
}

/// Tag rows are not resources, so the generic evaluator does not apply;
/// match the four tag-row filter names directly.
fn tag_row_matches(filters: &[Filter], resource_id: &str, resource_type: &str, tag: &Tag) -> bool {
    filters.iter().all(|f| {
        let candidate = match f.name.as_str() {
            "key" => tag.key.as_str(),
            "value" => tag.value.as_str(),
            "resource-id" => resource_id,
            "resource-type" => resource_type,
            _ => return false,
        };
        f.values.iter().any(|p| filter::value_matches(p, candidate))
    })
}

fn parse_tag_list(req: &ActionRequest) -> ApiResult<Vec<Tag>> {
    let mut tags = Vec::new();
    if let Some(Value::List(items)) = req.param("Tag") {
        for item in items {
            let key = item
                .get_str("Key")
                .ok_or_else(|| ApiError::missing_parameter("Tag.Key"))?;
            let value = item.get_str("Value").unwrap_or("");
            tags.push(Tag { key: key.to_string(), value: value.to_string() });
        }
    }
    Ok(tags)
}
