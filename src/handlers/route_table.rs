//! Route table actions. The main route table of a vpc is created implicitly
//! with the vpc and cannot be deleted on its own.

use crate::error::{ApiError, ApiResult};
use crate::filter;
use crate::gateway::ActionRequest;
use crate::store::{Resource, SharedStore};
use crate::types::ResourceType;
use crate::value::Value;

use super::{base_view, ret_true, tags_from_spec};

pub fn create_route_table(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let vpc_id = req.require_str("VpcId")?;
    let tags = tags_from_spec(req, ResourceType::RouteTable)?;

    let mut guard = store.0.lock();
    let vpc = guard.get(ResourceType::Vpc, vpc_id)?;
    let vpc_cidr = vpc.attr_str("cidrBlock").unwrap_or_default().to_string();

    let mut local_route = Value::empty_map();
    local_route.set("destinationCidrBlock", Value::str(vpc_cidr));
    local_route.set("gatewayId", Value::str("local"));
    local_route.set("state", Value::str("active"));

    let mut attrs = Value::empty_map();
    attrs.set("vpcId", Value::str(vpc_id));
    attrs.set("main", Value::Bool(false));
    attrs.set("routeSet", Value::List(vec![local_route]));
    attrs.set("associationSet", Value::List(vec![]));
    let rtb = guard.create(ResourceType::RouteTable, attrs, tags)?;
    drop(guard);

    let mut body = Value::empty_map();
    body.set("routeTable", rtb_view(&rtb));
    Ok(body)
}

pub fn describe_route_tables(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let filters = filter::parse_filters(&req.params)?;
    let ids = req.str_list("RouteTableId");

    let guard = store.0.lock();
    let resources = if ids.is_empty() {
        guard.list(ResourceType::RouteTable)
    } else {
        ids.iter()
            .map(|id| guard.get_cloned(ResourceType::RouteTable, id))
            .collect::<ApiResult<Vec<_>>>()?
    };
    drop(guard);

    let kept = filter::filter_resources(resources, &filters);
    let mut body = Value::empty_map();
    body.set("routeTableSet", Value::List(kept.iter().map(rtb_view).collect()));
    Ok(body)
}

pub fn delete_route_table(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let id = req.require_str("RouteTableId")?;
    let mut guard = store.0.lock();
    let rtb = guard.get(ResourceType::RouteTable, id)?;
    if rtb.attr("main").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Err(ApiError::dependency(format!(
            "The routeTable '{}' is the main route table and cannot be deleted.",
            id
        )));
    }
    guard.delete(ResourceType::RouteTable, id)?;
    Ok(ret_true())
}

fn rtb_view(r: &Resource) -> Value {
    let mut v = base_view(r);
    v.set("ownerId", Value::str(super::OWNER_ID));
    v
}
