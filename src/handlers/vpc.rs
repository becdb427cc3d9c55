//! Vpc actions. Creating a vpc also provisions its implicit default security
//! group and main route table, which the store cascade-deletes with the vpc.

use crate::error::ApiResult;
use crate::filter;
use crate::gateway::ActionRequest;
use crate::store::{Resource, SharedStore, Store};
use crate::types::ResourceType;
use crate::value::Value;

use super::{base_view, ret_true, tags_from_spec, validate_cidr};

pub fn create_vpc(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let cidr = req.require_str("CidrBlock")?;
    validate_cidr(cidr, 16, 28)?;
    let tags = tags_from_spec(req, ResourceType::Vpc)?;

    let mut guard = store.0.lock();
    let mut attrs = Value::empty_map();
    attrs.set("cidrBlock", Value::str(cidr));
    attrs.set("isDefault", Value::Bool(false));
    attrs.set("instanceTenancy", Value::str(req.param_str("InstanceTenancy").unwrap_or("default")));
    let vpc = guard.create(ResourceType::Vpc, attrs, tags)?;

    provision_implicit_dependents(&mut guard, &vpc.id, cidr)?;
    drop(guard);

    let mut body = Value::empty_map();
    body.set("vpc", vpc_view(&vpc));
    Ok(body)
}

pub fn describe_vpcs(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let filters = filter::parse_filters(&req.params)?;
    let ids = req.str_list("VpcId");

    let guard = store.0.lock();
    let resources = if ids.is_empty() {
        guard.list(ResourceType::Vpc)
    } else {
        ids.iter()
            .map(|id| guard.get_cloned(ResourceType::Vpc, id))
            .collect::<ApiResult<Vec<_>>>()?
    };
    drop(guard);

    let kept = filter::filter_resources(resources, &filters);
    let mut body = Value::empty_map();
    body.set("vpcSet", Value::List(kept.iter().map(vpc_view).collect()));
    Ok(body)
}

pub fn delete_vpc(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let id = req.require_str("VpcId")?;
    store.0.lock().delete(ResourceType::Vpc, id)?;
    Ok(ret_true())
}

/// The default security group and the main route table the provider creates
/// alongside every vpc. Both are flagged implicit so only they cascade.
fn provision_implicit_dependents(guard: &mut Store, vpc_id: &str, cidr: &str) -> ApiResult<()> {
    let mut sg_attrs = Value::empty_map();
    sg_attrs.set("vpcId", Value::str(vpc_id));
    sg_attrs.set("groupName", Value::str("default"));
    sg_attrs.set("groupDescription", Value::str("default VPC security group"));
    sg_attrs.set("ipPermissions", Value::List(vec![]));
    guard.create_implicit(ResourceType::SecurityGroup, sg_attrs, vec![])?;

    let mut local_route = Value::empty_map();
    local_route.set("destinationCidrBlock", Value::str(cidr));
    local_route.set("gatewayId", Value::str("local"));
    local_route.set("state", Value::str("active"));
    let mut rtb_attrs = Value::empty_map();
    rtb_attrs.set("vpcId", Value::str(vpc_id));
    rtb_attrs.set("main", Value::Bool(true));
    rtb_attrs.set("routeSet", Value::List(vec![local_route]));
    rtb_attrs.set("associationSet", Value::List(vec![]));
    guard.create_implicit(ResourceType::RouteTable, rtb_attrs, vec![])?;
    Ok(())
}

fn vpc_view(r: &Resource) -> Value {
    let mut v = base_view(r);
    v.set("state", Value::str(&r.state));
    v.set("ownerId", Value::str(super::OWNER_ID));
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;

    fn req(body: &str) -> ActionRequest {
        let params = wire::decode_request(body).unwrap();
        ActionRequest { action: params.get_str("Action").unwrap_or_default().to_string(), params }
    }

    #[test]
    fn create_then_describe_then_delete() {
        let store = SharedStore::new();
        let out = create_vpc(&store, &req("Action=CreateVpc&CidrBlock=10.0.0.0/16")).unwrap();
        let id = out.get_path("vpc.vpcId").unwrap().as_str().unwrap().to_string();
        assert_eq!(out.get_path("vpc.state").and_then(|v| v.as_str()), Some("available"));

        let described = describe_vpcs(&store, &req("Action=DescribeVpcs")).unwrap();
        let set = described.get("vpcSet").unwrap().as_list().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].get_str("vpcId"), Some(id.as_str()));

        delete_vpc(&store, &req(&format!("Action=DeleteVpc&VpcId={}", id))).unwrap();
        let after = describe_vpcs(&store, &req("Action=DescribeVpcs")).unwrap();
        assert!(after.get("vpcSet").unwrap().as_list().unwrap().is_empty());
    }

    #[test]
    fn create_provisions_default_group_and_main_route_table() {
        let store = SharedStore::new();
        create_vpc(&store, &req("Action=CreateVpc&CidrBlock=10.0.0.0/16")).unwrap();
        let guard = store.0.lock();
        let sgs = guard.list(ResourceType::SecurityGroup);
        assert_eq!(sgs.len(), 1);
        assert_eq!(sgs[0].attr_str("groupName"), Some("default"));
        assert!(sgs[0].implicit);
        let rtbs = guard.list(ResourceType::RouteTable);
        assert_eq!(rtbs.len(), 1);
        assert_eq!(rtbs[0].attr("main").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn describe_unknown_id_is_typed_not_found() {
        let store = SharedStore::new();
        let err = describe_vpcs(&store, &req("Action=DescribeVpcs&VpcId.1=vpc-00000000000000000")).unwrap_err();
        assert_eq!(err.code_str(), "InvalidVpcID.NotFound");
    }

    #[test]
    fn create_rejects_bad_cidr() {
        let store = SharedStore::new();
        assert!(create_vpc(&store, &req("Action=CreateVpc&CidrBlock=10.0.0.0/8")).is_err());
        let err = create_vpc(&store, &req("Action=CreateVpc")).unwrap_err();
        assert_eq!(err.code_str(), "MissingParameter");
    }

    #[test]
    fn filter_by_cidr_and_tag() {
        let store = SharedStore::new();
        create_vpc(
            &store,
            &req("Action=CreateVpc&CidrBlock=10.0.0.0/16&TagSpecification.1.ResourceType=vpc&TagSpecification.1.Tag.1.Key=Name&TagSpecification.1.Tag.1.Value=main"),
        )
        .unwrap();
        create_vpc(&store, &req("Action=CreateVpc&CidrBlock=172.16.0.0/16")).unwrap();

        let out = describe_vpcs(&store, &req("Action=DescribeVpcs&Filter.1.Name=cidr-block&Filter.1.Value.1=10.0.0.0/16")).unwrap();
        assert_eq!(out.get("vpcSet").unwrap().as_list().unwrap().len(), 1);

        let out = describe_vpcs(&store, &req("Action=DescribeVpcs&Filter.1.Name=tag:Name&Filter.1.Value.1=main")).unwrap();
        let set = out.get("vpcSet").unwrap().as_list().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].get_str("cidrBlock"), Some("10.0.0.0/16"));
    }
}
