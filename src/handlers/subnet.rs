//! Subnet actions.

use crate::error::ApiResult;
use crate::filter;
use crate::gateway::ActionRequest;
use crate::store::{Resource, SharedStore};
use crate::types::ResourceType;
use crate::value::Value;

use super::{available_ip_count, base_view, ret_true, tags_from_spec, validate_cidr, DEFAULT_AZ};

pub fn create_subnet(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let vpc_id = req.require_str("VpcId")?;
    let cidr = req.require_str("CidrBlock")?;
    let (_, prefix_len) = validate_cidr(cidr, 16, 28)?;
    let az = req.param_str("AvailabilityZone").unwrap_or(DEFAULT_AZ);
    let tags = tags_from_spec(req, ResourceType::Subnet)?;

    let mut attrs = Value::empty_map();
    attrs.set("vpcId", Value::str(vpc_id));
    attrs.set("cidrBlock", Value::str(cidr));
    attrs.set("availabilityZone", Value::str(az));
    attrs.set("availableIpAddressCount", Value::Int(available_ip_count(prefix_len)));
    attrs.set("mapPublicIpOnLaunch", Value::Bool(false));
    attrs.set("defaultForAz", Value::Bool(false));

    let subnet = store.0.lock().create(ResourceType::Subnet, attrs, tags)?;
    let mut body = Value::empty_map();
    body.set("subnet", subnet_view(&subnet));
    Ok(body)
}

pub fn describe_subnets(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let filters = filter::parse_filters(&req.params)?;
    let ids = req.str_list("SubnetId");

    let guard = store.0.lock();
    let resources = if ids.is_empty() {
        guard.list(ResourceType::Subnet)
    } else {
        ids.iter()
            .map(|id| guard.get_cloned(ResourceType::Subnet, id))
            .collect::<ApiResult<Vec<_>>>()?
    };
    drop(guard);

    let kept = filter::filter_resources(resources, &filters);
    let mut body = Value::empty_map();
    body.set("subnetSet", Value::List(kept.iter().map(subnet_view).collect()));
    Ok(body)
}

pub fn delete_subnet(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let id = req.require_str("SubnetId")?;
    store.0.lock().delete(ResourceType::Subnet, id)?;
    Ok(ret_true())
}

fn subnet_view(r: &Resource) -> Value {
    let mut v = base_view(r);
    v.set("state", Value::str(&r.state));
    v.set("ownerId", Value::str(super::OWNER_ID));
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::vpc::create_vpc;
    use crate::wire;

    fn req(body: &str) -> ActionRequest {
        let params = wire::decode_request(body).unwrap();
        ActionRequest { action: params.get_str("Action").unwrap_or_default().to_string(), params }
    }

    fn make_vpc(store: &SharedStore) -> String {
        let out = create_vpc(store, &req("Action=CreateVpc&CidrBlock=10.0.0.0/16")).unwrap();
        out.get_path("vpc.vpcId").unwrap().as_str().unwrap().to_string()
    }

    #[test]
    fn subnet_requires_existing_vpc() {
        let store = SharedStore::new();
        let err = create_subnet(
            &store,
            &req("Action=CreateSubnet&VpcId=vpc-00000000000000000&CidrBlock=10.0.1.0/24"),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "InvalidVpcID.NotFound");
    }

    #[test]
    fn subnet_blocks_vpc_delete_until_removed() {
        let store = SharedStore::new();
        let vpc_id = make_vpc(&store);
        let out = create_subnet(
            &store,
            &req(&format!("Action=CreateSubnet&VpcId={}&CidrBlock=10.0.1.0/24", vpc_id)),
        )
        .unwrap();
        let subnet_id = out.get_path("subnet.subnetId").unwrap().as_str().unwrap().to_string();
        assert_eq!(out.get_path("subnet.availabilityZone").and_then(|v| v.as_str()), Some(DEFAULT_AZ));
        assert_eq!(out.get_path("subnet.availableIpAddressCount").and_then(|v| v.as_i64()), Some(251));

        let err = store.0.lock().delete(ResourceType::Vpc, &vpc_id).unwrap_err();
        assert_eq!(err.code_str(), "DependencyViolation");

        delete_subnet(&store, &req(&format!("Action=DeleteSubnet&SubnetId={}", subnet_id))).unwrap();
        store.0.lock().delete(ResourceType::Vpc, &vpc_id).unwrap();
    }

    #[test]
    fn describe_filters_by_vpc() {
        let store = SharedStore::new();
        let vpc_a = make_vpc(&store);
        let vpc_b = make_vpc(&store);
        create_subnet(&store, &req(&format!("Action=CreateSubnet&VpcId={}&CidrBlock=10.0.1.0/24", vpc_a))).unwrap();
        create_subnet(&store, &req(&format!("Action=CreateSubnet&VpcId={}&CidrBlock=10.0.2.0/24", vpc_b))).unwrap();

        let out = describe_subnets(
            &store,
            &req(&format!("Action=DescribeSubnets&Filter.1.Name=vpc-id&Filter.1.Value.1={}", vpc_a)),
        )
        .unwrap();
        let set = out.get("subnetSet").unwrap().as_list().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].get_str("vpcId"), Some(vpc_a.as_str()));
    }
}
