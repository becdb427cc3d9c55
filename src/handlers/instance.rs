//! Instance actions. The emulator has no background state machine: launched
//! instances are `running` immediately, stop/start/terminate transition in
//! one step. Instances are grouped into reservations, and DescribeInstances
//! reports one reservation entry per launch call.

use crate::error::{ApiError, ApiResult};
use crate::filter;
use crate::gateway::ActionRequest;
use crate::store::{random_hex, Resource, SharedStore};
use crate::types::ResourceType;
use crate::value::Value;

use super::{base_view, created_at_str, tags_from_spec, DEFAULT_AZ, OWNER_ID};

/// Provider numeric codes for instance states.
fn state_code(name: &str) -> i64 {
    match name {
        "pending" => 0,
        "running" => 16,
        "shutting-down" => 32,
        "terminated" => 48,
        "stopping" => 64,
        "stopped" => 80,
        _ => 0,
    }
}

pub fn run_instances(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let image_id = req.require_str("ImageId")?;
    if !image_id.starts_with("ami-") {
        return Err(ApiError::validation(
            "InvalidAMIID.Malformed",
            format!("Invalid id: \"{}\" (expecting \"ami-...\")", image_id),
        ));
    }
    let instance_type = req.param_str("InstanceType").unwrap_or("m1.small");
    let min_count = req.params.get_i64("MinCount").unwrap_or(1);
    let max_count = req.params.get_i64("MaxCount").unwrap_or(1);
    if min_count < 1 || max_count < min_count {
        return Err(ApiError::validation(
            "InvalidParameterValue",
            format!("invalid instance count range {}..{}", min_count, max_count),
        ));
    }
    let tags = tags_from_spec(req, ResourceType::Instance)?;
    let sg_ids = req.str_list("SecurityGroupId");

    let mut guard = store.0.lock();
    // a subnet pins the instance into that subnet's vpc
    let vpc_id = match req.param_str("SubnetId") {
        Some(subnet_id) => {
            let subnet = guard.get(ResourceType::Subnet, subnet_id)?;
            subnet.attr_str("vpcId").map(|s| s.to_string())
        }
        None => None,
    };

    let reservation_id = format!("r-{}", random_hex(17));
    let mut instances = Vec::with_capacity(max_count as usize);
    for launch_index in 0..max_count {
        let mut attrs = Value::empty_map();
        attrs.set("imageId", Value::str(image_id));
        attrs.set("instanceType", Value::str(instance_type));
        attrs.set("amiLaunchIndex", Value::Int(launch_index));
        attrs.set("reservationId", Value::str(&reservation_id));
        attrs.set("rootDeviceType", Value::str("ebs"));
        let mut placement = Value::empty_map();
        let az = req
            .params
            .get_path("Placement.AvailabilityZone")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_AZ);
        placement.set("availabilityZone", Value::str(az));
        attrs.set("placement", placement);
        if let Some(subnet_id) = req.param_str("SubnetId") {
            attrs.set("subnetId", Value::str(subnet_id));
        }
        if let Some(vpc) = &vpc_id {
            attrs.set("vpcId", Value::str(vpc));
        }
        if !sg_ids.is_empty() {
            attrs.set("securityGroupIds", Value::List(sg_ids.iter().map(Value::str).collect()));
        }
        let inst = guard.create(ResourceType::Instance, attrs, tags.clone())?;
        instances.push(inst);
    }
    drop(guard);

    let mut body = Value::empty_map();
    body.set("reservationId", Value::str(&reservation_id));
    body.set("ownerId", Value::str(OWNER_ID));
    body.set("groupSet", Value::List(vec![]));
    body.set("instancesSet", Value::List(instances.iter().map(instance_view).collect()));
    Ok(body)
}

pub fn describe_instances(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let filters = filter::parse_filters(&req.params)?;
    let ids = req.str_list("InstanceId");

    let guard = store.0.lock();
    let resources = if ids.is_empty() {
        guard.list(ResourceType::Instance)
    } else {
        ids.iter()
            .map(|id| guard.get_cloned(ResourceType::Instance, id))
            .collect::<ApiResult<Vec<_>>>()?
    };
    drop(guard);

    let kept = filter::filter_resources(resources, &filters);

    // one reservation entry per launch call, in first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<&Resource>> = std::collections::HashMap::new();
    for r in &kept {
        let rid = r.attr_str("reservationId").unwrap_or_default().to_string();
        if !groups.contains_key(&rid) {
            order.push(rid.clone());
        }
        groups.entry(rid).or_default().push(r);
    }

    let mut reservations = Vec::with_capacity(order.len());
    for rid in order {
        let members = &groups[&rid];
        let mut res = Value::empty_map();
        res.set("reservationId", Value::str(&rid));
        res.set("ownerId", Value::str(OWNER_ID));
        res.set("groupSet", Value::List(vec![]));
        res.set("instancesSet", Value::List(members.iter().map(|r| instance_view(r)).collect()));
        reservations.push(res);
    }

    let mut body = Value::empty_map();
    body.set("reservationSet", Value::List(reservations));
    Ok(body)
}

pub fn terminate_instances(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    transition(store, req, "terminated", &[])
}

pub fn stop_instances(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    transition(store, req, "stopped", &["terminated", "shutting-down"])
}

pub fn start_instances(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    transition(store, req, "running", &["terminated", "shutting-down"])
}

/// Shared stop/start/terminate shape: validate each id, flip the state, and
/// report previous/current state pairs.
fn transition(store: &SharedStore, req: &ActionRequest, target: &str, forbidden_from: &[&str]) -> ApiResult<Value> {
    let ids = req.str_list("InstanceId");
    if ids.is_empty() {
        return Err(ApiError::missing_parameter("InstanceId"));
    }

    let mut guard = store.0.lock();
    // validate all ids and source states before mutating any, so the action
    // is all-or-nothing
    let mut previous = Vec::with_capacity(ids.len());
    for id in &ids {
        let inst = guard.get(ResourceType::Instance, id)?;
        if forbidden_from.contains(&inst.state.as_str()) {
            return Err(ApiError::validation(
                "IncorrectInstanceState",
                format!("instance {} is in state '{}' and cannot transition to '{}'", id, inst.state, target),
            ));
        }
        previous.push(inst.state.clone());
    }

    let mut changes = Vec::with_capacity(ids.len());
    for (id, prev) in ids.iter().zip(previous) {
        // terminated instances release their network references so the
        // subnet/vpc/group they lived in can be deleted afterwards
        guard.update(ResourceType::Instance, id, |r| {
            r.state = target.to_string();
            if target == "terminated" {
                for field in ResourceType::Instance.reference_fields() {
                    r.attributes.take(field);
                }
            }
            Ok(())
        })?;
        let mut change = Value::empty_map();
        change.set("instanceId", Value::str(id));
        change.set("previousState", state_value(&prev));
        change.set("currentState", state_value(target));
        changes.push(change);
    }
    drop(guard);

    let mut body = Value::empty_map();
    body.set("instancesSet", Value::List(changes));
    Ok(body)
}

fn state_value(name: &str) -> Value {
    let mut m = Value::empty_map();
    m.set("code", Value::Int(state_code(name)));
    m.set("name", Value::str(name));
    m
}

fn instance_view(r: &Resource) -> Value {
    let mut v = base_view(r);
    v.take("reservationId");
    v.set("instanceState", state_value(&r.state));
    v.set("launchTime", Value::str(created_at_str(r)));
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

    fn launch(store: &SharedStore, extra: &str) -> Value {
        run_instances(store, &req(&format!("Action=RunInstances&ImageId=ami-12345678{}", extra))).unwrap()
    }

    #[test]
    fn run_launches_max_count_in_one_reservation() {
        let store = SharedStore::new();
        let out = launch(&store, "&MinCount=2&MaxCount=3&InstanceType=t2.micro");
        let rid = out.get_str("reservationId").unwrap().to_string();
        assert!(rid.starts_with("r-"));
        let set = out.get("instancesSet").unwrap().as_list().unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set[0].get_path("instanceState.name").and_then(|v| v.as_str()), Some("running"));
        assert_eq!(set[2].get_i64("amiLaunchIndex"), Some(2));

        let described = describe_instances(&store, &req("Action=DescribeInstances")).unwrap();
        let reservations = described.get("reservationSet").unwrap().as_list().unwrap();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].get_str("reservationId"), Some(rid.as_str()));
        assert_eq!(reservations[0].get("instancesSet").unwrap().as_list().unwrap().len(), 3);
    }

    #[test]
    fn invalid_image_id_is_rejected() {
        let store = SharedStore::new();
        let err = run_instances(&store, &req("Action=RunInstances&ImageId=bogus")).unwrap_err();
        assert_eq!(err.code_str(), "InvalidAMIID.Malformed");
    }

    #[test]
    fn describe_filters_by_instance_type() {
        let store = SharedStore::new();
        launch(&store, "&InstanceType=t2.micro");
        launch(&store, "&InstanceType=m5.large");

        let out = describe_instances(
            &store,
            &req("Action=DescribeInstances&Filter.1.Name=instance-type&Filter.1.Value.1=t2.micro&Filter.1.Value.2=t3.micro"),
        )
        .unwrap();
        let reservations = out.get("reservationSet").unwrap().as_list().unwrap();
        assert_eq!(reservations.len(), 1);
        let insts = reservations[0].get("instancesSet").unwrap().as_list().unwrap();
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].get_str("instanceType"), Some("t2.micro"));
    }

    #[test]
    fn stop_start_terminate_transitions() {
        let store = SharedStore::new();
        let out = launch(&store, "");
        let id = out.get("instancesSet").unwrap().as_list().unwrap()[0]
            .get_str("instanceId")
            .unwrap()
            .to_string();

        let stopped = stop_instances(&store, &req(&format!("Action=StopInstances&InstanceId.1={}", id))).unwrap();
        let change = &stopped.get("instancesSet").unwrap().as_list().unwrap()[0];
        assert_eq!(change.get_path("previousState.name").and_then(|v| v.as_str()), Some("running"));
        assert_eq!(change.get_path("currentState.name").and_then(|v| v.as_str()), Some("stopped"));
        assert_eq!(change.get_path("currentState.code").and_then(|v| v.as_i64()), Some(80));

        start_instances(&store, &req(&format!("Action=StartInstances&InstanceId.1={}", id))).unwrap();
        terminate_instances(&store, &req(&format!("Action=TerminateInstances&InstanceId.1={}", id))).unwrap();

        // terminated instances refuse stop/start
        let err = start_instances(&store, &req(&format!("Action=StartInstances&InstanceId.1={}", id))).unwrap_err();
        assert_eq!(err.code_str(), "IncorrectInstanceState");
    }

    #[test]
    fn terminate_releases_network_references() {
        let store = SharedStore::new();
        let out = crate::handlers::vpc::create_vpc(&store, &req("Action=CreateVpc&CidrBlock=10.0.0.0/16")).unwrap();
        let vpc_id = out.get_path("vpc.vpcId").unwrap().as_str().unwrap().to_string();
        let out = crate::handlers::subnet::create_subnet(
            &store,
            &req(&format!("Action=CreateSubnet&VpcId={}&CidrBlock=10.0.1.0/24", vpc_id)),
        )
        .unwrap();
        let subnet_id = out.get_path("subnet.subnetId").unwrap().as_str().unwrap().to_string();

        launch(&store, &format!("&SubnetId={}", subnet_id));

        // a running instance pins its subnet
        let err = crate::handlers::subnet::delete_subnet(
            &store,
            &req(&format!("Action=DeleteSubnet&SubnetId={}", subnet_id)),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "DependencyViolation");

        let described = describe_instances(&store, &req("Action=DescribeInstances")).unwrap();
        let id = described.get("reservationSet").unwrap().as_list().unwrap()[0]
            .get("instancesSet")
            .unwrap()
            .as_list()
            .unwrap()[0]
            .get_str("instanceId")
            .unwrap()
            .to_string();
        terminate_instances(&store, &req(&format!("Action=TerminateInstances&InstanceId.1={}", id))).unwrap();

        // terminated instance no longer blocks the subnet or the vpc
        crate::handlers::subnet::delete_subnet(
            &store,
            &req(&format!("Action=DeleteSubnet&SubnetId={}", subnet_id)),
        )
        .unwrap();
        crate::handlers::vpc::delete_vpc(&store, &req(&format!("Action=DeleteVpc&VpcId={}", vpc_id))).unwrap();
    }

    #[test]
    fn transition_is_all_or_nothing() {
        let store = SharedStore::new();
        let out = launch(&store, "");
        let good = out.get("instancesSet").unwrap().as_list().unwrap()[0]
            .get_str("instanceId")
            .unwrap()
            .to_string();

        let err = stop_instances(
            &store,
            &req(&format!("Action=StopInstances&InstanceId.1={}&InstanceId.2=i-00000000000000000", good)),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "InvalidInstanceID.NotFound");

        // the good instance is untouched
        let guard = store.0.lock();
        assert_eq!(guard.get(ResourceType::Instance, &good).unwrap().state, "running");
    }
}
