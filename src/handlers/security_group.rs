//! Security group actions. Ingress rules accept both the structured
//! `IpPermissions.N` tree and the legacy flat `IpProtocol`/`FromPort`/
//! `ToPort`/`CidrIp` parameter form.

use crate::error::{ApiError, ApiResult};
use crate::filter;
use crate::gateway::ActionRequest;
use crate::store::{Resource, SharedStore};
use crate::types::ResourceType;
use crate::value::Value;

use super::{base_view, ret_true, tags_from_spec};

pub fn create_security_group(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let name = req.require_str("GroupName")?;
    let description = req.param_str("GroupDescription").unwrap_or_default();
    let tags = tags_from_spec(req, ResourceType::SecurityGroup)?;

    let mut attrs = Value::empty_map();
    attrs.set("groupName", Value::str(name));
    attrs.set("groupDescription", Value::str(description));
    if let Some(vpc_id) = req.param_str("VpcId") {
        attrs.set("vpcId", Value::str(vpc_id));
    }
    attrs.set("ipPermissions", Value::List(vec![]));

    let sg = store.0.lock().create(ResourceType::SecurityGroup, attrs, tags)?;
    let mut body = Value::empty_map();
    body.set("groupId", Value::str(&sg.id));
    body.set("return", Value::Bool(true));
    Ok(body)
}

pub fn authorize_security_group_ingress(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let group_id = req.require_str("GroupId")?;
    let new_rules = parse_permissions(req)?;
    if new_rules.is_empty() {
        return Err(ApiError::missing_parameter("IpPermissions"));
    }

    store.0.lock().update(ResourceType::SecurityGroup, group_id, move |r| {
        let mut rules = match r.attributes.take("ipPermissions") {
            Some(Value::List(items)) => items,
            _ => Vec::new(),
        };
        rules.extend(new_rules);
        r.attributes.set("ipPermissions", Value::List(rules));
        Ok(())
    })?;
    Ok(ret_true())
}

pub fn describe_security_groups(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let filters = filter::parse_filters(&req.params)?;
    let ids = req.str_list("GroupId");

    let guard = store.0.lock();
    let resources = if ids.is_empty() {
        guard.list(ResourceType::SecurityGroup)
    } else {
        ids.iter()
            .map(|id| guard.get_cloned(ResourceType::SecurityGroup, id))
            .collect::<ApiResult<Vec<_>>>()?
    };
    drop(guard);

    let kept = filter::filter_resources(resources, &filters);
    let mut body = Value::empty_map();
    body.set("securityGroupInfo", Value::List(kept.iter().map(sg_view).collect()));
    Ok(body)
}

pub fn delete_security_group(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let id = req.require_str("GroupId")?;
    let mut guard = store.0.lock();
    let sg = guard.get(ResourceType::SecurityGroup, id)?;
    if sg.implicit {
        return Err(ApiError::validation(
            "CannotDelete",
            "the default security group of a VPC cannot be deleted",
        ));
    }
    guard.delete(ResourceType::SecurityGroup, id)?;
    Ok(ret_true())
}

/// Ingress rules from either request form, normalized to the wire view shape.
fn parse_permissions(req: &ActionRequest) -> ApiResult<Vec<Value>> {
    if let Some(perms) = req.param("IpPermissions") {
        let perms = perms
            .as_list()
            .ok_or_else(|| ApiError::malformed("IpPermissions must be a list"))?;
        let mut out = Vec::with_capacity(perms.len());
        for p in perms {
            let mut rule = Value::empty_map();
            rule.set("ipProtocol", Value::str(p.get_str("IpProtocol").unwrap_or("-1")));
            if let Some(from) = p.get_i64("FromPort") {
                rule.set("fromPort", Value::Int(from));
            }
            if let Some(to) = p.get_i64("ToPort") {
                rule.set("toPort", Value::Int(to));
            }
            let ranges = p
                .get("IpRanges")
                .and_then(|r| r.as_list())
                .unwrap_or_default()
                .iter()
                .filter_map(|r| r.get_str("CidrIp"))
                .map(|cidr| {
                    let mut m = Value::empty_map();
                    m.set("cidrIp", Value::str(cidr));
                    m
                })
                .collect();
            rule.set("ipRanges", Value::List(ranges));
            out.push(rule);
        }
        return Ok(out);
    }

    // flat legacy form
    let Some(protocol) = req.param_str("IpProtocol") else { return Ok(Vec::new()) };
    let mut rule = Value::empty_map();
    rule.set("ipProtocol", Value::str(protocol));
    if let Some(from) = req.params.get_i64("FromPort") {
        rule.set("fromPort", Value::Int(from));
    }
    if let Some(to) = req.params.get_i64("ToPort") {
        rule.set("toPort", Value::Int(to));
    }
    let ranges = match req.param_str("CidrIp") {
        Some(cidr) => {
            let mut m = Value::empty_map();
            m.set("cidrIp", Value::str(cidr));
            vec![m]
        }
        None => vec![],
    };
    rule.set("ipRanges", Value::List(ranges));
    Ok(vec![rule])
}

fn sg_view(r: &Resource) -> Value {
    let mut v = base_view(r);
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
    fn create_and_describe_by_name() {
        let store = SharedStore::new();
        let vpc_id = make_vpc(&store);
        let out = create_security_group(
            &store,
            &req(&format!("Action=CreateSecurityGroup&GroupName=web&GroupDescription=web+servers&VpcId={}", vpc_id)),
        )
        .unwrap();
        let group_id = out.get_str("groupId").unwrap().to_string();
        assert!(group_id.starts_with("sg-"));

        let out = describe_security_groups(
            &store,
            &req("Action=DescribeSecurityGroups&Filter.1.Name=group-name&Filter.1.Value.1=web"),
        )
        .unwrap();
        let set = out.get("securityGroupInfo").unwrap().as_list().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].get_str("groupId"), Some(group_id.as_str()));
        assert_eq!(set[0].get_str("groupDescription"), Some("web servers"));
    }

    #[test]
    fn authorize_ingress_structured_and_flat() {
        let store = SharedStore::new();
        let out = create_security_group(&store, &req("Action=CreateSecurityGroup&GroupName=web")).unwrap();
        let gid = out.get_str("groupId").unwrap().to_string();

        authorize_security_group_ingress(
            &store,
            &req(&format!(
                "Action=AuthorizeSecurityGroupIngress&GroupId={}&IpPermissions.1.IpProtocol=tcp&IpPermissions.1.FromPort=80&IpPermissions.1.ToPort=80&IpPermissions.1.IpRanges.1.CidrIp=0.0.0.0/0",
                gid
            )),
        )
        .unwrap();
        authorize_security_group_ingress(
            &store,
            &req(&format!(
                "Action=AuthorizeSecurityGroupIngress&GroupId={}&IpProtocol=tcp&FromPort=22&ToPort=22&CidrIp=10.0.0.0/8",
                gid
            )),
        )
        .unwrap();

        let guard = store.0.lock();
        let sg = guard.get(ResourceType::SecurityGroup, &gid).unwrap();
        let rules = sg.attr("ipPermissions").unwrap().as_list().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].get_i64("fromPort"), Some(80));
        assert_eq!(rules[1].get_i64("fromPort"), Some(22));
        assert_eq!(
            rules[1].get("ipRanges").unwrap().as_list().unwrap()[0].get_str("cidrIp"),
            Some("10.0.0.0/8")
        );
    }

    #[test]
    fn authorize_without_rules_is_missing_parameter() {
        let store = SharedStore::new();
        let out = create_security_group(&store, &req("Action=CreateSecurityGroup&GroupName=web")).unwrap();
        let gid = out.get_str("groupId").unwrap().to_string();
        let err = authorize_security_group_ingress(
            &store,
            &req(&format!("Action=AuthorizeSecurityGroupIngress&GroupId={}", gid)),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "MissingParameter");
    }

    #[test]
    fn default_group_cannot_be_deleted() {
        let store = SharedStore::new();
        make_vpc(&store);
        let guard = store.0.lock();
        let default_id = guard.list(ResourceType::SecurityGroup)[0].id.clone();
        drop(guard);

        let err = delete_security_group(&store, &req(&format!("Action=DeleteSecurityGroup&GroupId={}", default_id)))
            .unwrap_err();
        assert_eq!(err.code_str(), "CannotDelete");
    }
}
