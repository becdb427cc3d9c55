//!
//! Shipped resource handlers
//! -------------------------
//! One module per resource type. Handlers are consumers of the store and
//! filter contracts: they validate resource-specific parameters, call the
//! store (never allocating ids or bypassing delete integrity), and shape the
//! resource-specific response body. The declared action table below is what
//! the registry validates against at boot.

use crate::error::{ApiError, ApiResult};
use crate::gateway::{ActionRequest, RegistryBuilder, EC2};
use crate::store::{Resource, Tag};
use crate::types::ResourceType;
use crate::value::Value;

pub mod instance;
pub mod internet_gateway;
pub mod route_table;
pub mod security_group;
pub mod subnet;
pub mod tags;
pub mod volume;
pub mod vpc;

/// Namespacing constants. Single-account, single-region emulation.
pub const OWNER_ID: &str = "123456789012";
pub const DEFAULT_AZ: &str = "us-east-1a";

/// Complete declared action surface of the shipped ec2 service.
pub const EC2_ACTIONS: &[&str] = &[
    "CreateVpc",
    "DescribeVpcs",
    "DeleteVpc",
    "CreateSubnet",
    "DescribeSubnets",
    "DeleteSubnet",
    "CreateInternetGateway",
    "AttachInternetGateway",
    "DetachInternetGateway",
    "DescribeInternetGateways",
    "DeleteInternetGateway",
    "CreateRouteTable",
    "DescribeRouteTables",
    "DeleteRouteTable",
    "CreateSecurityGroup",
    "AuthorizeSecurityGroupIngress",
    "DescribeSecurityGroups",
    "DeleteSecurityGroup",
    "RunInstances",
    "DescribeInstances",
    "TerminateInstances",
    "StopInstances",
    "StartInstances",
    "CreateVolume",
    "DescribeVolumes",
    "AttachVolume",
    "DetachVolume",
    "DeleteVolume",
    "CreateTags",
    "DeleteTags",
    "DescribeTags",
];

/// Wire every shipped handler into the registry. `Registry::build` then
/// verifies this covers the declared table.
pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .service(EC2)
        .declare("ec2", EC2_ACTIONS)
        .action("ec2", "CreateVpc", vpc::create_vpc)
        .action("ec2", "DescribeVpcs", vpc::describe_vpcs)
        .action("ec2", "DeleteVpc", vpc::delete_vpc)
        .action("ec2", "CreateSubnet", subnet::create_subnet)
        .action("ec2", "DescribeSubnets", subnet::describe_subnets)
        .action("ec2", "DeleteSubnet", subnet::delete_subnet)
        .action("ec2", "CreateInternetGateway", internet_gateway::create_internet_gateway)
        .action("ec2", "AttachInternetGateway", internet_gateway::attach_internet_gateway)
        .action("ec2", "DetachInternetGateway", internet_gateway::detach_internet_gateway)
        .action("ec2", "DescribeInternetGateways", internet_gateway::describe_internet_gateways)
        .action("ec2", "DeleteInternetGateway", internet_gateway::delete_internet_gateway)
        .action("ec2", "CreateRouteTable", route_table::create_route_table)
        .action("ec2", "DescribeRouteTables", route_table::describe_route_tables)
        .action("ec2", "DeleteRouteTable", route_table::delete_route_table)
        .action("ec2", "CreateSecurityGroup", security_group::create_security_group)
        .action("ec2", "AuthorizeSecurityGroupIngress", security_group::authorize_security_group_ingress)
        .action("ec2", "DescribeSecurityGroups", security_group::describe_security_groups)
        .action("ec2", "DeleteSecurityGroup", security_group::delete_security_group)
        .action("ec2", "RunInstances", instance::run_instances)
        .action("ec2", "DescribeInstances", instance::describe_instances)
        .action("ec2", "TerminateInstances", instance::terminate_instances)
        .action("ec2", "StopInstances", instance::stop_instances)
        .action("ec2", "StartInstances", instance::start_instances)
        .action("ec2", "CreateVolume", volume::create_volume)
        .action("ec2", "DescribeVolumes", volume::describe_volumes)
        .action("ec2", "AttachVolume", volume::attach_volume)
        .action("ec2", "DetachVolume", volume::detach_volume)
        .action("ec2", "DeleteVolume", volume::delete_volume)
        .action("ec2", "CreateTags", tags::create_tags)
        .action("ec2", "DeleteTags", tags::delete_tags)
        .action("ec2", "DescribeTags", tags::describe_tags)
}

/// Tags destined for this resource type, read from the decoded
/// `TagSpecification.N.Tag.M` tree. Specs naming other types are ignored.
pub(crate) fn tags_from_spec(req: &ActionRequest, rtype: ResourceType) -> ApiResult<Vec<Tag>> {
    let Some(specs) = req.param("TagSpecification") else { return Ok(Vec::new()) };
    let specs = specs
        .as_list()
        .ok_or_else(|| ApiError::malformed("TagSpecification must be a list"))?;
    let mut out = Vec::new();
    for spec in specs {
        let target = spec
            .get_str("ResourceType")
            .ok_or_else(|| ApiError::malformed("TagSpecification entry is missing ResourceType"))?;
        if target != rtype.wire_name() {
            continue;
        }
        for tag in spec.get("Tag").and_then(|t| t.as_list()).unwrap_or_default() {
            let key = tag
                .get_str("Key")
                .ok_or_else(|| ApiError::malformed("Tag entry is missing Key"))?;
            let value = tag.get_str("Value").unwrap_or_default();
            out.push(Tag::new(key, value));
        }
    }
    Ok(out)
}

/// Render a tag set in the wire's `tagSet` shape.
pub(crate) fn tag_set_value(tags: &[Tag]) -> Value {
    Value::List(
        tags.iter()
            .map(|t| {
                let mut m = Value::empty_map();
                m.set("key", Value::str(&t.key));
                m.set("value", Value::str(&t.value));
                m
            })
            .collect(),
    )
}

/// Base wire view of a resource: its attribute tree plus tagSet.
pub(crate) fn base_view(r: &Resource) -> Value {
    let mut v = r.attributes.clone();
    v.set("tagSet", tag_set_value(&r.tags));
    v
}

/// ISO-8601 creation timestamp in the provider's millisecond form.
pub(crate) fn created_at_str(r: &Resource) -> String {
    r.created_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// The boolean-result body shared by delete/attach style actions.
pub(crate) fn ret_true() -> Value {
    let mut body = Value::empty_map();
    body.set("return", Value::Bool(true));
    body
}

/// Validate a dotted-quad CIDR block with a prefix length inside the allowed
/// range. The provider rejects bad blocks with InvalidParameterValue.
pub(crate) fn validate_cidr(cidr: &str, min_len: u8, max_len: u8) -> ApiResult<(u32, u8)> {
    let invalid = || ApiError::validation("InvalidParameterValue", format!("invalid CIDR block: {}", cidr));
    let (addr, len) = cidr.split_once('/').ok_or_else(invalid)?;
    let len: u8 = len.parse().map_err(|_| invalid())?;
    if len < min_len || len > max_len {
        return Err(ApiError::validation(
            "InvalidVpc.Range",
            format!("The CIDR '{}' is invalid; block size must be between /{} and /{}", cidr, min_len, max_len),
        ));
    }
    let octets: Vec<&str> = addr.split('.').collect();
    if octets.len() != 4 {
        return Err(invalid());
    }
    let mut ip: u32 = 0;
    for o in octets {
        let b: u8 = o.parse().map_err(|_| invalid())?;
        ip = (ip << 8) | b as u32;
    }
    Ok((ip, len))
}

/// Number of usable addresses the provider reports for a subnet block (five
/// addresses are reserved per subnet).
pub(crate) fn available_ip_count(prefix_len: u8) -> i64 {
    let total: i64 = 1i64 << (32 - prefix_len as i64);
    (total - 5).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_validation() {
        assert!(validate_cidr("10.0.0.0/16", 16, 28).is_ok());
        assert!(validate_cidr("10.0.0.0", 16, 28).is_err());
        assert!(validate_cidr("10.0.0.0/8", 16, 28).is_err());
        assert!(validate_cidr("10.0.0.0/33", 16, 28).is_err());
        assert!(validate_cidr("10.0.256.0/24", 16, 28).is_err());
        assert!(validate_cidr("banana/24", 16, 28).is_err());
    }

    #[test]
    fn available_ips_reserved() {
        assert_eq!(available_ip_count(24), 251);
        assert_eq!(available_ip_count(28), 11);
    }

    #[test]
    fn tag_spec_filters_by_resource_type() {
        let mut tag = Value::empty_map();
        tag.set("Key", Value::str("Name"));
        tag.set("Value", Value::str("main"));
        let mut spec_vpc = Value::empty_map();
        spec_vpc.set("ResourceType", Value::str("vpc"));
        spec_vpc.set("Tag", Value::List(vec![tag]));
        let mut spec_other = Value::empty_map();
        spec_other.set("ResourceType", Value::str("volume"));
        let mut params = Value::empty_map();
        params.set("TagSpecification", Value::List(vec![spec_vpc, spec_other]));

        let req = ActionRequest { action: "CreateVpc".into(), params };
        let tags = tags_from_spec(&req, ResourceType::Vpc).unwrap();
        assert_eq!(tags, vec![Tag::new("Name", "main")]);
        let none = tags_from_spec(&req, ResourceType::Subnet).unwrap();
        assert!(none.is_empty());
    }
}
