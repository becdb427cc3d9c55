//!
//! Resource type table
//! -------------------
//! The closed set of emulated resource types and the per-type configuration
//! the store and gateway consult: id prefix and suffix form, state machine,
//! not-found error code, declared reference fields, and the cascade-delete
//! exception list. All of it lives here so the rest of the engine stays
//! type-agnostic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Vpc,
    Subnet,
    InternetGateway,
    RouteTable,
    SecurityGroup,
    Instance,
    Volume,
}

/// Provider id-suffix convention: legacy 8-hex or modern 17-hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdForm {
    Short8,
    Long17,
}

impl IdForm {
    pub fn hex_len(&self) -> usize {
        match self {
            IdForm::Short8 => 8,
            IdForm::Long17 => 17,
        }
    }
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        ResourceType::Vpc,
        ResourceType::Subnet,
        ResourceType::InternetGateway,
        ResourceType::RouteTable,
        ResourceType::SecurityGroup,
        ResourceType::Instance,
        ResourceType::Volume,
    ];

    /// Id prefix, e.g. `vpc` in `vpc-0a1b2c3d4e5f67890`.
    pub fn prefix(&self) -> &'static str {
        match self {
            ResourceType::Vpc => "vpc",
            ResourceType::Subnet => "subnet",
            ResourceType::InternetGateway => "igw",
            ResourceType::RouteTable => "rtb",
            ResourceType::SecurityGroup => "sg",
            ResourceType::Instance => "i",
            ResourceType::Volume => "vol",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<ResourceType> {
        ResourceType::ALL.iter().copied().find(|t| t.prefix() == prefix)
    }

    /// Resolve a full id like `subnet-0123...` to its type via the prefix table.
    pub fn from_id(id: &str) -> Option<ResourceType> {
        let prefix = id.rsplit_once('-').map(|(p, _)| p)?;
        ResourceType::from_prefix(prefix)
    }

    /// All shipped types use the modern long form; the short legacy form stays
    /// selectable here per the provider's convention.
    pub fn id_form(&self) -> IdForm {
        IdForm::Long17
    }

    /// Provider name used in tag and wire output, e.g. `security-group`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ResourceType::Vpc => "vpc",
            ResourceType::Subnet => "subnet",
            ResourceType::InternetGateway => "internet-gateway",
            ResourceType::RouteTable => "route-table",
            ResourceType::SecurityGroup => "security-group",
            ResourceType::Instance => "instance",
            ResourceType::Volume => "volume",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<ResourceType> {
        ResourceType::ALL.iter().copied().find(|t| t.wire_name() == name)
    }

    /// Attribute key under which the store mirrors the resource's own id, so
    /// filters like `vpc-id` resolve generically.
    pub fn id_attribute(&self) -> &'static str {
        match self {
            ResourceType::Vpc => "vpcId",
            ResourceType::Subnet => "subnetId",
            ResourceType::InternetGateway => "internetGatewayId",
            ResourceType::RouteTable => "routeTableId",
            ResourceType::SecurityGroup => "groupId",
            ResourceType::Instance => "instanceId",
            ResourceType::Volume => "volumeId",
        }
    }

    /// State a freshly created resource starts in. The emulator has no
    /// background state transitions, so instances start `running` and volumes
    /// `available` rather than passing through `pending`/`creating`.
    pub fn initial_state(&self) -> &'static str {
        match self {
            ResourceType::Instance => "running",
            _ => "available",
        }
    }

    pub fn valid_states(&self) -> &'static [&'static str] {
        match self {
            ResourceType::Vpc | ResourceType::Subnet => &["pending", "available"],
            ResourceType::InternetGateway => &["available"],
            ResourceType::RouteTable | ResourceType::SecurityGroup => &["available"],
            ResourceType::Instance => &["pending", "running", "stopping", "stopped", "shutting-down", "terminated"],
            ResourceType::Volume => &["creating", "available", "in-use", "deleting", "error"],
        }
    }

    /// Stable provider error code for a missing id of this type.
    pub fn not_found_code(&self) -> &'static str {
        match self {
            ResourceType::Vpc => "InvalidVpcID.NotFound",
            ResourceType::Subnet => "InvalidSubnetID.NotFound",
            ResourceType::InternetGateway => "InvalidInternetGatewayID.NotFound",
            ResourceType::RouteTable => "InvalidRouteTableID.NotFound",
            ResourceType::SecurityGroup => "InvalidGroup.NotFound",
            ResourceType::Instance => "InvalidInstanceID.NotFound",
            ResourceType::Volume => "InvalidVolume.NotFound",
        }
    }

    /// Attribute keys that hold ids of other managed resources. The store
    /// indexes exactly these on create/update; it never scans blindly.
    pub fn reference_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceType::Vpc => &[],
            ResourceType::Subnet => &["vpcId"],
            ResourceType::InternetGateway => &["vpcId"],
            ResourceType::RouteTable => &["vpcId"],
            ResourceType::SecurityGroup => &["vpcId"],
            ResourceType::Instance => &["vpcId", "subnetId", "securityGroupIds"],
            ResourceType::Volume => &["instanceId"],
        }
    }

    /// Cascade exception list: referencing types that do not block deletion of
    /// this type, provided the referencing resource was created implicitly by
    /// the emulator (a vpc's default security group and main route table).
    /// Everything else blocks with DependencyViolation.
    pub fn cascade_allowed_from(&self) -> &'static [ResourceType] {
        match self {
            ResourceType::Vpc => &[ResourceType::SecurityGroup, ResourceType::RouteTable],
            _ => &[],
        }
    }
}
