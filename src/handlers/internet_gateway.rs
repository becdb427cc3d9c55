//! Internet gateway actions. The gateway's attachment is modeled as its
//! `vpcId` reference attribute, so the store's reference index keeps an
//! attached vpc from being deleted out from under it.

use crate::error::{ApiError, ApiResult};
use crate::filter;
use crate::gateway::ActionRequest;
use crate::store::{Resource, SharedStore};
use crate::types::ResourceType;
use crate::value::Value;

use super::{base_view, ret_true, tags_from_spec};

pub fn create_internet_gateway(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let tags = tags_from_spec(req, ResourceType::InternetGateway)?;
    let mut attrs = Value::empty_map();
    attrs.set("attachmentSet", Value::List(vec![]));
    let igw = store.0.lock().create(ResourceType::InternetGateway, attrs, tags)?;
    let mut body = Value::empty_map();
    body.set("internetGateway", igw_view(&igw));
    Ok(body)
}

pub fn attach_internet_gateway(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let igw_id = req.require_str("InternetGatewayId")?;
    let vpc_id = req.require_str("VpcId")?.to_string();

    let mut guard = store.0.lock();
    guard.get(ResourceType::Vpc, &vpc_id)?;
    let current = guard.get(ResourceType::InternetGateway, igw_id)?;
    if current.attr_str("vpcId").is_some() {
        return Err(ApiError::validation(
            "Resource.AlreadyAssociated",
            format!("internet gateway {} is already attached", igw_id),
        ));
    }
    guard.update(ResourceType::InternetGateway, igw_id, move |r| {
        let mut attachment = Value::empty_map();
        attachment.set("vpcId", Value::str(&vpc_id));
        attachment.set("state", Value::str("available"));
        r.attributes.set("vpcId", Value::str(&vpc_id));
        r.attributes.set("attachmentSet", Value::List(vec![attachment]));
        Ok(())
    })?;
    Ok(ret_true())
}

pub fn detach_internet_gateway(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let igw_id = req.require_str("InternetGatewayId")?;
    let vpc_id = req.require_str("VpcId")?;

    let mut guard = store.0.lock();
    let current = guard.get(ResourceType::InternetGateway, igw_id)?;
    if current.attr_str("vpcId") != Some(vpc_id) {
        return Err(ApiError::validation(
            "Gateway.NotAttached",
            format!("internet gateway {} is not attached to vpc {}", igw_id, vpc_id),
        ));
    }
    guard.update(ResourceType::InternetGateway, igw_id, |r| {
        r.attributes.take("vpcId");
        r.attributes.set("attachmentSet", Value::List(vec![]));
        Ok(())
    })?;
    Ok(ret_true())
}

pub fn describe_internet_gateways(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let filters = filter::parse_filters(&req.params)?;
    let ids = req.str_list("InternetGatewayId");

    let guard = store.0.lock();
    let resources = if ids.is_empty() {
        guard.list(ResourceType::InternetGateway)
    } else {
        ids.iter()
            .map(|id| guard.get_cloned(ResourceType::InternetGateway, id))
            .collect::<ApiResult<Vec<_>>>()?
    };
    drop(guard);

    let kept = filter::filter_resources(resources, &filters);
    let mut body = Value::empty_map();
    body.set("internetGatewaySet", Value::List(kept.iter().map(igw_view).collect()));
    Ok(body)
}

pub fn delete_internet_gateway(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let id = req.require_str("InternetGatewayId")?;
    let mut guard = store.0.lock();
    let current = guard.get(ResourceType::InternetGateway, id)?;
    if current.attr_str("vpcId").is_some() {
        return Err(ApiError::dependency(format!(
            "The internetGateway '{}' has dependencies and cannot be deleted.",
            id
        )));
    }
    guard.delete(ResourceType::InternetGateway, id)?;
    Ok(ret_true())
}

fn igw_view(r: &Resource) -> Value {
    // the attachment already carries the vpc id; the bare reference attribute
    // stays out of the wire view
    let mut v = base_view(r);
    v.take("vpcId");
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

    fn setup(store: &SharedStore) -> (String, String) {
        let vpc = create_vpc(store, &req("Action=CreateVpc&CidrBlock=10.0.0.0/16")).unwrap();
        let vpc_id = vpc.get_path("vpc.vpcId").unwrap().as_str().unwrap().to_string();
        let igw = create_internet_gateway(store, &req("Action=CreateInternetGateway")).unwrap();
        let igw_id = igw
            .get_path("internetGateway.internetGatewayId")
            .unwrap()
            .as_str()
            .unwrap()
            .to_string();
        (vpc_id, igw_id)
    }

    #[test]
    fn attach_detach_cycle() {
        let store = SharedStore::new();
        let (vpc_id, igw_id) = setup(&store);

        attach_internet_gateway(
            &store,
            &req(&format!("Action=AttachInternetGateway&InternetGatewayId={}&VpcId={}", igw_id, vpc_id)),
        )
        .unwrap();

        // double attach rejected
        let err = attach_internet_gateway(
            &store,
            &req(&format!("Action=AttachInternetGateway&InternetGatewayId={}&VpcId={}", igw_id, vpc_id)),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "Resource.AlreadyAssociated");

        // attached gateway blocks both vpc delete and its own delete
        let err = store.0.lock().delete(ResourceType::Vpc, &vpc_id).unwrap_err();
        assert_eq!(err.code_str(), "DependencyViolation");
        let err = delete_internet_gateway(
            &store,
            &req(&format!("Action=DeleteInternetGateway&InternetGatewayId={}", igw_id)),
        )
        .unwrap_err();
        assert_eq!(err.code_str(), "DependencyViolation");

        detach_internet_gateway(
            &store,
            &req(&format!("Action=DetachInternetGateway&InternetGatewayId={}&VpcId={}", igw_id, vpc_id)),
        )
        .unwrap();
        delete_internet_gateway(
            &store,
            &req(&format!("Action=DeleteInternetGateway&InternetGatewayId={}", igw_id)),
        )
        .unwrap();
        store.0.lock().delete(ResourceType::Vpc, &vpc_id).unwrap();
    }

    #[test]
    fn describe_filters_by_attached_vpc() {
        let store = SharedStore::new();
        let (vpc_id, igw_id) = setup(&store);
        attach_internet_gateway(
            &store,
            &req(&format!("Action=AttachInternetGateway&InternetGatewayId={}&VpcId={}", igw_id, vpc_id)),
        )
        .unwrap();

        let out = describe_internet_gateways(
            &store,
            &req(&format!(
                "Action=DescribeInternetGateways&Filter.1.Name=attachment.vpc-id&Filter.1.Value.1={}",
                vpc_id
            )),
        )
        .unwrap();
        let set = out.get("internetGatewaySet").unwrap().as_list().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].get_str("internetGatewayId"), Some(igw_id.as_str()));
    }
}
