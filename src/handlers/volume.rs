//! Volume actions. Volumes attach to at most one instance; the attachment is
//! recorded both as an `instanceId` reference (so the instance cannot be
//! deleted out from under it) and as an `attachmentSet` entry in the view.

use crate::error::{ApiError, ApiResult};
use crate::filter;
use crate::gateway::ActionRequest;
use crate::store::{Resource, SharedStore};
use crate::types::ResourceType;
use crate::value::Value;

use super::{base_view, created_at_str, ret_true, tags_from_spec, DEFAULT_AZ};

pub fn create_volume(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let size = req
        .params
        .get_i64("Size")
        .ok_or_else(|| ApiError::missing_parameter("Size"))?;
    if size < 1 {
        return Err(ApiError::validation(
            "InvalidParameterValue",
            format!("Volume size must be positive, got {}", size),
        ));
    }
    let az = req.param_str("AvailabilityZone").unwrap_or(DEFAULT_AZ);
    let volume_type = req.param_str("VolumeType").unwrap_or("gp2");
    let tags = tags_from_spec(req, ResourceType::Volume)?;

    let mut attrs = Value::empty_map();
    attrs.set("size", Value::Int(size));
    attrs.set("availabilityZone", Value::str(az));
    attrs.set("volumeType", Value::str(volume_type));
    attrs.set("encrypted", Value::Bool(false));
    attrs.set("attachmentSet", Value::List(vec![]));

    let mut guard = store.0.lock();
    let vol = guard.create(ResourceType::Volume, attrs, tags)?;
    Ok(volume_view(&vol))
}

pub fn describe_volumes(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let filters = filter::parse_filters(&req.params)?;
    let ids = req.str_list("VolumeId");

    let guard = store.0.lock();
    let resources = if ids.is_empty() {
        guard.list(ResourceType::Volume)
    } else {
        ids.iter()
            .map(|id| guard.get_cloned(ResourceType::Volume, id))
            .collect::<ApiResult<Vec<_>>>()?
    };
    drop(guard);

    let kept = filter::filter_resources(resources, &filters);
    let mut body = Value::empty_map();
    body.set("volumeSet", Value::List(kept.iter().map(volume_view).collect()));
    Ok(body)
}

pub fn attach_volume(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let volume_id = req.require_str("VolumeId")?;
    let instance_id = req.require_str("InstanceId")?;
    let device = req.require_str("Device")?;

    let mut guard = store.0.lock();
    guard.get(ResourceType::Instance, instance_id)?;
    let vol = guard.get(ResourceType::Volume, volume_id)?;
    if vol.state != "available" {
        return Err(ApiError::validation(
            "VolumeInUse",
            format!("vol {} is in state '{}' and cannot be attached", volume_id, vol.state),
        ));
    }

    let attachment = attachment_entry(volume_id, instance_id, device, "attached");
    let entry = attachment.clone();
    guard.update(ResourceType::Volume, volume_id, move |r| {
        r.attributes.set("instanceId", Value::str(instance_id));
        r.attributes.set("device", Value::str(device));
        r.attributes.set("attachmentSet", Value::List(vec![entry.clone()]));
        r.state = "in-use".to_string();
        Ok(())
    })?;
    Ok(attachment)
}

pub fn detach_volume(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let volume_id = req.require_str("VolumeId")?;

    let mut guard = store.0.lock();
    let vol = guard.get(ResourceType::Volume, volume_id)?;
    if vol.state != "in-use" {
        return Err(ApiError::validation(
            "IncorrectState",
            format!("vol {} is not attached", volume_id),
        ));
    }
    let instance_id = vol.attr_str("instanceId").unwrap_or_default().to_string();
    let device = vol.attr_str("device").unwrap_or_default().to_string();

    guard.update(ResourceType::Volume, volume_id, |r| {
        r.attributes.take("instanceId");
        r.attributes.take("device");
        r.attributes.set("attachmentSet", Value::List(vec![]));
        r.state = "available".to_string();
        Ok(())
    })?;
    Ok(attachment_entry(volume_id, &instance_id, &device, "detached"))
}

pub fn delete_volume(store: &SharedStore, req: &ActionRequest) -> ApiResult<Value> {
    let volume_id = req.require_str("VolumeId")?;
    let mut guard = store.0.lock();
    let vol = guard.get(ResourceType::Volume, volume_id)?;
    if vol.state == "in-use" {
        return Err(ApiError::validation(
            "VolumeInUse",
            format!("Volume {} is currently attached", volume_id),
        ));
    }
    guard.delete(ResourceType::Volume, volume_id)?;
    Ok(ret_true())
}

fn attachment_entry(volume_id: &str, instance_id: &str, device: &str, status: &str) -> Value {
    let mut m = Value::empty_map();
    m.set("volumeId", Value::str(volume_id));
    m.set("instanceId", Value::str(instance_id));
    m.set("device", Value::str(device));
    m.set("status", Value::str(status));
    m
}

/// Volume views use `status` rather than `state`, matching the wire shape.
fn volume_view(r: &Resource) -> Value {
    let mut v = base_view(r);
    v.set("volumeId", Value::str(&r.id));
    v.set("status", Value::str(&r.state));
    v.set("createTime", Value::str(created_at_str(r)));
    v
}
