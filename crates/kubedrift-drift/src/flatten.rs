//! Resource → [`DriftRecord`] flattening.
//!
//! One pure function per resource kind; [`flatten`] dispatches on the
//! [`Resource`] variant.

use kubedrift_store::KeyError;
use serde::{Deserialize, Serialize};

use crate::record::{DriftRecord, FieldMap, NO_NAMESPACE, ResourceKind, record_key};
use crate::resources::{
    Condition, Container, Deployment, Event, Node, ObjectMeta, Pod, Resource, ResourceList,
};

/// Owner sentinel when a resource has no controller reference.
pub const NO_OWNER: &str = "none";

/// Only these container resources are recorded; others are skipped.
const TRACKED_RESOURCES: [&str; 2] = ["cpu", "memory"];

/// How status conditions are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionPolicy {
    /// Only the final condition in the list, as `{condition, status}`.
    #[default]
    #[serde(rename = "last")]
    LastWins,
    /// Every condition, as `type → status`.
    #[serde(rename = "all")]
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenOptions {
    #[serde(default)]
    pub conditions: ConditionPolicy,
}

pub fn flatten(resource: &Resource, options: &FlattenOptions) -> Result<DriftRecord, KeyError> {
    match resource {
        Resource::Pod(pod) => flatten_pod(pod, options),
        Resource::Node(node) => flatten_node(node, options),
        Resource::Event(event) => flatten_event(event),
        Resource::Deployment(deployment) => flatten_deployment(deployment, options),
    }
}

pub fn flatten_pod(pod: &Pod, options: &FlattenOptions) -> Result<DriftRecord, KeyError> {
    let mut record = base_record(ResourceKind::Pod, &pod.metadata)?;
    let status = &pod.status;
    let spec = &pod.spec;

    put(&mut record.fields, "host_ip", &status.host_ip);
    put(&mut record.fields, "pod_ip", &status.pod_ip);
    put(&mut record.fields, "phase", &status.phase);
    put(&mut record.fields, "node_name", &spec.node_name);
    put(&mut record.fields, "priority", spec.priority.unwrap_or(0).to_string());
    put(&mut record.fields, "qos_class", &status.qos_class);

    record.conditions = conditions(&status.conditions, options.conditions);

    record.containers = status
        .container_statuses
        .iter()
        .map(|cs| {
            let image_spec = spec
                .containers
                .iter()
                .find(|c| c.name == cs.name)
                .map(|c| c.image.as_str())
                .unwrap_or_default();
            let mut m = FieldMap::new();
            put(&mut m, "container_name", &cs.name);
            put(&mut m, "container_image", &cs.image);
            put(&mut m, "container_image_spec", image_spec);
            put(&mut m, "container_image_id", &cs.image_id);
            put(&mut m, "container_id", &cs.container_id);
            put(&mut m, "container_state", cs.state.name());
            put(&mut m, "container_ready", cs.ready.to_string());
            put(&mut m, "container_restart_count", cs.restart_count.to_string());
            m
        })
        .collect();

    record.resource_requests = container_resources(&spec.containers, &spec.node_name, |c| {
        &c.resources.requests
    });
    record.resource_limits =
        container_resources(&spec.containers, &spec.node_name, |c| &c.resources.limits);

    record.volumes = spec
        .volumes
        .iter()
        .filter_map(|v| {
            let claim = v.persistent_volume_claim.as_ref()?;
            let mut m = FieldMap::new();
            put(&mut m, "vol_name", &v.name);
            put(&mut m, "vol_claim_name", &claim.claim_name);
            Some(m)
        })
        .collect();

    Ok(record)
}

pub fn flatten_node(node: &Node, options: &FlattenOptions) -> Result<DriftRecord, KeyError> {
    let mut record = base_record(ResourceKind::Node, &node.metadata)?;
    let info = &node.status.node_info;
    let f = &mut record.fields;

    put(f, "unschedulable", node.spec.unschedulable.to_string());
    put(f, "pod_cidr", &node.spec.pod_cidr);
    put(f, "kubelet_version", &info.kubelet_version);
    put(f, "os_image", &info.os_image);
    put(f, "kernel_version", &info.kernel_version);
    put(f, "container_runtime_version", &info.container_runtime_version);
    put(f, "architecture", &info.architecture);
    put(f, "operating_system", &info.operating_system);
    for address in &node.status.addresses {
        put(f, format!("address_{}", snake_case(&address.type_)), &address.address);
    }
    quantities(f, "capacity", &node.status.capacity);
    quantities(f, "allocatable", &node.status.allocatable);

    record.conditions = conditions(&node.status.conditions, options.conditions);
    Ok(record)
}

pub fn flatten_event(event: &Event) -> Result<DriftRecord, KeyError> {
    let mut record = base_record(ResourceKind::Event, &event.metadata)?;
    let f = &mut record.fields;

    put(f, "reason", &event.reason);
    put(f, "message", &event.message);
    put(f, "count", event.count.unwrap_or(0).to_string());
    put(f, "type", &event.type_);
    put(f, "action", &event.action);
    put(f, "event_time", event.event_time.as_deref().unwrap_or_default());
    put(f, "first_timestamp", event.first_timestamp.as_deref().unwrap_or_default());
    put(f, "last_timestamp", event.last_timestamp.as_deref().unwrap_or_default());
    put(f, "reporting_controller", &event.reporting_component);
    put(f, "reporting_instance", &event.reporting_instance);
    put(f, "source_component", &event.source.component);
    put(f, "source_host", &event.source.host);

    let o = &event.involved_object;
    let m = &mut record.involved_object;
    put(m, "involved_object", &o.kind);
    put(m, "involved_object_name", &o.name);
    put(m, "involved_object_namespace", &o.namespace);
    put(m, "involved_object_uid", &o.uid);
    put(m, "involved_object_resource_version", &o.resource_version);

    Ok(record)
}

pub fn flatten_deployment(
    deployment: &Deployment,
    options: &FlattenOptions,
) -> Result<DriftRecord, KeyError> {
    let mut record = base_record(ResourceKind::Deployment, &deployment.metadata)?;
    let spec = &deployment.spec;
    let status = &deployment.status;
    let f = &mut record.fields;

    put(f, "replicas", spec.replicas.unwrap_or(1).to_string());
    put(f, "ready_replicas", status.ready_replicas.to_string());
    put(f, "available_replicas", status.available_replicas.to_string());
    put(f, "updated_replicas", status.updated_replicas.to_string());
    put(f, "unavailable_replicas", status.unavailable_replicas.to_string());
    put(f, "observed_generation", status.observed_generation.to_string());
    put(f, "strategy", &spec.strategy.type_);

    record.conditions = conditions(&status.conditions, options.conditions);

    let template = &spec.template.spec;
    record.resource_requests = container_resources(&template.containers, &template.node_name, |c| {
        &c.resources.requests
    });
    record.resource_limits = container_resources(&template.containers, &template.node_name, |c| {
        &c.resources.limits
    });
    Ok(record)
}

// ── Shared pieces ──────────────────────────────────────────────────

/// Key plus the identity fields every kind carries, with labels and
/// annotations copied over.
fn base_record(kind: ResourceKind, meta: &ObjectMeta) -> Result<DriftRecord, KeyError> {
    let key = record_key(kind, &meta.namespace, &meta.name, &meta.uid)?;
    let mut record = DriftRecord::new(key, kind);

    let namespace = if meta.namespace.is_empty() {
        NO_NAMESPACE
    } else {
        meta.namespace.as_str()
    };
    let (owner_kind, owner_name) = match meta.controller() {
        Some(owner) => (non_empty_or_none(&owner.kind), non_empty_or_none(&owner.name)),
        None => (NO_OWNER, NO_OWNER),
    };

    let f = &mut record.fields;
    put(f, "uid", &meta.uid);
    put(f, "name", &meta.name);
    put(f, "namespace", namespace);
    put(f, "kind", kind.api_name());
    put(f, "resource_version", &meta.resource_version);
    put(f, "creation_timestamp", &meta.creation_timestamp);
    put(f, "created_by_kind", owner_kind);
    put(f, "created_by_name", owner_name);

    record.labels = meta.labels.clone();
    record.annotations = meta.annotations.clone();
    Ok(record)
}

fn conditions(list: &[Condition], policy: ConditionPolicy) -> FieldMap {
    let mut m = FieldMap::new();
    match policy {
        ConditionPolicy::LastWins => {
            if let Some(last) = list.last() {
                put(&mut m, "condition", &last.type_);
                put(&mut m, "status", &last.status);
            }
        }
        ConditionPolicy::All => {
            for c in list {
                put(&mut m, &c.type_, &c.status);
            }
        }
    }
    m
}

/// One map per (container, tracked resource) pair, in container order.
fn container_resources<'a>(
    containers: &'a [Container],
    node_name: &str,
    select: impl Fn(&'a Container) -> &'a ResourceList,
) -> Vec<FieldMap> {
    let mut out = Vec::new();
    for container in containers {
        for (resource, value) in select(container) {
            if !TRACKED_RESOURCES.contains(&resource.as_str()) {
                continue;
            }
            let mut m = FieldMap::new();
            put(&mut m, "container_name", &container.name);
            put(&mut m, "node_name", node_name);
            put(&mut m, "resource_name", resource);
            put(&mut m, "resource_value", value);
            out.push(m);
        }
    }
    out
}

fn quantities(fields: &mut FieldMap, prefix: &str, list: &ResourceList) {
    for resource in TRACKED_RESOURCES {
        if let Some(value) = list.get(resource) {
            put(fields, format!("{prefix}_{resource}"), value);
        }
    }
}

fn put(map: &mut FieldMap, name: impl Into<String>, value: impl Into<String>) {
    map.insert(name.into(), value.into());
}

fn non_empty_or_none(s: &str) -> &str {
    if s.is_empty() { NO_OWNER } else { s }
}

/// `InternalIP` → `internal_ip`, `Hostname` → `hostname`.
fn snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}
