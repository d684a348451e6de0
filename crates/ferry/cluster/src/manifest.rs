//! Conversion between typed resources and Kubernetes JSON manifests

use crate::error::{ClusterError, ClusterResult};
use crate::resources::*;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ferry_types::ResourceQuantities;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// API group path, plural and manifest kind for each resource kind
pub(crate) fn api_coordinates(kind: ResourceKind) -> (&'static str, &'static str, &'static str) {
    match kind {
        ResourceKind::ConfigStore => ("api/v1", "configmaps", "ConfigMap"),
        ResourceKind::SecretStore => ("api/v1", "secrets", "Secret"),
        ResourceKind::Compute => ("apis/apps/v1", "deployments", "Deployment"),
        ResourceKind::NetworkEntry => ("api/v1", "services", "Service"),
        ResourceKind::RoutingRule => ("apis/traefik.io/v1alpha1", "ingressroutes", "IngressRoute"),
        ResourceKind::Certificate => ("apis/cert-manager.io/v1", "certificates", "Certificate"),
    }
}

fn api_version(kind: ResourceKind) -> &'static str {
    let (path, _, _) = api_coordinates(kind);
    path.strip_prefix("apis/")
        .or_else(|| path.strip_prefix("api/"))
        .unwrap_or(path)
}

pub fn to_manifest(object: &ClusterObject) -> Value {
    let kind = object.kind();
    let (_, _, manifest_kind) = api_coordinates(kind);
    let mut manifest = json!({
        "apiVersion": api_version(kind),
        "kind": manifest_kind,
        "metadata": meta_to_json(object.metadata()),
    });

    let body = match object {
        ClusterObject::ConfigStore(r) => json!({ "data": r.data }),
        ClusterObject::SecretStore(r) => {
            let data: BTreeMap<&String, String> = r
                .data
                .iter()
                .map(|(k, v)| (k, STANDARD.encode(v.as_bytes())))
                .collect();
            json!({ "type": "Opaque", "data": data })
        }
        ClusterObject::Compute(r) => json!({ "spec": compute_spec_to_json(&r.spec) }),
        ClusterObject::NetworkEntry(r) => json!({ "spec": network_spec_to_json(&r.spec) }),
        ClusterObject::RoutingRule(r) => json!({ "spec": routing_spec_to_json(&r.spec) }),
        ClusterObject::Certificate(r) => json!({
            "spec": {
                "secretName": r.spec.secret_name,
                "dnsNames": r.spec.dns_names,
                "issuerRef": { "name": r.spec.issuer.name, "kind": r.spec.issuer.kind },
            }
        }),
    };

    if let (Some(target), Value::Object(extra)) = (manifest.as_object_mut(), body) {
        target.extend(extra);
    }
    manifest
}

pub fn from_manifest(kind: ResourceKind, manifest: &Value) -> ClusterResult<ClusterObject> {
    let metadata = meta_from_json(manifest.get("metadata").unwrap_or(&Value::Null))?;
    let spec = manifest.get("spec").unwrap_or(&Value::Null);

    let object = match kind {
        ResourceKind::ConfigStore => ClusterObject::ConfigStore(ConfigStore {
            metadata,
            data: string_map(manifest.get("data")),
        }),
        ResourceKind::SecretStore => {
            let mut data = BTreeMap::new();
            for (k, v) in string_map(manifest.get("data")) {
                let bytes = STANDARD
                    .decode(v.as_bytes())
                    .map_err(|e| invalid(format!("secret key {k}: {e}")))?;
                let value = String::from_utf8(bytes)
                    .map_err(|e| invalid(format!("secret key {k}: {e}")))?;
                data.insert(k, value);
            }
            ClusterObject::SecretStore(SecretStore { metadata, data })
        }
        ResourceKind::Compute => ClusterObject::Compute(Compute {
            metadata,
            spec: compute_spec_from_json(spec)?,
        }),
        ResourceKind::NetworkEntry => ClusterObject::NetworkEntry(NetworkEntry {
            metadata,
            spec: network_spec_from_json(spec)?,
        }),
        ResourceKind::RoutingRule => ClusterObject::RoutingRule(RoutingRule {
            metadata,
            spec: routing_spec_from_json(spec)?,
        }),
        ResourceKind::Certificate => {
            let issuer = spec.get("issuerRef").unwrap_or(&Value::Null);
            ClusterObject::Certificate(CertificateRequest {
                metadata,
                spec: CertificateSpec {
                    secret_name: required_str(spec, "secretName")?,
                    dns_names: string_list(spec.get("dnsNames")),
                    issuer: IssuerRef {
                        name: required_str(issuer, "name")?,
                        kind: str_at(issuer, "kind").unwrap_or("Issuer").to_string(),
                    },
                },
            })
        }
    };

    Ok(object)
}

fn meta_to_json(meta: &ObjectMeta) -> Value {
    let mut out = json!({
        "name": meta.name,
        "namespace": meta.namespace,
    });
    if !meta.labels.is_empty() {
        out["labels"] = json!(meta.labels);
    }
    if let Some(version) = &meta.resource_version {
        out["resourceVersion"] = json!(version);
    }
    out
}

fn meta_from_json(value: &Value) -> ClusterResult<ObjectMeta> {
    Ok(ObjectMeta {
        name: required_str(value, "name")?,
        namespace: str_at(value, "namespace").unwrap_or_default().to_string(),
        labels: string_map(value.get("labels")),
        resource_version: str_at(value, "resourceVersion").map(str::to_string),
    })
}

fn quantities_to_json(q: &ResourceQuantities) -> Value {
    json!({
        "cpu": q.cpu,
        "memory": q.memory,
        "ephemeral-storage": q.ephemeral_storage,
    })
}

fn quantities_from_json(value: Option<&Value>) -> ResourceQuantities {
    let value = value.unwrap_or(&Value::Null);
    ResourceQuantities {
        cpu: str_at(value, "cpu").unwrap_or_default().to_string(),
        memory: str_at(value, "memory").unwrap_or_default().to_string(),
        ephemeral_storage: str_at(value, "ephemeral-storage")
            .unwrap_or_default()
            .to_string(),
    }
}

fn compute_spec_to_json(spec: &ComputeSpec) -> Value {
    let c = &spec.container;
    let env_from: Vec<Value> = c
        .env_from
        .iter()
        .map(|source| match source {
            EnvSource::ConfigStore(name) => json!({ "configMapRef": { "name": name } }),
            EnvSource::SecretStore(name) => json!({ "secretRef": { "name": name } }),
        })
        .collect();

    let mut pod_spec = json!({
        "containers": [{
            "name": c.name,
            "image": c.image,
            "ports": [{ "containerPort": c.port }],
            "resources": {
                "limits": quantities_to_json(&c.limits),
                "requests": quantities_to_json(&c.requests),
            },
            "envFrom": env_from,
        }],
    });

    let mut affinity = Map::new();
    if let Some(colocation) = &spec.placement.preferred_colocation {
        affinity.insert(
            "podAffinity".into(),
            json!({
                "preferredDuringSchedulingIgnoredDuringExecution": [{
                    "weight": colocation.weight,
                    "podAffinityTerm": {
                        "labelSelector": { "matchLabels": colocation.match_labels },
                        "namespaces": colocation.namespaces,
                        "topologyKey": colocation.topology_key,
                    },
                }],
            }),
        );
    }
    if let Some(region) = &spec.placement.required_region {
        affinity.insert(
            "nodeAffinity".into(),
            json!({
                "requiredDuringSchedulingIgnoredDuringExecution": {
                    "nodeSelectorTerms": [{
                        "matchExpressions": [{
                            "key": REGION_TOPOLOGY_KEY,
                            "operator": "In",
                            "values": [region],
                        }],
                    }],
                },
            }),
        );
    }
    if !affinity.is_empty() {
        pod_spec["affinity"] = Value::Object(affinity);
    }

    json!({
        "replicas": spec.replicas,
        "selector": { "matchLabels": spec.selector },
        "template": {
            "metadata": { "labels": spec.pod_labels },
            "spec": pod_spec,
        },
    })
}

fn compute_spec_from_json(spec: &Value) -> ClusterResult<ComputeSpec> {
    let template = spec.get("template").unwrap_or(&Value::Null);
    let pod_spec = template.get("spec").unwrap_or(&Value::Null);
    let container = pod_spec
        .get("containers")
        .and_then(|c| c.get(0))
        .ok_or_else(|| invalid("deployment has no containers"))?;
    let resources = container.get("resources").unwrap_or(&Value::Null);

    let env_from = container
        .get("envFrom")
        .and_then(Value::as_array)
        .map(|sources| {
            sources
                .iter()
                .filter_map(|s| {
                    if let Some(name) = s.get("configMapRef").and_then(|r| str_at(r, "name")) {
                        Some(EnvSource::ConfigStore(name.to_string()))
                    } else {
                        s.get("secretRef")
                            .and_then(|r| str_at(r, "name"))
                            .map(|name| EnvSource::SecretStore(name.to_string()))
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let port = container
        .get("ports")
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("containerPort"))
        .and_then(Value::as_u64)
        .unwrap_or_default();

    Ok(ComputeSpec {
        replicas: spec.get("replicas").and_then(Value::as_i64).unwrap_or(1) as i32,
        selector: string_map(spec.get("selector").and_then(|s| s.get("matchLabels"))),
        pod_labels: string_map(template.get("metadata").and_then(|m| m.get("labels"))),
        container: ContainerSpec {
            name: required_str(container, "name")?,
            image: required_str(container, "image")?,
            port: u16::try_from(port).map_err(|_| invalid(format!("port {port} out of range")))?,
            limits: quantities_from_json(resources.get("limits")),
            requests: quantities_from_json(resources.get("requests")),
            env_from,
        },
        placement: placement_from_json(pod_spec.get("affinity")),
    })
}

fn placement_from_json(affinity: Option<&Value>) -> Placement {
    let Some(affinity) = affinity else {
        return Placement::default();
    };

    let preferred_colocation = affinity
        .get("podAffinity")
        .and_then(|a| a.get("preferredDuringSchedulingIgnoredDuringExecution"))
        .and_then(|p| p.get(0))
        .map(|p| {
            let term = p.get("podAffinityTerm").unwrap_or(&Value::Null);
            Colocation {
                weight: p.get("weight").and_then(Value::as_i64).unwrap_or_default() as i32,
                match_labels: string_map(
                    term.get("labelSelector").and_then(|s| s.get("matchLabels")),
                ),
                namespaces: string_list(term.get("namespaces")),
                topology_key: str_at(term, "topologyKey").unwrap_or_default().to_string(),
            }
        });

    let required_region = affinity
        .get("nodeAffinity")
        .and_then(|a| a.get("requiredDuringSchedulingIgnoredDuringExecution"))
        .and_then(|r| r.get("nodeSelectorTerms"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|term| term.get("matchExpressions").and_then(Value::as_array))
        .flatten()
        .find(|expr| str_at(expr, "key") == Some(REGION_TOPOLOGY_KEY))
        .and_then(|expr| expr.get("values").and_then(|v| v.get(0)))
        .and_then(Value::as_str)
        .map(str::to_string);

    Placement {
        preferred_colocation,
        required_region,
    }
}

fn network_spec_to_json(spec: &NetworkEntrySpec) -> Value {
    match spec {
        NetworkEntrySpec::ClusterIp { selector, port } => json!({
            "type": "ClusterIP",
            "selector": selector,
            "ports": [{ "port": port, "targetPort": port, "protocol": "TCP" }],
        }),
        NetworkEntrySpec::ExternalName { external_name } => json!({
            "type": "ExternalName",
            "externalName": external_name,
        }),
    }
}

fn network_spec_from_json(spec: &Value) -> ClusterResult<NetworkEntrySpec> {
    if str_at(spec, "type") == Some("ExternalName") {
        return Ok(NetworkEntrySpec::ExternalName {
            external_name: required_str(spec, "externalName")?,
        });
    }

    let port = spec
        .get("ports")
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("port"))
        .and_then(Value::as_u64)
        .unwrap_or_default();

    Ok(NetworkEntrySpec::ClusterIp {
        selector: string_map(spec.get("selector")),
        port: u16::try_from(port).map_err(|_| invalid(format!("port {port} out of range")))?,
    })
}

fn routing_spec_to_json(spec: &RoutingRuleSpec) -> Value {
    let mut service = json!({
        "name": spec.backend.service,
        "port": spec.backend.port,
    });
    if let Some(namespace) = &spec.backend.namespace {
        service["namespace"] = json!(namespace);
    }

    let mut out = json!({
        "entryPoints": spec.entry_points,
        "routes": [{
            "kind": "Rule",
            "match": format!("Host(`{}`)", spec.host),
            "services": [service],
        }],
    });
    if let Some(secret) = &spec.tls_secret {
        out["tls"] = json!({ "secretName": secret });
    }
    out
}

fn routing_spec_from_json(spec: &Value) -> ClusterResult<RoutingRuleSpec> {
    let route = spec
        .get("routes")
        .and_then(|r| r.get(0))
        .ok_or_else(|| invalid("ingress route has no routes"))?;
    let rule = str_at(route, "match").unwrap_or_default();
    let host = rule
        .strip_prefix("Host(`")
        .and_then(|r| r.strip_suffix("`)"))
        .ok_or_else(|| invalid(format!("unsupported route match {rule}")))?;
    let service = route
        .get("services")
        .and_then(|s| s.get(0))
        .ok_or_else(|| invalid("ingress route has no services"))?;
    let port = service.get("port").and_then(Value::as_u64).unwrap_or_default();

    Ok(RoutingRuleSpec {
        entry_points: string_list(spec.get("entryPoints")),
        host: host.to_string(),
        backend: RouteBackend {
            service: required_str(service, "name")?,
            namespace: str_at(service, "namespace").map(str::to_string),
            port: u16::try_from(port).map_err(|_| invalid(format!("port {port} out of range")))?,
        },
        tls_secret: spec
            .get("tls")
            .and_then(|t| str_at(t, "secretName"))
            .map(str::to_string),
    })
}

fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn required_str(value: &Value, key: &str) -> ClusterResult<String> {
    str_at(value, key)
        .map(str::to_string)
        .ok_or_else(|| invalid(format!("missing field {key}")))
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn invalid(message: impl Into<String>) -> ClusterError {
    ClusterError::InvalidResponse(message.into())
}
