//! Mounter-Pod Spec Builder (§4.2): given a workload Pod, a PersistentVolume, and driver
//! configuration, produces a deterministic, idempotent Mounter Pod specification.

use std::collections::BTreeMap;

use crd_api::BucketPodAttachment;
use crd_api::labels::{
    LABEL_DRIVER_VERSION, LABEL_MOUNTPOINT_VERSION, LABEL_POD_UID, LABEL_VOLUME_NAME,
};
use driver_api::rendezvous::{
    COMMUNICATION_DIR, COMMUNICATION_VOLUME_NAME, COMMUNICATION_VOLUME_SIZE_LIMIT,
};
use driver_api::Args;
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EmptyDirVolumeSource, Pod, PodSpec, ResourceRequirements,
    SeccompProfile, SecretVolumeSource, SecurityContext, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use utils::quantity::{parse_quantity, InvalidQuantity};

use crate::config::{Config, PlatformVariant};
use crate::consts::{
    CA_CERTS_VOLUME_NAME, CA_SECRET_KEY, CA_SECRET_MOUNT_DIR, CA_SECRET_VOLUME_NAME,
    MAIN_CONTAINER_NAME, SYSTEM_CERTS_DIR, TLS_INIT_CONTAINER_NAME, VOLUME_ATTR_CPU,
    VOLUME_ATTR_MEMORY, VOLUME_ATTR_SERVICE_ACCOUNT,
};

/// Errors the builder can produce.
///
/// All of them are permanent-validation errors in the §7 taxonomy: they name the offending
/// field and value, and the caller does not requeue on them, it leaves the BPAR as-is until the
/// underlying PV or pod is corrected.
#[derive(thiserror::Error, Debug)]
pub enum BuilderError {
    /// A PV volume-attribute resource quantity failed to parse.
    #[error(transparent)]
    InvalidQuantity(#[from] InvalidQuantity),
}

/// `Result` alias scoped to this module.
type Result<T> = std::result::Result<T, BuilderError>;

/// The subset of PV fields the builder needs, extracted by the caller (the reconciler) from the
/// live PV object. Kept narrow so the builder has no direct dependency on the PV API type.
#[derive(Debug, Clone)]
pub struct VolumeAttributes {
    /// The opaque bucket identifier.
    pub volume_id: String,
    /// Canonicalized mount-option string (§4.3).
    pub mount_options: Args,
    /// Raw PV volume-attribute map (§6.4); unrecognized keys are ignored.
    pub attributes: BTreeMap<String, String>,
}

/// Build a Mounter Pod for `attachment`, optionally scheduled using `workload_node_name` and
/// `workload_service_account` gleaned from the first attached workload's pod.
///
/// `workload_node_name` is required — a Mounter Pod with no node affinity would be unschedulable
/// to the right place — but the caller may fall back to the BPAR's own `nodeName` field when the
/// workload pod lookup fails (§4.4 step 2), since the BPAR always carries it too.
pub fn build_mounter_pod(
    name: &str,
    owner: &BucketPodAttachment,
    namespace: &str,
    node_name: &str,
    workload_pod_uid: &str,
    workload_service_account: Option<&str>,
    volume: &VolumeAttributes,
    config: &Config,
) -> Result<Pod> {
    let labels = build_labels(config, workload_pod_uid, &volume_name(owner));
    let owner_ref = owner
        .controller_owner_ref(&())
        .unwrap_or_else(|| unreachable!("BucketPodAttachment always carries a uid once persisted"));

    let mut volumes = vec![Volume {
        name: COMMUNICATION_VOLUME_NAME.to_owned(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some("Memory".to_owned()),
            size_limit: Some(Quantity(COMMUNICATION_VOLUME_SIZE_LIMIT.to_owned())),
        }),
        ..Volume::default()
    }];
    let mut volume_mounts = vec![VolumeMount {
        name: COMMUNICATION_VOLUME_NAME.to_owned(),
        mount_path: COMMUNICATION_DIR.to_owned(),
        ..VolumeMount::default()
    }];

    let mut init_containers = Vec::new();
    if let Some(ca_secret_name) = config.tls_ca_secret_name.as_deref() {
        let (tls_volumes, tls_mounts, init_container) =
            build_tls_init_container(ca_secret_name, config);
        volumes.extend(tls_volumes);
        volume_mounts.push(tls_mounts);
        init_containers.push(init_container);
    }

    let resources = build_resource_requirements(&volume.attributes)?;

    let main_container = Container {
        name: MAIN_CONTAINER_NAME.to_owned(),
        image: Some(config.mount_image.clone()),
        image_pull_policy: Some(config.mount_image_pull_policy.clone()),
        command: Some(config.mount_entry_command.clone()),
        args: Some(volume.mount_options.sorted_list()),
        resources: Some(resources),
        security_context: Some(main_security_context(config.platform)),
        volume_mounts: Some(volume_mounts),
        ..Container::default()
    };

    let priority_class_name = config
        .preempting_priority_class_name
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| Some(config.priority_class_name.clone()))
        .filter(|s| !s.is_empty());

    let pod = Pod {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            labels: Some(labels),
            owner_references: Some(vec![owner_ref]),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node_name.to_owned()),
            restart_policy: Some("OnFailure".to_owned()),
            tolerations: Some(vec![Toleration {
                operator: Some("Exists".to_owned()),
                ..Toleration::default()
            }]),
            init_containers: (!init_containers.is_empty()).then_some(init_containers),
            containers: vec![main_container],
            volumes: Some(volumes),
            priority_class_name,
            service_account_name: workload_service_account.map(ToOwned::to_owned),
            ..PodSpec::default()
        }),
        status: None,
    };

    Ok(pod)
}

/// Load-bearing labels the Reconciler selects owned Mounter Pods by (§4.2.1, §6.1).
fn build_labels(
    config: &Config,
    workload_pod_uid: &str,
    volume_name: &str,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    let _ = labels.insert(
        LABEL_MOUNTPOINT_VERSION.to_owned(),
        config.mountpoint_version.clone(),
    );
    let _ = labels.insert(
        LABEL_DRIVER_VERSION.to_owned(),
        config.driver_version.clone(),
    );
    let _ = labels.insert(LABEL_POD_UID.to_owned(), workload_pod_uid.to_owned());
    let _ = labels.insert(LABEL_VOLUME_NAME.to_owned(), volume_name.to_owned());
    labels
}

/// Extract the PV name the owning BPAR names, for the `volume-name` label.
fn volume_name(owner: &BucketPodAttachment) -> String {
    owner.spec.persistent_volume_name.clone()
}

/// Hardened security context shared by the main container and (mostly) the init container.
fn main_security_context(platform: PlatformVariant) -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_owned()]),
            add: None,
        }),
        run_as_non_root: Some(true),
        run_as_user: matches!(platform, PlatformVariant::Standard).then_some(1000),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_owned(),
            localhost_profile: None,
        }),
        ..SecurityContext::default()
    }
}

/// Build the resource requests/limits for the main container from the PV's volume attributes.
///
/// Absence of a recognized key means "let the scheduler apply no request/limit for that
/// resource", not an error — only a *present but malformed* value is an error.
fn build_resource_requirements(
    attributes: &BTreeMap<String, String>,
) -> Result<ResourceRequirements> {
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();
    if let Some(raw) = attributes.get(VOLUME_ATTR_CPU) {
        let quantity = parse_quantity(VOLUME_ATTR_CPU, raw)?;
        let _ = requests.insert("cpu".to_owned(), quantity.clone());
        let _ = limits.insert("cpu".to_owned(), quantity);
    }
    if let Some(raw) = attributes.get(VOLUME_ATTR_MEMORY) {
        let quantity = parse_quantity(VOLUME_ATTR_MEMORY, raw)?;
        let _ = requests.insert("memory".to_owned(), quantity.clone());
        let _ = limits.insert("memory".to_owned(), quantity);
    }
    Ok(ResourceRequirements {
        requests: (!requests.is_empty()).then_some(requests),
        limits: (!limits.is_empty()).then_some(limits),
        claims: None,
    })
}

/// Read the service-account override, if any, from a PV's volume attributes (§6.4).
#[must_use]
pub fn service_account_from_attributes(attributes: &BTreeMap<String, String>) -> Option<&str> {
    attributes
        .get(VOLUME_ATTR_SERVICE_ACCOUNT)
        .map(String::as_str)
}

/// Build the CA-bundle volume, the shared system-certs volume, the main container's mount of the
/// latter, and the TLS init-container itself (§4.2.2).
fn build_tls_init_container(
    ca_secret_name: &str,
    config: &Config,
) -> (Vec<Volume>, VolumeMount, Container) {
    let ca_secret_volume = Volume {
        name: CA_SECRET_VOLUME_NAME.to_owned(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(ca_secret_name.to_owned()),
            optional: Some(false),
            ..SecretVolumeSource::default()
        }),
        ..Volume::default()
    };
    let certs_volume = Volume {
        name: CA_CERTS_VOLUME_NAME.to_owned(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Volume::default()
    };

    let init_security_context = SecurityContext {
        run_as_non_root: Some(false),
        run_as_user: Some(0),
        ..main_security_context(config.platform)
    };

    let install_script = format!(
        "set -eu; \
         update-ca-certificates --fresh >/dev/null 2>&1 || true; \
         cp {ca_secret_mount}/{ca_key} /usr/local/share/ca-certificates/custom-ca.crt; \
         update-ca-certificates; \
         cp -r {system_certs}/. /shared-certs/",
        ca_secret_mount = CA_SECRET_MOUNT_DIR,
        ca_key = CA_SECRET_KEY,
        system_certs = SYSTEM_CERTS_DIR,
    );

    let init_container = Container {
        name: TLS_INIT_CONTAINER_NAME.to_owned(),
        image: Some(config.tls_init_image.clone()),
        image_pull_policy: Some(config.tls_init_image_pull_policy.clone()),
        command: Some(vec!["/bin/sh".to_owned(), "-c".to_owned(), install_script]),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_owned(), Quantity(config.tls_init_cpu.clone())),
                (
                    "memory".to_owned(),
                    Quantity(config.tls_init_memory.clone()),
                ),
            ])),
            limits: Some(BTreeMap::from([
                ("cpu".to_owned(), Quantity(config.tls_init_cpu.clone())),
                (
                    "memory".to_owned(),
                    Quantity(config.tls_init_memory.clone()),
                ),
            ])),
            claims: None,
        }),
        security_context: Some(init_security_context),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CA_SECRET_VOLUME_NAME.to_owned(),
                mount_path: CA_SECRET_MOUNT_DIR.to_owned(),
                read_only: Some(true),
                ..VolumeMount::default()
            },
            VolumeMount {
                name: CA_CERTS_VOLUME_NAME.to_owned(),
                mount_path: "/shared-certs".to_owned(),
                ..VolumeMount::default()
            },
        ]),
        ..Container::default()
    };

    let main_mount = VolumeMount {
        name: CA_CERTS_VOLUME_NAME.to_owned(),
        mount_path: SYSTEM_CERTS_DIR.to_owned(),
        read_only: Some(true),
        ..VolumeMount::default()
    };

    (vec![ca_secret_volume, certs_volume], main_mount, init_container)
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;
    use crd_api::{BucketPodAttachmentSpec, WorkloadAttachment};
    use std::collections::BTreeMap as Map;

    fn test_config() -> Config {
        Config::parse_from(["mountpoint-csi-operator"])
    }

    fn owner() -> BucketPodAttachment {
        let mut attachments = Map::new();
        attachments.insert(
            "mp-abc".to_owned(),
            vec![WorkloadAttachment {
                workload_pod_uid: "w1".to_owned(),
                attachment_time: 0,
            }],
        );
        let mut owner = BucketPodAttachment::new(
            "bpar-1",
            BucketPodAttachmentSpec {
                node_name: "node-1".to_owned(),
                persistent_volume_name: "pv-1".to_owned(),
                volume_id: "bucket-1".to_owned(),
                mount_options: String::new(),
                credential_fingerprint: String::new(),
                mountpoint_pod_attachments: attachments,
            },
        );
        owner.metadata.uid = Some("owner-uid".to_owned());
        owner
    }

    fn volume_attrs() -> VolumeAttributes {
        VolumeAttributes {
            volume_id: "bucket-1".to_owned(),
            mount_options: Args::new(),
            attributes: Map::new(),
        }
    }

    #[test]
    fn without_tls_has_one_volume_and_no_init_containers() {
        let pod = build_mounter_pod(
            "mp-abc",
            &owner(),
            "kube-system",
            "node-1",
            "w1",
            None,
            &volume_attrs(),
            &test_config(),
        )
        .unwrap();
        let spec = pod.spec.unwrap();
        assert_eq!(spec.volumes.as_ref().unwrap().len(), 1);
        assert!(spec.init_containers.is_none());
    }

    #[test]
    fn with_tls_has_three_volumes_and_one_init_container() {
        let mut config = test_config();
        config.tls_ca_secret_name = Some("my-ca".to_owned());
        let pod = build_mounter_pod(
            "mp-abc",
            &owner(),
            "kube-system",
            "node-1",
            "w1",
            None,
            &volume_attrs(),
            &config,
        )
        .unwrap();
        let spec = pod.spec.unwrap();
        assert_eq!(spec.volumes.as_ref().unwrap().len(), 3);
        let init_containers = spec.init_containers.unwrap();
        assert_eq!(init_containers.len(), 1);
        assert_eq!(init_containers[0].name, TLS_INIT_CONTAINER_NAME);
        let main = &spec.containers[0];
        let mount = main
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .find(|m| m.name == CA_CERTS_VOLUME_NAME)
            .unwrap();
        assert_eq!(mount.mount_path, SYSTEM_CERTS_DIR);
        assert_eq!(mount.read_only, Some(true));
    }

    #[test]
    fn owner_reference_has_controller_flag() {
        let pod = build_mounter_pod(
            "mp-abc",
            &owner(),
            "kube-system",
            "node-1",
            "w1",
            None,
            &volume_attrs(),
            &test_config(),
        )
        .unwrap();
        let owner_refs = pod.metadata.owner_references.unwrap();
        assert_eq!(owner_refs.len(), 1);
        assert_eq!(owner_refs[0].controller, Some(true));
    }

    #[test]
    fn invalid_cpu_quantity_is_reported_with_field_name() {
        let mut attrs = volume_attrs();
        attrs.attributes.insert(VOLUME_ATTR_CPU.to_owned(), "lots".to_owned());
        let err = build_mounter_pod(
            "mp-abc",
            &owner(),
            "kube-system",
            "node-1",
            "w1",
            None,
            &attrs,
            &test_config(),
        )
        .unwrap_err();
        assert!(matches!(err, BuilderError::InvalidQuantity(e) if e.field == VOLUME_ATTR_CPU));
    }

    #[test]
    fn service_account_override_is_applied() {
        let mut attrs = volume_attrs();
        attrs
            .attributes
            .insert(VOLUME_ATTR_SERVICE_ACCOUNT.to_owned(), "my-sa".to_owned());
        let sa = service_account_from_attributes(&attrs.attributes);
        let pod = build_mounter_pod(
            "mp-abc",
            &owner(),
            "kube-system",
            "node-1",
            "w1",
            sa,
            &attrs,
            &test_config(),
        )
        .unwrap();
        assert_eq!(
            pod.spec.unwrap().service_account_name.as_deref(),
            Some("my-sa")
        );
    }
}
