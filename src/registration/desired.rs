//! Desired `MutatingWebhookConfiguration` and drift detection.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    WebhookClientConfig,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};

/// HTTP path the API server posts admission reviews to
pub const WEBHOOK_PATH: &str = "/mutate";
/// AdmissionReview version we speak
pub const ADMISSION_REVIEW_VERSION: &str = "v1";
/// The webhook has no side effects outside the reviewed object
pub const SIDE_EFFECTS: &str = "None";
/// Reject the request if the webhook cannot be reached
pub const FAILURE_POLICY: &str = "Fail";
pub const INGRESS_API_GROUP: &str = "networking.k8s.io";
pub const INGRESS_API_VERSION: &str = "v1";
pub const INGRESS_RESOURCE: &str = "ingresses";

const NAMESPACE_LABEL_VALUE: &str = "enabled";
const DEFAULT_SCOPE: &str = "*";
const DEFAULT_SERVICE_PORT: i32 = 443;

/// Fully qualified webhook name: `<service>.<namespace>.svc.cluster.local`
pub fn webhook_name(service: &str, namespace: &str) -> String {
    format!("{}.{}.svc.cluster.local", service, namespace)
}

/// Build the configuration registering `service` in `namespace` as the
/// mutating webhook for Ingress create and update.
///
/// Only namespaces labelled `<service>=enabled` are routed to the webhook.
pub fn desired_configuration(
    name: &str,
    namespace: &str,
    service: &str,
    ca_bundle: &[u8],
) -> MutatingWebhookConfiguration {
    let webhook = MutatingWebhook {
        name: webhook_name(service, namespace),
        admission_review_versions: vec![ADMISSION_REVIEW_VERSION.to_string()],
        side_effects: SIDE_EFFECTS.to_string(),
        failure_policy: Some(FAILURE_POLICY.to_string()),
        client_config: WebhookClientConfig {
            ca_bundle: Some(ByteString(ca_bundle.to_vec())),
            service: Some(ServiceReference {
                name: service.to_string(),
                namespace: namespace.to_string(),
                path: Some(WEBHOOK_PATH.to_string()),
                port: None,
            }),
            url: None,
        },
        rules: Some(vec![RuleWithOperations {
            api_groups: Some(vec![INGRESS_API_GROUP.to_string()]),
            api_versions: Some(vec![INGRESS_API_VERSION.to_string()]),
            operations: Some(vec!["CREATE".to_string(), "UPDATE".to_string()]),
            resources: Some(vec![INGRESS_RESOURCE.to_string()]),
            scope: None,
        }]),
        namespace_selector: Some(LabelSelector {
            match_labels: Some(BTreeMap::from([(
                service.to_string(),
                NAMESPACE_LABEL_VALUE.to_string(),
            )])),
            match_expressions: None,
        }),
        ..Default::default()
    };

    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        webhooks: Some(vec![webhook]),
    }
}

/// Whether `live` already carries everything `desired` manages.
///
/// Only the fields this webhook owns are compared. Values the API server
/// fills in on admission (rule scope, service port, failure policy) compare
/// equal to their unset form.
pub fn is_up_to_date(
    desired: &MutatingWebhookConfiguration,
    live: &MutatingWebhookConfiguration,
) -> bool {
    ManagedFields::of(desired) == ManagedFields::of(live)
}

#[derive(Debug, PartialEq)]
struct ManagedFields<'a> {
    webhooks: Vec<ManagedWebhook<'a>>,
}

impl<'a> ManagedFields<'a> {
    fn of(config: &'a MutatingWebhookConfiguration) -> Self {
        Self {
            webhooks: config
                .webhooks
                .iter()
                .flatten()
                .map(ManagedWebhook::of)
                .collect(),
        }
    }
}

#[derive(Debug, PartialEq)]
struct ManagedWebhook<'a> {
    name: &'a str,
    admission_review_versions: &'a [String],
    side_effects: &'a str,
    failure_policy: &'a str,
    rules: Vec<ManagedRule<'a>>,
    namespace_labels: BTreeMap<&'a str, &'a str>,
    namespace_expressions: &'a [LabelSelectorRequirement],
    ca_bundle: &'a [u8],
    service: Option<ManagedService<'a>>,
}

impl<'a> ManagedWebhook<'a> {
    fn of(webhook: &'a MutatingWebhook) -> Self {
        let selector = webhook.namespace_selector.as_ref();
        Self {
            name: &webhook.name,
            admission_review_versions: &webhook.admission_review_versions,
            side_effects: &webhook.side_effects,
            failure_policy: webhook.failure_policy.as_deref().unwrap_or(FAILURE_POLICY),
            rules: webhook
                .rules
                .iter()
                .flatten()
                .map(ManagedRule::of)
                .collect(),
            namespace_labels: selector
                .and_then(|s| s.match_labels.as_ref())
                .map(|labels| {
                    labels
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect()
                })
                .unwrap_or_default(),
            namespace_expressions: selector
                .and_then(|s| s.match_expressions.as_deref())
                .unwrap_or_default(),
            ca_bundle: webhook
                .client_config
                .ca_bundle
                .as_ref()
                .map(|b| b.0.as_slice())
                .unwrap_or_default(),
            service: webhook
                .client_config
                .service
                .as_ref()
                .map(ManagedService::of),
        }
    }
}

#[derive(Debug, PartialEq)]
struct ManagedRule<'a> {
    api_groups: &'a [String],
    api_versions: &'a [String],
    operations: &'a [String],
    resources: &'a [String],
    scope: &'a str,
}

impl<'a> ManagedRule<'a> {
    fn of(rule: &'a RuleWithOperations) -> Self {
        Self {
            api_groups: rule.api_groups.as_deref().unwrap_or_default(),
            api_versions: rule.api_versions.as_deref().unwrap_or_default(),
            operations: rule.operations.as_deref().unwrap_or_default(),
            resources: rule.resources.as_deref().unwrap_or_default(),
            scope: rule.scope.as_deref().unwrap_or(DEFAULT_SCOPE),
        }
    }
}

#[derive(Debug, PartialEq)]
struct ManagedService<'a> {
    name: &'a str,
    namespace: &'a str,
    path: Option<&'a str>,
    port: i32,
}

impl<'a> ManagedService<'a> {
    fn of(service: &'a ServiceReference) -> Self {
        Self {
            name: &service.name,
            namespace: &service.namespace,
            path: service.path.as_deref(),
            port: service.port.unwrap_or(DEFAULT_SERVICE_PORT),
        }
    }
}
