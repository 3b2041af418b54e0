//! Ingress host rewriting for admission reviews.
//!
//! Every rule of the reviewed Ingress gets one JSON patch operation at
//! `/spec/rules/<i>/host`, whether or not its host changed. A host ending in
//! one of the source domains has that suffix swapped for the target domain;
//! the first listed source that matches wins.
//!
//! The engine is pure: configuration arrives as arguments and nothing is
//! shared between calls.

use axum::http::StatusCode;
use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation, ReplaceOperation};
use k8s_openapi::api::networking::v1::Ingress;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::{DynamicObject, Status};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Audit annotation set on every mutated review
pub const MUTATED_ANNOTATION: &str = "mutated-host";

/// Why a review could not be mutated.
///
/// `BadRequest` covers anything wrong with the request or with the
/// deployment's domain configuration. `Internal` means we failed to encode a
/// response we built ourselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutateError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MutateError {
    pub fn is_bad_request(&self) -> bool {
        matches!(self, MutateError::BadRequest(_))
    }

    /// HTTP status the webhook answers with
    pub fn status_code(&self) -> StatusCode {
        match self {
            MutateError::BadRequest(_) => StatusCode::BAD_REQUEST,
            MutateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A mutated review and what happened to it.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// UID of the reviewed request
    pub uid: String,
    /// Serialized `AdmissionReview` carrying the response
    pub body: Vec<u8>,
    /// Number of rules in the Ingress, and of patch operations emitted
    pub rules: usize,
    /// Rules whose host actually changed
    pub rewritten: usize,
}

/// Split a comma separated domain list, dropping blank entries.
pub fn parse_sources(sources: &str) -> Vec<&str> {
    sources
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Rewrite `host` if it ends with one of `sources`.
///
/// The match is a literal suffix comparison. Everything before the matched
/// suffix is kept, so `muting.example.org` with source `example.org` and
/// target `example.com` becomes `muting.example.com`. Hosts matching no
/// source are returned unchanged.
pub fn rewrite_host(host: &str, sources: &[&str], target: &str) -> String {
    sources
        .iter()
        .filter(|source| !source.is_empty())
        .find_map(|source| host.strip_suffix(source))
        .map(|prefix| format!("{}{}", prefix, target))
        .unwrap_or_else(|| host.to_string())
}

/// Build one patch operation per Ingress rule, in rule order.
///
/// Rules without a host get an `add` so the path exists for the API server;
/// all others get a `replace`.
pub fn host_patches(ingress: &Ingress, sources: &[&str], target: &str) -> Patch {
    let rules = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_deref())
        .unwrap_or_default();

    let operations = rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let mut path = PointerBuf::from_tokens(["spec", "rules"]);
            path.push_back(index);
            path.push_back("host");

            match rule.host.as_deref() {
                Some(host) => PatchOperation::Replace(ReplaceOperation {
                    path,
                    value: Value::String(rewrite_host(host, sources, target)),
                }),
                None => PatchOperation::Add(AddOperation {
                    path,
                    value: Value::String(String::new()),
                }),
            }
        })
        .collect();

    Patch(operations)
}

/// Mutate a raw `AdmissionReview` body and return the serialized response.
pub fn mutate(body: &[u8], sources: &str, target: &str) -> Result<Vec<u8>, MutateError> {
    mutate_review(body, sources, target).map(|mutation| mutation.body)
}

/// [`mutate`], also reporting how many hosts were rewritten.
pub fn mutate_review(body: &[u8], sources: &str, target: &str) -> Result<Mutation, MutateError> {
    let source_list = parse_sources(sources);
    if source_list.is_empty() {
        return Err(MutateError::BadRequest(
            "no source domains configured".to_string(),
        ));
    }
    if target.trim().is_empty() {
        return Err(MutateError::BadRequest(
            "no target domain configured".to_string(),
        ));
    }

    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body)
        .map_err(|e| MutateError::BadRequest(format!("invalid AdmissionReview: {}", e)))?;

    let request: AdmissionRequest<DynamicObject> = review
        .try_into()
        .map_err(|e| MutateError::BadRequest(format!("invalid AdmissionReview: {}", e)))?;

    let object = request
        .object
        .clone()
        .ok_or_else(|| MutateError::BadRequest("request carries no object".to_string()))?;
    let ingress: Ingress = object
        .try_parse()
        .map_err(|e| MutateError::BadRequest(format!("object is not an Ingress: {}", e)))?;

    let patch = host_patches(&ingress, &source_list, target);
    let rules = patch.0.len();
    let rewritten = count_rewritten(&ingress, &patch);
    debug!(uid = %request.uid, rules, rewritten, "Computed host patches");

    let mut response = AdmissionResponse::from(&request)
        .with_patch(patch)
        .map_err(|e| MutateError::Internal(format!("failed to serialize patch: {}", e)))?;
    response
        .audit_annotations
        .insert(MUTATED_ANNOTATION.to_string(), "true".to_string());
    response.result = Status::success();

    let body = serde_json::to_vec(&response.into_review())
        .map_err(|e| MutateError::Internal(format!("failed to serialize response: {}", e)))?;

    Ok(Mutation {
        uid: request.uid,
        body,
        rules,
        rewritten,
    })
}

fn count_rewritten(ingress: &Ingress, patch: &Patch) -> usize {
    let hosts = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|rule| rule.host.as_deref());

    hosts
        .zip(patch.0.iter())
        .filter(|(host, op)| match op {
            PatchOperation::Replace(replace) => replace.value.as_str() != *host,
            _ => false,
        })
        .count()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn review(object: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "networking.k8s.io", "version": "v1", "kind": "Ingress"},
                "resource": {"group": "networking.k8s.io", "version": "v1", "resource": "ingresses"},
                "operation": "CREATE",
                "userInfo": {"username": "admin"},
                "object": object,
            }
        }))
        .unwrap()
    }

    fn ingress(hosts: &[Option<&str>]) -> Value {
        let rules: Vec<Value> = hosts
            .iter()
            .map(|host| match host {
                Some(host) => json!({"host": host}),
                None => json!({"http": {"paths": []}}),
            })
            .collect();
        json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": {"name": "muting", "namespace": "default"},
            "spec": {"rules": rules},
        })
    }

    fn patch_of(body: &[u8]) -> Value {
        let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body).unwrap();
        let response = review.response.unwrap();
        serde_json::from_slice(&response.patch.unwrap()).unwrap()
    }

    #[test]
    fn test_rewrite_replaces_suffix() {
        assert_eq!(
            rewrite_host("muting.example.org", &["example.org"], "example.com"),
            "muting.example.com"
        );
    }

    #[test]
    fn test_rewrite_keeps_unmatched_host() {
        assert_eq!(
            rewrite_host("muting.example.net", &["example.org"], "example.com"),
            "muting.example.net"
        );
    }

    #[test]
    fn test_rewrite_first_match_wins() {
        let sources = ["example.org", "sub.example.org"];
        assert_eq!(
            rewrite_host("a.sub.example.org", &sources, "example.com"),
            "a.sub.example.com"
        );
        let sources = ["sub.example.org", "example.org"];
        assert_eq!(
            rewrite_host("a.sub.example.org", &sources, "example.com"),
            "a.example.com"
        );
    }

    #[test]
    fn test_rewrite_treats_source_literally() {
        assert_eq!(
            rewrite_host("muting.exampleXorg", &["example.org"], "example.com"),
            "muting.exampleXorg"
        );
    }

    #[test]
    fn test_rewrite_ignores_empty_source() {
        assert_eq!(rewrite_host("muting.test", &[""], "example.com"), "muting.test");
    }

    #[test]
    fn test_parse_sources() {
        assert_eq!(
            parse_sources("test.one, test.two,,"),
            vec!["test.one", "test.two"]
        );
        assert!(parse_sources("").is_empty());
        assert!(parse_sources(" , ").is_empty());
    }

    #[test]
    fn test_single_rule() {
        let body = mutate(
            &review(ingress(&[Some("muting.example.org")])),
            "example.org",
            "example.com",
        )
        .unwrap();

        assert_eq!(
            patch_of(&body),
            json!([{"op": "replace", "path": "/spec/rules/0/host", "value": "muting.example.com"}])
        );
    }

    #[test]
    fn test_response_envelope() {
        let body = mutate(
            &review(ingress(&[Some("muting.test.one")])),
            "test.one",
            "test.two",
        )
        .unwrap();

        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(value["kind"], "AdmissionReview");

        let response = &value["response"];
        assert_eq!(response["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(response["allowed"], true);
        assert_eq!(response["patchType"], "JSONPatch");
        assert_eq!(response["auditAnnotations"][MUTATED_ANNOTATION], "true");
        assert_eq!(response["status"]["status"], "Success");
    }

    #[test]
    fn test_unmatched_hosts_still_patched() {
        let body = mutate(
            &review(ingress(&[Some("muting.elsewhere.io")])),
            "test.one",
            "test.two",
        )
        .unwrap();

        assert_eq!(
            patch_of(&body),
            json!([{"op": "replace", "path": "/spec/rules/0/host", "value": "muting.elsewhere.io"}])
        );
    }

    #[test]
    fn test_rule_without_host_gets_add() {
        let body = mutate(
            &review(ingress(&[None, Some("b.test.one")])),
            "test.one",
            "test.two",
        )
        .unwrap();

        assert_eq!(
            patch_of(&body),
            json!([
                {"op": "add", "path": "/spec/rules/0/host", "value": ""},
                {"op": "replace", "path": "/spec/rules/1/host", "value": "b.test.two"},
            ])
        );
    }

    #[test]
    fn test_mutation_counts() {
        let mutation = mutate_review(
            &review(ingress(&[Some("a.test.one"), Some("b.other"), None])),
            "test.one",
            "test.two",
        )
        .unwrap();

        assert_eq!(mutation.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(mutation.rules, 3);
        assert_eq!(mutation.rewritten, 1);
    }

    #[test]
    fn test_ingress_without_rules() {
        let object = json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": {"name": "empty"},
            "spec": {"defaultBackend": {"service": {"name": "web", "port": {"number": 80}}}},
        });
        let body = mutate(&review(object), "test.one", "test.two").unwrap();
        assert_eq!(patch_of(&body), json!([]));
    }

    #[test]
    fn test_empty_configuration_is_bad_request() {
        let body = review(ingress(&[Some("muting.test.one")]));
        assert!(mutate(&body, "", "test.two").unwrap_err().is_bad_request());
        assert!(mutate(&body, "test.one", "").unwrap_err().is_bad_request());
        assert!(mutate(b"garbage", "", "").unwrap_err().is_bad_request());
    }

    #[test]
    fn test_blank_configuration_is_bad_request() {
        let body = review(ingress(&[Some("muting.test.one")]));
        assert!(mutate(&body, "test.one", "  ").unwrap_err().is_bad_request());
        assert!(mutate(&body, " , ", "test.two").unwrap_err().is_bad_request());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            MutateError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MutateError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_malformed_json_is_bad_request() {
        let err = mutate(b"{not json", "test.one", "test.two").unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_missing_request_is_bad_request() {
        let body = serde_json::to_vec(&json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
        }))
        .unwrap();
        let err = mutate(&body, "test.one", "test.two").unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_missing_object_is_bad_request() {
        let mut value: Value = serde_json::from_slice(&review(Value::Null)).unwrap();
        value["request"].as_object_mut().unwrap().remove("object");
        let body = serde_json::to_vec(&value).unwrap();

        let err = mutate(&body, "test.one", "test.two").unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_non_ingress_object_is_bad_request() {
        let pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "muting"},
            "spec": {"containers": []},
        });
        let err = mutate(&review(pod), "test.one", "test.two").unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_malformed_ingress_is_bad_request() {
        let object = json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": {"name": "muting"},
            "spec": {"rules": "muting.test.one"},
        });
        let err = mutate(&review(object), "test.one", "test.two").unwrap_err();
        assert!(err.is_bad_request());
    }
}
