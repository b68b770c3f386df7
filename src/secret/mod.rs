//! Secret reference resolver (spec §4.2).
//!
//! Resolves the `SnapshotterSecretName`/`SnapshotterSecretNamespace` class
//! parameter pair (or the delete-variant pair) into a concrete, validated
//! `(namespace, name)`, expanding the small set of recognized template
//! tokens along the way, then fetches and flattens the referenced secret.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, ResourceExt};

use crate::error::{Error, Result};
use crate::types::{VolumeSnapshot, VolumeSnapshotContent};

pub const SNAPSHOTTER_SECRET_NAME_PARAM: &str = "csi.storage.k8s.io/snapshotter-secret-name";
pub const SNAPSHOTTER_SECRET_NAMESPACE_PARAM: &str =
    "csi.storage.k8s.io/snapshotter-secret-namespace";
pub const SNAPSHOTTER_DELETE_SECRET_NAME_PARAM: &str =
    "csi.storage.k8s.io/snapshotter-delete-secret-name";
pub const SNAPSHOTTER_DELETE_SECRET_NAMESPACE_PARAM: &str =
    "csi.storage.k8s.io/snapshotter-delete-secret-namespace";

/// A resolved, not-yet-fetched secret reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretReference {
    pub namespace: String,
    pub name: String,
}

/// Template context available for token expansion. Every field is
/// optional because not every caller has a bound VS/VSC yet.
#[derive(Default)]
pub struct TemplateContext<'a> {
    pub content_name: Option<&'a str>,
    pub snapshot_name: Option<&'a str>,
    pub snapshot_namespace: Option<&'a str>,
    pub snapshot_annotations: Option<&'a BTreeMap<String, String>>,
}

impl<'a> TemplateContext<'a> {
    pub fn for_create(vs: &'a VolumeSnapshot, content_name: &'a str) -> Self {
        TemplateContext {
            content_name: Some(content_name),
            snapshot_name: Some(vs.name_any_ref()),
            snapshot_namespace: vs.metadata.namespace.as_deref(),
            snapshot_annotations: vs.metadata.annotations.as_ref(),
        }
    }

    pub fn for_content_only(content: &'a VolumeSnapshotContent) -> Self {
        TemplateContext {
            content_name: content.metadata.name.as_deref(),
            ..Default::default()
        }
    }
}

// `ResourceExt::name_any` returns an owned String; the template context
// wants a short-lived `&str` view, so reach for the raw field instead.
trait NameAnyRef {
    fn name_any_ref(&self) -> &str;
}

impl NameAnyRef for VolumeSnapshot {
    fn name_any_ref(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("")
    }
}

/// Resolve the (name, namespace) parameter pair for either the create or
/// delete secret, expanding templates and validating DNS-1123 rules.
///
/// Returns `Ok(None)` when both parameters are absent ("no secret
/// configured" is not an error).
pub fn resolve_secret_reference(
    params: &BTreeMap<String, String>,
    name_param: &str,
    namespace_param: &str,
    ctx: &TemplateContext<'_>,
) -> Result<Option<SecretReference>> {
    let name_tmpl = params.get(name_param);
    let ns_tmpl = params.get(namespace_param);

    match (name_tmpl, ns_tmpl) {
        (None, None) => Ok(None),
        (Some(_), None) | (None, Some(_)) => Err(Error::SecretParamIncomplete(format!(
            "exactly one of {name_param}/{namespace_param} is set; both or neither are required"
        ))),
        (Some(name_tmpl), Some(ns_tmpl)) => {
            let name = expand_template(name_tmpl, ctx, true)?;
            let namespace = expand_template(ns_tmpl, ctx, false)?;

            validate_dns1123(&namespace, DnsRule::Label, ns_tmpl)?;
            validate_dns1123(&name, DnsRule::Subdomain, name_tmpl)?;

            Ok(Some(SecretReference { namespace, name }))
        }
    }
}

const TOKEN_CONTENT_NAME: &str = "${volumesnapshotcontent.name}";
const TOKEN_SNAPSHOT_NAME: &str = "${volumesnapshot.name}";
const TOKEN_SNAPSHOT_NAMESPACE: &str = "${volumesnapshot.namespace}";

/// Expand recognized tokens in `template`. `allow_annotation_token`
/// distinguishes the name template (which additionally accepts
/// `${volumesnapshot.annotations['KEY']}`) from the namespace template
/// (which does not, per spec §4.2).
fn expand_template(template: &str, ctx: &TemplateContext<'_>, allow_annotation_token: bool) -> Result<String> {
    let mut out = template.to_string();
    let mut unrecognized = Vec::new();
    let had_tokens = contains_token(&out);

    if let Some(v) = ctx.content_name {
        out = out.replace(TOKEN_CONTENT_NAME, v);
    }
    if let Some(v) = ctx.snapshot_name {
        out = out.replace(TOKEN_SNAPSHOT_NAME, v);
    }
    if let Some(v) = ctx.snapshot_namespace {
        out = out.replace(TOKEN_SNAPSHOT_NAMESPACE, v);
    }

    if allow_annotation_token {
        out = expand_annotation_tokens(&out, ctx, &mut unrecognized);
    }

    for leftover in find_remaining_tokens(&out) {
        unrecognized.push(leftover);
    }

    if !unrecognized.is_empty() {
        return Err(Error::SecretTemplateInvalidToken(unrecognized));
    }

    // Stash whether this template had any tokens at all; the caller uses
    // this to produce a clearer validation error message (spec §4.2).
    let _ = had_tokens;
    Ok(out)
}

fn contains_token(s: &str) -> bool {
    s.contains("${")
}

fn expand_annotation_tokens(s: &str, ctx: &TemplateContext<'_>, unrecognized: &mut Vec<String>) -> String {
    const PREFIX: &str = "${volumesnapshot.annotations['";
    const SUFFIX: &str = "']}";
    let mut result = String::new();
    let mut rest = s;
    while let Some(start) = rest.find(PREFIX) {
        result.push_str(&rest[..start]);
        let after_prefix = &rest[start + PREFIX.len()..];
        if let Some(end) = after_prefix.find(SUFFIX) {
            let key = &after_prefix[..end];
            let value = ctx
                .snapshot_annotations
                .and_then(|a| a.get(key))
                .cloned()
                .unwrap_or_default();
            if ctx.snapshot_annotations.is_none() || !ctx.snapshot_annotations.unwrap().contains_key(key) {
                unrecognized.push(format!("${{volumesnapshot.annotations['{key}']}} (no such annotation)"));
            }
            result.push_str(&value);
            rest = &after_prefix[end + SUFFIX.len()..];
        } else {
            result.push_str(&rest[start..]);
            rest = "";
            break;
        }
    }
    result.push_str(rest);
    result
}

fn find_remaining_tokens(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        if let Some(end) = rest[start..].find('}') {
            tokens.push(rest[start..start + end + 1].to_string());
            rest = &rest[start + end + 1..];
        } else {
            break;
        }
    }
    tokens
}

enum DnsRule {
    Label,
    Subdomain,
}

fn validate_dns1123(value: &str, rule: DnsRule, original_template: &str) -> Result<()> {
    let ok = match rule {
        DnsRule::Label => is_dns1123_label(value),
        DnsRule::Subdomain => is_dns1123_subdomain(value),
    };
    if ok {
        return Ok(());
    }
    let rule_name = match rule {
        DnsRule::Label => "label",
        DnsRule::Subdomain => "subdomain",
    };
    let kind = if rule_name == "label" { "namespace" } else { "name" };
    if contains_token(original_template) {
        Err(Error::InvalidSecretName {
            kind,
            value: format!("{value:?} (expanded from template {original_template:?})"),
            rule: rule_name,
        })
    } else {
        Err(Error::InvalidSecretName {
            kind,
            value: value.to_string(),
            rule: rule_name,
        })
    }
}

fn is_dns1123_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

fn is_dns1123_subdomain(s: &str) -> bool {
    !s.is_empty() && s.len() <= 253 && s.split('.').all(is_dns1123_label)
}

/// Fetch the referenced secret and flatten its `data` map to UTF-8 strings.
pub async fn fetch_credentials(
    client: &Client,
    reference: &SecretReference,
) -> Result<BTreeMap<String, String>> {
    let api: Api<Secret> = Api::namespaced(client.clone(), &reference.namespace);
    let secret = api.get(&reference.name).await.map_err(|e| match e {
        kube::Error::Api(ref api_err) if api_err.code == 404 => Error::SecretNotFound {
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        },
        other => Error::KubeError(other),
    })?;

    let mut flattened = BTreeMap::new();
    if let Some(data) = secret.data {
        for (k, v) in data {
            flattened.insert(k, String::from_utf8_lossy(&v.0).to_string());
        }
    }
    if let Some(string_data) = secret.string_data {
        flattened.extend(string_data);
    }
    Ok(flattened)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn both_absent_is_not_an_error() {
        let ctx = TemplateContext::default();
        let resolved = resolve_secret_reference(
            &BTreeMap::new(),
            SNAPSHOTTER_SECRET_NAME_PARAM,
            SNAPSHOTTER_SECRET_NAMESPACE_PARAM,
            &ctx,
        )
        .unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn exactly_one_present_is_incomplete() {
        let p = params(&[(SNAPSHOTTER_SECRET_NAME_PARAM, "foo")]);
        let ctx = TemplateContext::default();
        let err = resolve_secret_reference(
            &p,
            SNAPSHOTTER_SECRET_NAME_PARAM,
            SNAPSHOTTER_SECRET_NAMESPACE_PARAM,
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, Error::SecretParamIncomplete(_)));
    }

    #[test]
    fn expands_recognized_tokens() {
        let p = params(&[
            (SNAPSHOTTER_SECRET_NAME_PARAM, "secret-${volumesnapshot.name}"),
            (SNAPSHOTTER_SECRET_NAMESPACE_PARAM, "${volumesnapshot.namespace}"),
        ]);
        let ctx = TemplateContext {
            snapshot_name: Some("snap1"),
            snapshot_namespace: Some("default"),
            ..Default::default()
        };
        let resolved = resolve_secret_reference(
            &p,
            SNAPSHOTTER_SECRET_NAME_PARAM,
            SNAPSHOTTER_SECRET_NAMESPACE_PARAM,
            &ctx,
        )
        .unwrap()
        .unwrap();
        assert_eq!(resolved.name, "secret-snap1");
        assert_eq!(resolved.namespace, "default");
    }

    /// Boundary behavior (spec §8): one recognized + one unrecognized
    /// token lists only the unrecognized one.
    #[test]
    fn unrecognized_token_is_reported_alone() {
        let p = params(&[
            (
                SNAPSHOTTER_SECRET_NAME_PARAM,
                "secret-${volumesnapshot.name}-${bogus.token}",
            ),
            (SNAPSHOTTER_SECRET_NAMESPACE_PARAM, "default"),
        ]);
        let ctx = TemplateContext {
            snapshot_name: Some("snap1"),
            ..Default::default()
        };
        let err = resolve_secret_reference(
            &p,
            SNAPSHOTTER_SECRET_NAME_PARAM,
            SNAPSHOTTER_SECRET_NAMESPACE_PARAM,
            &ctx,
        )
        .unwrap_err();
        match err {
            Error::SecretTemplateInvalidToken(tokens) => {
                assert_eq!(tokens, vec!["${bogus.token}".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn annotation_token_only_allowed_in_name() {
        let p = params(&[
            (
                SNAPSHOTTER_SECRET_NAME_PARAM,
                "secret-${volumesnapshot.annotations['team']}",
            ),
            (SNAPSHOTTER_SECRET_NAMESPACE_PARAM, "default"),
        ]);
        let mut annotations = BTreeMap::new();
        annotations.insert("team".to_string(), "payments".to_string());
        let ctx = TemplateContext {
            snapshot_annotations: Some(&annotations),
            ..Default::default()
        };
        let resolved = resolve_secret_reference(
            &p,
            SNAPSHOTTER_SECRET_NAME_PARAM,
            SNAPSHOTTER_SECRET_NAMESPACE_PARAM,
            &ctx,
        )
        .unwrap()
        .unwrap();
        assert_eq!(resolved.name, "secret-payments");
    }

    #[test]
    fn invalid_dns_without_tokens_is_a_hard_error() {
        let p = params(&[
            (SNAPSHOTTER_SECRET_NAME_PARAM, "Not_Valid_Name"),
            (SNAPSHOTTER_SECRET_NAMESPACE_PARAM, "default"),
        ]);
        let ctx = TemplateContext::default();
        let err = resolve_secret_reference(
            &p,
            SNAPSHOTTER_SECRET_NAME_PARAM,
            SNAPSHOTTER_SECRET_NAMESPACE_PARAM,
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSecretName { .. }));
    }
}
