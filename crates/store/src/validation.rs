//! Generic object metadata validation shared by every kind.

use foundry_core::{FieldError, FieldErrorList, MetaExt, ObjectMeta};
use once_cell::sync::Lazy;
use regex::Regex;

const DNS1123_SUBDOMAIN_MAX: usize = 253;
const DNS1123_LABEL_MAX: usize = 63;
const QUALIFIED_NAME_MAX: usize = 63;
const LABEL_VALUE_MAX: usize = 63;

static DNS1123_SUBDOMAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").expect("static regex"));
static DNS1123_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex"));
static QUALIFIED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("static regex"));
static LABEL_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").expect("static regex"));

pub fn is_dns1123_subdomain(s: &str) -> bool {
    s.len() <= DNS1123_SUBDOMAIN_MAX && DNS1123_SUBDOMAIN.is_match(s)
}

pub fn is_dns1123_label(s: &str) -> bool {
    s.len() <= DNS1123_LABEL_MAX && DNS1123_LABEL.is_match(s)
}

/// `[prefix/]name` where prefix is a DNS subdomain and name is at most 63 characters.
pub fn is_qualified_name(s: &str) -> bool {
    let (prefix, name) = match s.split_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, s),
    };
    if let Some(p) = prefix {
        if p.is_empty() || !is_dns1123_subdomain(p) { return false; }
    }
    !name.is_empty() && name.len() <= QUALIFIED_NAME_MAX && QUALIFIED_NAME.is_match(name)
}

pub fn is_valid_label_value(s: &str) -> bool {
    s.len() <= LABEL_VALUE_MAX && LABEL_VALUE.is_match(s)
}

pub fn validate_labels(meta: &ObjectMeta, errs: &mut FieldErrorList) {
    for (k, v) in meta.labels_or_empty() {
        if !is_qualified_name(k) {
            errs.push(FieldError::invalid("metadata.labels", k, "name part must consist of alphanumeric characters, '-', '_' or '.'"));
        }
        if !is_valid_label_value(v) {
            errs.push(FieldError::invalid(&format!("metadata.labels[{k}]"), v, "a valid label value must be 63 characters or less"));
        }
    }
    for k in meta.annotations.iter().flat_map(|a| a.keys()) {
        if !is_qualified_name(k) {
            errs.push(FieldError::invalid("metadata.annotations", k, "name part must consist of alphanumeric characters, '-', '_' or '.'"));
        }
    }
}

/// Name, namespace and label checks for a new object.
pub fn validate_object_meta(meta: &ObjectMeta, namespaced: bool) -> FieldErrorList {
    let mut errs = FieldErrorList::new();
    let name = meta.name_or_empty();
    if name.is_empty() {
        if meta.generate_name.as_deref().unwrap_or("").is_empty() {
            errs.push(FieldError::required("metadata.name", "name or generateName is required"));
        }
    } else if name.len() > DNS1123_SUBDOMAIN_MAX {
        errs.push(FieldError::too_long("metadata.name", name, DNS1123_SUBDOMAIN_MAX));
    } else if !is_dns1123_subdomain(name) {
        errs.push(FieldError::invalid(
            "metadata.name",
            name,
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.'",
        ));
    }

    let ns = meta.namespace_or_empty();
    match (namespaced, ns.is_empty()) {
        (true, true) => errs.push(FieldError::required("metadata.namespace", "")),
        (true, false) if !is_dns1123_label(ns) => {
            errs.push(FieldError::invalid("metadata.namespace", ns, "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-'"))
        }
        (false, false) => errs.push(FieldError::forbidden("metadata.namespace", "not allowed on this type")),
        _ => {}
    }
    validate_labels(meta, &mut errs);
    errs
}

fn immutable(field: &str, new: Option<&str>, old: Option<&str>, errs: &mut FieldErrorList) {
    if new.unwrap_or("") != old.unwrap_or("") {
        errs.push(FieldError::invalid(field, new.unwrap_or(""), "field is immutable"));
    }
}

/// Rejects changes to name, namespace, uid and creation timestamp.
pub fn validate_object_meta_update(new: &ObjectMeta, old: &ObjectMeta) -> FieldErrorList {
    let mut errs = FieldErrorList::new();
    immutable("metadata.name", new.name.as_deref(), old.name.as_deref(), &mut errs);
    immutable("metadata.namespace", new.namespace.as_deref(), old.namespace.as_deref(), &mut errs);
    immutable("metadata.uid", new.uid.as_deref(), old.uid.as_deref(), &mut errs);
    if new.creation_timestamp != old.creation_timestamp {
        let shown = new.creation_timestamp.as_ref().map(|t| t.0.to_rfc3339()).unwrap_or_default();
        errs.push(FieldError::invalid("metadata.creationTimestamp", &shown, "field is immutable"));
    }
    validate_labels(new, &mut errs);
    errs
}
