//! Label and field selectors, and the predicate that combines them with a
//! kind-specific attribute extractor.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use foundry_core::{ApiError, MetaExt, ObjectMeta};
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("invalid selector {input:?}: {reason}")]
    Syntax { input: String, reason: String },
    #[error("field label not supported: {0}")]
    UnsupportedField(String),
}

impl From<SelectorError> for ApiError {
    fn from(e: SelectorError) -> Self { ApiError::bad_request(e.to_string()) }
}

fn syntax(input: &str, reason: impl Into<String>) -> SelectorError {
    SelectorError::Syntax { input: input.to_string(), reason: reason.into() }
}

type Values = SmallVec<[String; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Values),
    NotIn(String, Values),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn key(&self) -> &str {
        match self {
            Requirement::Equals(k, _)
            | Requirement::NotEquals(k, _)
            | Requirement::In(k, _)
            | Requirement::NotIn(k, _)
            | Requirement::Exists(k)
            | Requirement::DoesNotExist(k) => k,
        }
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let got = labels.get(self.key());
        match self {
            Requirement::Equals(_, v) => got == Some(v),
            Requirement::NotEquals(_, v) => got != Some(v),
            Requirement::In(_, vs) => got.map(|g| vs.contains(g)).unwrap_or(false),
            Requirement::NotIn(_, vs) => got.map(|g| !vs.contains(g)).unwrap_or(true),
            Requirement::Exists(_) => got.is_some(),
            Requirement::DoesNotExist(_) => got.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equals(k, v) => write!(f, "{k}={v}"),
            Requirement::NotEquals(k, v) => write!(f, "{k}!={v}"),
            Requirement::In(k, vs) => write!(f, "{k} in ({})", vs.join(",")),
            Requirement::NotIn(k, vs) => write!(f, "{k} notin ({})", vs.join(",")),
            Requirement::Exists(k) => write!(f, "{k}"),
            Requirement::DoesNotExist(k) => write!(f, "!{k}"),
        }
    }
}

/// Split on commas that are not inside a parenthesised value set.
fn split_terms(input: &str) -> Result<Vec<&str>, SelectorError> {
    let mut terms = Vec::new();
    let (mut depth, mut start) = (0i32, 0usize);
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 { return Err(syntax(input, "unbalanced ')'")); }
            }
            ',' if depth == 0 => {
                terms.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 { return Err(syntax(input, "unbalanced '('")); }
    terms.push(input[start..].trim());
    Ok(terms)
}

fn check_key(input: &str, key: &str) -> Result<String, SelectorError> {
    if key.is_empty() || !crate::validation::is_qualified_name(key) {
        return Err(syntax(input, format!("invalid label key {key:?}")));
    }
    Ok(key.to_string())
}

fn check_value(input: &str, value: &str) -> Result<String, SelectorError> {
    if !crate::validation::is_valid_label_value(value) {
        return Err(syntax(input, format!("invalid label value {value:?}")));
    }
    Ok(value.to_string())
}

fn parse_set(input: &str, rest: &str) -> Result<Values, SelectorError> {
    let rest = rest.trim();
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| syntax(input, "expected parenthesised value set"))?;
    let values = inner.split(',').map(str::trim).filter(|v| !v.is_empty());
    let mut out = Values::new();
    for v in values {
        out.push(check_value(input, v)?);
    }
    if out.is_empty() { return Err(syntax(input, "empty value set")); }
    Ok(out)
}

fn parse_requirement(input: &str, term: &str) -> Result<Requirement, SelectorError> {
    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement::DoesNotExist(check_key(input, key.trim())?));
    }
    if let Some((k, v)) = term.split_once("!=") {
        return Ok(Requirement::NotEquals(check_key(input, k.trim())?, check_value(input, v.trim())?));
    }
    if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Requirement::Equals(check_key(input, k.trim())?, check_value(input, v.trim())?));
    }
    let mut words = term.splitn(2, char::is_whitespace);
    let key = words.next().unwrap_or_default();
    match words.next().map(str::trim_start) {
        None => Ok(Requirement::Exists(check_key(input, key)?)),
        Some(rest) => {
            if let Some(set) = rest.strip_prefix("notin") {
                Ok(Requirement::NotIn(check_key(input, key)?, parse_set(input, set)?))
            } else if let Some(set) = rest.strip_prefix("in") {
                Ok(Requirement::In(check_key(input, key)?, parse_set(input, set)?))
            } else {
                Err(syntax(input, format!("unknown operator in {term:?}")))
            }
        }
    }
}

/// Conjunction of label requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn everything() -> Self { Self::default() }

    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        if input.trim().is_empty() { return Ok(Self::everything()); }
        let requirements = split_terms(input)?
            .into_iter()
            .map(|term| {
                if term.is_empty() { Err(syntax(input, "empty requirement")) } else { parse_requirement(input, term) }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { requirements })
    }

    pub fn from_requirements(requirements: Vec<Requirement>) -> Self { Self { requirements } }

    pub fn requirements(&self) -> &[Requirement] { &self.requirements }

    pub fn is_empty(&self) -> bool { self.requirements.is_empty() }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRequirement {
    Equals(String, String),
    NotEquals(String, String),
}

impl FieldRequirement {
    pub fn field(&self) -> &str {
        match self {
            FieldRequirement::Equals(f, _) | FieldRequirement::NotEquals(f, _) => f,
        }
    }
}

/// Conjunction of exact-match field terms; absent fields compare as "".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn everything() -> Self { Self::default() }

    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        if input.trim().is_empty() { return Ok(Self::everything()); }
        let mut requirements = Vec::new();
        for term in input.split(',').map(str::trim) {
            let req = if let Some((f, v)) = term.split_once("!=") {
                FieldRequirement::NotEquals(f.trim().to_string(), v.trim().to_string())
            } else if let Some((f, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
                FieldRequirement::Equals(f.trim().to_string(), v.trim().to_string())
            } else {
                return Err(syntax(input, format!("expected field=value, got {term:?}")));
            };
            if req.field().is_empty() { return Err(syntax(input, "empty field name")); }
            requirements.push(req);
        }
        Ok(Self { requirements })
    }

    pub fn requirements(&self) -> &[FieldRequirement] { &self.requirements }

    pub fn is_empty(&self) -> bool { self.requirements.is_empty() }

    /// Fail when a term names a field outside `supported`.
    pub fn check_supported(&self, supported: &[&str]) -> Result<(), SelectorError> {
        match self.requirements.iter().find(|r| !supported.contains(&r.field())) {
            Some(r) => Err(SelectorError::UnsupportedField(r.field().to_string())),
            None => Ok(()),
        }
    }

    pub fn matches(&self, fields: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| match r {
            FieldRequirement::Equals(f, v) => fields.get(f).map(String::as_str).unwrap_or("") == v,
            FieldRequirement::NotEquals(f, v) => fields.get(f).map(String::as_str).unwrap_or("") != v,
        })
    }
}

/// Attributes a predicate is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectAttrs {
    pub labels: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
}

pub const FIELD_NAME: &str = "metadata.name";
pub const FIELD_NAMESPACE: &str = "metadata.namespace";

/// Labels plus `metadata.name` and, for namespaced kinds, `metadata.namespace`.
pub fn object_meta_attrs(meta: &ObjectMeta, namespaced: bool) -> ObjectAttrs {
    let mut fields = BTreeMap::new();
    fields.insert(FIELD_NAME.to_string(), meta.name_or_empty().to_string());
    if namespaced {
        fields.insert(FIELD_NAMESPACE.to_string(), meta.namespace_or_empty().to_string());
    }
    ObjectAttrs { labels: meta.labels_or_empty().clone(), fields }
}

pub type AttrsFn<T> = Arc<dyn Fn(&T) -> ObjectAttrs + Send + Sync>;

/// Label selector, field selector and the attribute extractor used to evaluate them.
pub struct SelectionPredicate<T> {
    pub label: LabelSelector,
    pub field: FieldSelector,
    get_attrs: AttrsFn<T>,
}

impl<T> Clone for SelectionPredicate<T> {
    fn clone(&self) -> Self {
        Self { label: self.label.clone(), field: self.field.clone(), get_attrs: self.get_attrs.clone() }
    }
}

impl<T> fmt::Debug for SelectionPredicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionPredicate").field("label", &self.label).field("field", &self.field).finish()
    }
}

impl<T> SelectionPredicate<T> {
    pub fn new(label: LabelSelector, field: FieldSelector, get_attrs: AttrsFn<T>) -> Self {
        Self { label, field, get_attrs }
    }

    pub fn is_empty(&self) -> bool { self.label.is_empty() && self.field.is_empty() }

    pub fn attrs(&self, obj: &T) -> ObjectAttrs { (self.get_attrs)(obj) }

    pub fn matches(&self, obj: &T) -> bool {
        if self.is_empty() { return true; }
        let attrs = self.attrs(obj);
        self.label.matches(&attrs.labels) && self.field.matches(&attrs.fields)
    }
}
