//! `demo.k8s.io/v1alpha1`: wire shape of Foo, its default function and its
//! conversion to and from the internal form.
//!
//! Spec fields serialize camelCase; the capitalized spellings older clients
//! send (`Image`, `Config`, `Msg`, `Msg1`) are accepted on input.

use foundry_core::ObjectMeta;
use foundry_schema::VersionCodec;
use serde::{Deserialize, Serialize};

use crate::types;

pub const VERSION: &str = "v1alpha1";

/// Label carrying the object's own name, set by [`set_defaults_foo`].
pub const NAME_LABEL: &str = "demo.k8s.io/metadata.name";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Foo {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FooSpec,
    #[serde(default, skip_serializing_if = "FooStatus::is_empty")]
    pub status: FooStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FooSpec {
    #[serde(default, alias = "Image")]
    pub image: String,
    #[serde(default, alias = "Config")]
    pub config: FooConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FooConfig {
    #[serde(default, alias = "Msg")]
    pub msg: String,
    #[serde(default, alias = "Msg1", skip_serializing_if = "String::is_empty")]
    pub msg1: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FooStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<FooCondition>,
}

impl FooStatus {
    pub fn is_empty(&self) -> bool { self.phase.is_empty() && self.conditions.is_empty() }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FooCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
}

pub fn set_defaults_foo(obj: &mut Foo) {
    let name = obj.metadata.name.clone().unwrap_or_default();
    obj.metadata.labels.get_or_insert_with(Default::default).insert(NAME_LABEL.to_string(), name);
}

pub fn to_internal(e: Foo) -> types::Foo {
    types::Foo {
        metadata: e.metadata,
        spec: types::FooSpec {
            image: e.spec.image,
            config: types::FooConfig { msg: e.spec.config.msg, msg1: e.spec.config.msg1 },
        },
        status: types::FooStatus {
            phase: e.status.phase,
            conditions: e
                .status
                .conditions
                .into_iter()
                .map(|c| types::FooCondition { type_: c.type_, status: c.status })
                .collect(),
        },
    }
}

pub fn from_internal(i: &types::Foo) -> Foo {
    Foo {
        metadata: i.metadata.clone(),
        spec: FooSpec {
            image: i.spec.image.clone(),
            config: FooConfig { msg: i.spec.config.msg.clone(), msg1: i.spec.config.msg1.clone() },
        },
        status: FooStatus {
            phase: i.status.phase.clone(),
            conditions: i
                .status
                .conditions
                .iter()
                .map(|c| FooCondition { type_: c.type_.clone(), status: c.status.clone() })
                .collect(),
        },
    }
}

pub fn codec() -> VersionCodec<types::Foo, Foo> {
    VersionCodec::new(to_internal, from_internal).with_defaults(set_defaults_foo)
}
