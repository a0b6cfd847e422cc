//! `DisallowFoo`: refuses Foo creation in protected namespaces.

use std::sync::Arc;

use foundry_admission::{AdmissionError, AdmissionResult, Attributes, Handler, Interface, Plugins, ValidationInterface};
use foundry_core::{GroupKind, Kind, Operation, RequestContext};
use serde::Deserialize;
use tracing::debug;

use crate::types::Foo;

pub const PLUGIN_NAME: &str = "DisallowFoo";

const DEFAULT_NAMESPACE: &str = "kube-system";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisallowFooConfig {
    #[serde(default = "default_namespaces")]
    namespaces: Vec<String>,
}

fn default_namespaces() -> Vec<String> { vec![DEFAULT_NAMESPACE.to_string()] }

pub struct DisallowFoo {
    handler: Handler,
    namespaces: Vec<String>,
}

impl DisallowFoo {
    /// Protects `kube-system`.
    pub fn new() -> Self { Self::with_namespaces(default_namespaces()) }

    pub fn with_namespaces(namespaces: Vec<String>) -> Self {
        Self { handler: Handler::new(&[Operation::Create]).with_kinds(&[Foo::static_group_kind()]), namespaces }
    }

    pub fn from_config(config: Option<&serde_json::Value>) -> AdmissionResult<Self> {
        let Some(raw) = config else { return Ok(Self::new()) };
        let cfg: DisallowFooConfig = serde_json::from_value(raw.clone())
            .map_err(|e| AdmissionError::config(format!("{PLUGIN_NAME}: {e}")))?;
        Ok(Self::with_namespaces(cfg.namespaces))
    }

    pub fn namespaces(&self) -> &[String] { &self.namespaces }
}

impl Default for DisallowFoo {
    fn default() -> Self { Self::new() }
}

impl Interface for DisallowFoo {
    fn handles(&self, operation: Operation) -> bool { self.handler.handles(operation) }
    fn handles_kind(&self, kind: &GroupKind) -> bool { self.handler.handles_kind(kind) }
    fn as_validating(&self) -> Option<&dyn ValidationInterface> { Some(self) }
}

#[async_trait::async_trait]
impl ValidationInterface for DisallowFoo {
    async fn validate(&self, _ctx: &RequestContext, attrs: &Attributes<'_>) -> AdmissionResult<()> {
        let Some(obj) = attrs.object() else { return Ok(()) };
        let ns = obj.meta().namespace.as_deref().unwrap_or("");
        if !self.namespaces.iter().any(|n| n == ns) {
            return Ok(());
        }
        debug!(ns = %ns, name = %attrs.name(), "admission: DisallowFoo rejecting");
        Err(AdmissionError::forbidden(
            attrs.resource(),
            format!("{}/{}", attrs.namespace(), attrs.name()),
            format!("namespace/{ns} is not permitted, please change the resource namespace"),
        ))
    }
}

pub fn register(plugins: &mut Plugins) -> AdmissionResult<()> {
    plugins.register(PLUGIN_NAME, |config| Ok(Arc::new(DisallowFoo::from_config(config)?) as Arc<dyn Interface>))
}
