//! The ordered admission chain: every mutating phase in configured order, then
//! every validating phase. The first rejection stops the chain.

use std::sync::Arc;

use foundry_core::{ApiResult, RequestContext};
use metrics::counter;
use tracing::{debug, info};

use crate::attributes::Attributes;
use crate::config::AdmissionConfig;
use crate::errors::AdmissionResult;
use crate::interfaces::Interface;
use crate::plugins::Plugins;

#[derive(Clone, Copy)]
enum Phase {
    Mutating,
    Validating,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Mutating => "mutating",
            Phase::Validating => "validating",
        }
    }
}

#[derive(Clone, Default)]
pub struct Chain {
    plugins: Vec<(String, Arc<dyn Interface>)>,
}

impl Chain {
    pub fn new(plugins: Vec<(String, Arc<dyn Interface>)>) -> Self { Self { plugins } }

    /// Instantiate the configured plugins in order. An unknown name fails startup.
    pub fn from_config(registry: &Plugins, config: &AdmissionConfig) -> AdmissionResult<Self> {
        let mut plugins = Vec::with_capacity(config.plugins.len());
        for p in &config.plugins {
            let plugin = registry.new_from_plugins(&p.name, p.configuration.as_ref())?;
            plugins.push((p.name.clone(), plugin));
        }
        info!(plugins = ?config.names(), "admission: chain configured");
        Ok(Self { plugins })
    }

    pub fn names(&self) -> Vec<&str> { self.plugins.iter().map(|(n, _)| n.as_str()).collect() }
    pub fn len(&self) -> usize { self.plugins.len() }
    pub fn is_empty(&self) -> bool { self.plugins.is_empty() }

    fn wants(plugin: &dyn Interface, attrs: &Attributes<'_>) -> bool {
        plugin.handles(attrs.operation()) && plugin.handles_kind(&attrs.group_kind())
    }

    fn outcome(&self, name: &str, phase: Phase, attrs: &Attributes<'_>, res: AdmissionResult<()>) -> ApiResult<()> {
        let decision = if res.is_ok() { "allowed" } else { "denied" };
        counter!("foundry_admission_decisions_total", 1, "plugin" => name.to_string(), "phase" => phase.as_str(), "decision" => decision);
        res.map_err(|e| {
            info!(plugin = %name, phase = phase.as_str(), gvk = %attrs.kind(), ns = %attrs.namespace(), name = %attrs.name(), error = %e, "admission: rejected");
            e.into_api_error(&attrs.resource(), &subject(attrs))
        })
    }

    /// Run the chain over `attrs`. Mutations are visible to later plugins.
    pub async fn admit(&self, ctx: &RequestContext, attrs: &mut Attributes<'_>) -> ApiResult<()> {
        for (name, plugin) in &self.plugins {
            ctx.check_cancelled()?;
            let Some(m) = plugin.as_mutating() else { continue };
            if !Self::wants(plugin.as_ref(), attrs) { continue; }
            debug!(plugin = %name, op = %attrs.operation(), "admission: mutating");
            let res = m.admit(ctx, attrs).await;
            self.outcome(name, Phase::Mutating, attrs, res)?;
        }
        for (name, plugin) in &self.plugins {
            ctx.check_cancelled()?;
            let Some(v) = plugin.as_validating() else { continue };
            if !Self::wants(plugin.as_ref(), attrs) { continue; }
            debug!(plugin = %name, op = %attrs.operation(), "admission: validating");
            let res = v.validate(ctx, attrs).await;
            self.outcome(name, Phase::Validating, attrs, res)?;
        }
        Ok(())
    }
}

/// `namespace/name` for namespaced requests, `name` otherwise.
fn subject(attrs: &Attributes<'_>) -> String {
    let name = match attrs.name() {
        "" => attrs.object().and_then(|o| o.meta().generate_name.clone()).unwrap_or_default(),
        n => n.to_string(),
    };
    if attrs.namespace().is_empty() { name } else { format!("{}/{}", attrs.namespace(), name) }
}
