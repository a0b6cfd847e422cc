//! Server assembly: type registry, storage backend, admission chain and the
//! installed API groups.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use foundry_admission::{builtin, AdmissionConfig, Chain, ChainHook, Plugins};
use foundry_api::ApiServer;
use foundry_schema::Registry;
use foundry_store::memory::DEFAULT_HISTORY_LIMIT;
use foundry_store::{Backend, MemoryBackend};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct ServerOptions {
    /// Key prefix objects are stored under
    #[arg(long = "etcd-prefix", env = "FOUNDRY_ETCD_PREFIX", default_value = foundry_demo::DEFAULT_PREFIX)]
    pub etcd_prefix: String,

    /// Run the admission chain on writes
    #[arg(long = "enable-admission", env = "FOUNDRY_ENABLE_ADMISSION", default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_admission: bool,

    /// Admission plugins, in the order they run
    #[arg(long = "admission-plugins", env = "FOUNDRY_ADMISSION_PLUGINS", value_delimiter = ',', default_value = "DisallowFoo")]
    pub admission_plugins: Vec<String>,

    /// YAML file with per-plugin configuration
    #[arg(long = "admission-config", env = "FOUNDRY_ADMISSION_CONFIG")]
    pub admission_config: Option<PathBuf>,

    /// Revisions of change history kept for watch resumption
    #[arg(long = "history-limit", env = "FOUNDRY_HISTORY_LIMIT", default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,
}

/// Every admission plugin this server knows how to build.
pub fn admission_plugins() -> Result<Plugins> {
    let mut plugins = Plugins::new();
    builtin::register(&mut plugins).context("register built-in admission plugins")?;
    foundry_demo::register_plugins(&mut plugins).context("register demo admission plugins")?;
    Ok(plugins)
}

/// The enabled plugins in order, with configuration from the file when one is given.
pub fn admission_config(opts: &ServerOptions) -> Result<AdmissionConfig> {
    if !opts.enable_admission {
        return Ok(AdmissionConfig::default());
    }
    let file = match &opts.admission_config {
        Some(path) => AdmissionConfig::load(path).with_context(|| format!("load admission config {}", path.display()))?,
        None => AdmissionConfig::default(),
    };
    Ok(file.select(&opts.admission_plugins))
}

pub fn registry() -> Result<Arc<Registry>> {
    let mut builder = Registry::builder();
    foundry_demo::install(&mut builder).context("install demo.k8s.io types")?;
    Ok(Arc::new(builder.build()))
}

pub fn build_server(opts: &ServerOptions) -> Result<ApiServer> {
    let registry = registry()?;
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::with_history_limit(opts.history_limit));
    let config = admission_config(opts)?;
    let chain = Chain::from_config(&admission_plugins()?, &config).context("build admission chain")?;
    let hook = Arc::new(ChainHook::new(Arc::new(chain)));

    let group = foundry_demo::api_group(registry.clone(), backend, &opts.etcd_prefix, hook)
        .context("build demo.k8s.io storage")?;
    let mut server = ApiServer::new(registry);
    server.install_group(group).context("install demo.k8s.io")?;
    info!(prefix = %opts.etcd_prefix, admission = ?config.names(), history = opts.history_limit, "server: ready");
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        opts: ServerOptions,
    }

    fn parse(args: &[&str]) -> ServerOptions {
        Wrapper::parse_from(std::iter::once("test").chain(args.iter().copied())).opts
    }

    #[test]
    fn defaults_serve_demo_with_disallow_foo() {
        let opts = parse(&[]);
        assert_eq!(opts.etcd_prefix, "/registry/demo");
        assert_eq!(admission_config(&opts).unwrap().names(), vec!["DisallowFoo"]);
        let server = build_server(&opts).unwrap();
        assert!(server.storage("demo.k8s.io", "v1alpha1", "foos").is_ok());
    }

    #[test]
    fn admission_can_be_disabled_or_reordered() {
        let off = parse(&["--enable-admission", "false"]);
        assert!(admission_config(&off).unwrap().plugins.is_empty());
        let custom = parse(&["--admission-plugins", "AlwaysAdmit,DisallowFoo"]);
        assert_eq!(admission_config(&custom).unwrap().names(), vec!["AlwaysAdmit", "DisallowFoo"]);
    }

    #[test]
    fn unknown_plugins_fail_startup() {
        let opts = parse(&["--admission-plugins", "NoSuchPlugin"]);
        assert!(build_server(&opts).is_err());
    }
}
