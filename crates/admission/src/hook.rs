//! Adapter from the store's admission evaluation point to the chain.

use std::sync::Arc;

use foundry_core::{ApiResult, Kind, RequestContext};
use foundry_store::{AdmissionHook, AdmissionRequest};

use crate::attributes::Attributes;
use crate::chain::Chain;

/// Runs a shared [`Chain`] for store operations on any kind.
#[derive(Clone)]
pub struct ChainHook {
    chain: Arc<Chain>,
}

impl ChainHook {
    pub fn new(chain: Arc<Chain>) -> Self { Self { chain } }
    pub fn chain(&self) -> &Chain { &self.chain }
}

#[async_trait::async_trait]
impl<T: Kind> AdmissionHook<T> for ChainHook {
    async fn admit(&self, ctx: &RequestContext, req: AdmissionRequest<'_, T>) -> ApiResult<()> {
        if self.chain.is_empty() { return Ok(()); }
        let mut attrs = Attributes::new(req.operation, req.descriptor, req.namespace, req.name)
            .with_user(req.user)
            .with_dry_run(req.dry_run);
        if let Some(obj) = req.object {
            attrs = attrs.with_object(obj);
        }
        if let Some(old) = req.old {
            attrs = attrs.with_old(old);
        }
        self.chain.admit(ctx, &mut attrs).await
    }
}
