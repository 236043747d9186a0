//! Sender resolution
//!
//! Decides which account signs a batch once its calls are known. A proxied
//! account delegates signing to one of its proxies; the calls are rewritten
//! into `Proxy.proxy` calls so the delegate acts on behalf of the real
//! account.

use super::builder::ExtrinsicBuilder;
use super::errors::TransactionBuilderError;
use crate::operation::CompoundOperation;
use crate::runtime::CoderFactory;
use crate::types::{AccountId, ChainAccount, RuntimeCall};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Kind of delegation a proxy holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProxyType {
    Any,
    NonTransfer,
    Staking,
    Governance,
}

impl ProxyType {
    /// Whether a proxy of this type may dispatch `call`
    pub fn permits(&self, call: &RuntimeCall) -> bool {
        if call.module == "Utility" {
            return utility_inner_calls(call).iter().all(|inner| self.permits(inner));
        }

        match self {
            ProxyType::Any => true,
            ProxyType::NonTransfer => call.module != "Balances",
            ProxyType::Staking => matches!(call.module.as_str(), "Staking" | "NominationPools"),
            ProxyType::Governance => matches!(
                call.module.as_str(),
                "Democracy" | "ConvictionVoting" | "Referenda" | "Treasury"
            ),
        }
    }
}

fn utility_inner_calls(call: &RuntimeCall) -> Vec<RuntimeCall> {
    match call.args.get("calls") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Delegation record of a resolved sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedAccount {
    /// Account the calls act on behalf of
    pub proxied: AccountId,
    pub proxy_type: ProxyType,
}

/// The account that actually signs, and on whose behalf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtrinsicSenderResolution {
    pub account: ChainAccount,
    pub delegation: Option<DelegatedAccount>,
}

impl ExtrinsicSenderResolution {
    pub fn current(account: ChainAccount) -> Self {
        Self {
            account,
            delegation: None,
        }
    }

    pub fn is_delegated(&self) -> bool {
        self.delegation.is_some()
    }
}

/// Resolves the signer for a set of partially built transactions
pub trait SenderResolver: Send + Sync {
    fn resolve_sender(
        &self,
        builders: Vec<ExtrinsicBuilder>,
        coder: &CoderFactory,
    ) -> Result<(ExtrinsicSenderResolution, Vec<ExtrinsicBuilder>), TransactionBuilderError>;
}

/// Produces the resolver, possibly after fetching delegation data
pub trait SenderResolutionFactory: Send + Sync {
    fn create_wrapper(&self) -> CompoundOperation<Arc<dyn SenderResolver>>;
}

/// The nominal account signs its own transactions
#[derive(Debug, Clone)]
pub struct CurrentAccountResolutionFactory {
    account: ChainAccount,
}

impl CurrentAccountResolutionFactory {
    pub fn new(account: ChainAccount) -> Self {
        Self { account }
    }
}

struct CurrentAccountResolver {
    account: ChainAccount,
}

impl SenderResolver for CurrentAccountResolver {
    fn resolve_sender(
        &self,
        builders: Vec<ExtrinsicBuilder>,
        _coder: &CoderFactory,
    ) -> Result<(ExtrinsicSenderResolution, Vec<ExtrinsicBuilder>), TransactionBuilderError> {
        Ok((ExtrinsicSenderResolution::current(self.account.clone()), builders))
    }
}

impl SenderResolutionFactory for CurrentAccountResolutionFactory {
    fn create_wrapper(&self) -> CompoundOperation<Arc<dyn SenderResolver>> {
        let resolver: Arc<dyn SenderResolver> = Arc::new(CurrentAccountResolver {
            account: self.account.clone(),
        });
        CompoundOperation::from_result("current_account_resolver", Ok(resolver))
    }
}

/// A proxy registered for the proxied account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDefinition {
    pub delegate: ChainAccount,
    pub proxy_type: ProxyType,
}

/// The nominal account is proxied; a matching delegate signs instead
#[derive(Debug, Clone)]
pub struct ProxyResolutionFactory {
    proxied: AccountId,
    proxies: Vec<ProxyDefinition>,
}

impl ProxyResolutionFactory {
    pub fn new(proxied: AccountId, proxies: Vec<ProxyDefinition>) -> Self {
        Self { proxied, proxies }
    }
}

struct ProxyResolver {
    proxied: AccountId,
    proxies: Vec<ProxyDefinition>,
}

impl ProxyResolver {
    fn wrap(&self, builder: ExtrinsicBuilder, proxy_type: ProxyType) -> Result<ExtrinsicBuilder, TransactionBuilderError> {
        let call = builder.combined_call()?;
        let proxy_call = RuntimeCall::new(
            "Proxy",
            "proxy",
            json!({
                "real": self.proxied.to_hex(),
                "force_proxy_type": proxy_type,
                "call": call,
            }),
        );
        Ok(builder.reset_calls().adding_call(proxy_call))
    }
}

impl SenderResolver for ProxyResolver {
    fn resolve_sender(
        &self,
        builders: Vec<ExtrinsicBuilder>,
        coder: &CoderFactory,
    ) -> Result<(ExtrinsicSenderResolution, Vec<ExtrinsicBuilder>), TransactionBuilderError> {
        if !coder.metadata.has_call("Proxy", "proxy") {
            return Err(TransactionBuilderError::SenderResolution(
                "runtime does not support proxy calls".to_string(),
            ));
        }

        let proxy = self
            .proxies
            .iter()
            .find(|proxy| {
                builders
                    .iter()
                    .flat_map(|builder| builder.get_calls())
                    .all(|call| proxy.proxy_type.permits(call))
            })
            .ok_or_else(|| {
                TransactionBuilderError::SenderResolution(format!(
                    "no proxy of {} permits the requested calls",
                    self.proxied
                ))
            })?;

        debug!(
            proxied = %self.proxied,
            delegate = %proxy.delegate.account_id,
            proxy_type = ?proxy.proxy_type,
            "Resolved proxy sender"
        );

        let builders = builders
            .into_iter()
            .map(|builder| self.wrap(builder, proxy.proxy_type))
            .collect::<Result<Vec<_>, _>>()?;

        let resolution = ExtrinsicSenderResolution {
            account: proxy.delegate.clone(),
            delegation: Some(DelegatedAccount {
                proxied: self.proxied.clone(),
                proxy_type: proxy.proxy_type,
            }),
        };

        Ok((resolution, builders))
    }
}

impl SenderResolutionFactory for ProxyResolutionFactory {
    fn create_wrapper(&self) -> CompoundOperation<Arc<dyn SenderResolver>> {
        let resolver: Arc<dyn SenderResolver> = Arc::new(ProxyResolver {
            proxied: self.proxied.clone(),
            proxies: self.proxies.clone(),
        });
        CompoundOperation::from_result("proxy_resolver", Ok(resolver))
    }
}
