//! txflow command line
//!
//! Estimates fees for a batch of balance transfers and, with `--submit`,
//! signs and submits them. Chain, endpoint, era policy and worker pool size
//! come from the TOML config with `TXFLOW_*` environment overrides.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use txflow::config::{Config, EraConfig};
use txflow::metrics::metrics;
use txflow::observability::TraceContext;
use txflow::operation::{CallbackQueue, OperationQueue};
use txflow::rpc_manager::HttpRpcEngine;
use txflow::service::{self, ServiceDependencies, TransactionRequest, TransferFeeArgs};
use txflow::signer::{Ed25519SigningWrapper, SigningWrapper};
use txflow::structured_logging::{init_logging, StructuredLogger};
use txflow::tx_builder::{
    EraOperationFactory, EvmTransactionBuilderIndexedClosure, ExtrinsicBuilderIndexedClosure,
    ImmortalEraOperationFactory, MortalEraOperationFactory,
};
use txflow::types::{AccountId, Balance, ChainAccount, CryptoType, RuntimeCall};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    after_help = "Extrinsics and EVM transactions use txflow's own bincode encoding, not SCALE or RLP. \
                  Submit only to nodes that decode this format."
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Hex-encoded 32-byte ed25519 seed of the signing account
    #[arg(long, env = "TXFLOW_KEY_FILE")]
    key_file: Option<String>,

    /// Sender account (hex) used for fee estimation without a key
    #[arg(long)]
    account: Option<String>,

    /// Transfer recipient (hex)
    #[arg(long)]
    recipient: String,

    /// Amount per transfer
    #[arg(long, default_value = "1000")]
    amount: Balance,

    /// Number of transfers in the batch
    #[arg(long, default_value = "1")]
    count: usize,

    /// Sign and submit after estimating fees (txflow encoding, see below)
    #[arg(long)]
    submit: bool,

    /// Print Prometheus metrics before exiting
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    init_logging(&config.logging).context("Failed to install tracing subscriber")?;

    info!("Starting txflow {}", env!("CARGO_PKG_VERSION"));

    if args.count == 0 {
        bail!("--count must be at least 1");
    }

    let chain = config.chain.to_chain_model().context("Invalid chain configuration")?;
    let recipient = AccountId::from_hex(&args.recipient).context("Invalid recipient")?;
    let key = args
        .key_file
        .as_deref()
        .map(Ed25519SigningWrapper::from_key_file)
        .transpose()
        .context("Failed to load signing key")?;

    let account = match (&key, &args.account) {
        (Some(key), _) if !chain.is_evm() => key.chain_account(),
        (_, Some(hex)) => {
            let crypto_type = if chain.is_evm() {
                CryptoType::Ethereum
            } else {
                CryptoType::Ed25519
            };
            ChainAccount::new(AccountId::from_hex(hex).context("Invalid account")?, crypto_type)
        }
        _ => bail!("either --key-file (substrate) or --account is required"),
    };

    let engine = Arc::new(HttpRpcEngine::from_config(&config.rpc).context("Failed to create RPC engine")?);
    let deps = ServiceDependencies::new(engine, account.clone()).with_era_factory(era_factory(&config.era));
    let tx_service = service::create_transaction_service(chain.clone(), deps)?;

    let trace = TraceContext::new("transfer_batch").for_chain(chain.chain_id.clone());
    let logger = StructuredLogger::new(trace.correlation_id().clone());
    logger.log_batch_requested(&chain.chain_id, "transfer", args.count);

    let fee_id = TransferFeeArgs::new("native", args.amount, Some(&recipient)).identifier();
    info!(
        fee_id = %fee_id,
        sender = %account.account_id,
        era = ?config.era,
        "Estimating fees"
    );

    let request = transfer_request(chain.is_evm(), recipient, args.amount);
    let indexes: Vec<usize> = (0..args.count).collect();
    let queue = OperationQueue::from_config(&config.queue);
    let (callback_queue, mut receiver) = CallbackQueue::channel();

    let (fee_tx, fee_rx) = tokio::sync::oneshot::channel();
    service::estimate_fee(
        tx_service.as_ref(),
        request.clone(),
        indexes.clone(),
        &queue,
        &callback_queue,
        move |result| {
            let _ = fee_tx.send(result);
        },
    );
    receiver.recv_and_run().await;
    let fees = fee_rx.await.context("Fee callback dropped")??;

    for item in &fees {
        match &item.result {
            Ok(fee) => println!("[{}] fee {} ({:?})", item.index, fee.amount, fee.details),
            Err(err) => {
                logger.log_index_failed(item.index, &err.to_string());
                println!("[{}] fee error: {}", item.index, err);
            }
        }
    }

    if args.submit {
        let signer: Arc<dyn SigningWrapper> = match key {
            Some(key) if !chain.is_evm() => Arc::new(key),
            _ => bail!("--submit requires --key-file on a substrate chain"),
        };
        let submit_trace = trace.child_span("submit");
        info!(parent: &submit_trace.span(), "Submitting batch");

        let (submit_tx, submit_rx) = tokio::sync::oneshot::channel();
        service::submit(
            tx_service.as_ref(),
            request,
            signer,
            indexes,
            &queue,
            &callback_queue,
            move |result| {
                let _ = submit_tx.send(result);
            },
        );
        receiver.recv_and_run().await;
        let results = submit_rx.await.context("Submit callback dropped")??;

        let mut succeeded = 0;
        for item in &results {
            match &item.result {
                Ok(hash) => {
                    succeeded += 1;
                    logger.log_submitted(item.index, hash);
                    println!("[{}] submitted {}", item.index, hash);
                }
                Err(err) => {
                    logger.log_index_failed(item.index, &err.to_string());
                    println!("[{}] submit error: {}", item.index, err);
                }
            }
        }
        logger.log_batch_finished(succeeded, results.len() - succeeded);
    } else if key.is_none() {
        warn!("No key file given, fee estimate only");
    }

    info!(parent: &trace.span(), elapsed_ms = trace.elapsed_ms(), "Done");

    if args.print_metrics {
        print!("{}", metrics().export_text());
    }

    Ok(())
}

fn era_factory(config: &EraConfig) -> Arc<dyn EraOperationFactory> {
    if config.mortal {
        Arc::new(MortalEraOperationFactory::new(config.period))
    } else {
        Arc::new(ImmortalEraOperationFactory)
    }
}

fn transfer_request(evm: bool, recipient: AccountId, amount: Balance) -> TransactionRequest {
    if evm {
        let closure: EvmTransactionBuilderIndexedClosure =
            Arc::new(move |builder, _| Ok(builder.with_to(recipient.clone()).with_value(amount)));
        TransactionRequest::Evm(closure)
    } else {
        let closure: ExtrinsicBuilderIndexedClosure =
            Arc::new(move |builder, _| Ok(builder.adding_call(RuntimeCall::transfer(&recipient, amount))));
        TransactionRequest::Extrinsic(closure)
    }
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path).with_context(|| format!("Failed to load config from {}", path))
    } else {
        let mut config = Config::default();
        config
            .apply_overrides(|key| std::env::var(key).ok())
            .context("Invalid environment override")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_help_states_wire_format() {
        let help = Args::command().render_long_help().to_string();
        assert!(help.contains("not SCALE or RLP"));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["txflow", "--recipient", "0x22"]).unwrap();
        assert_eq!(args.count, 1);
        assert!(!args.submit);
    }
}
