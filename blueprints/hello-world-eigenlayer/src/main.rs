use clap::Parser;
use hello_world_operator_eigenlayer::config::{OperatorCli, OperatorConfig};
use hello_world_operator_eigenlayer::context::OperatorContext;
use hello_world_operator_eigenlayer::evm;
use hello_world_operator_eigenlayer::runner::OperatorRunner;
use operator_logging::{error, info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = OperatorCli::parse();
    operator_logging::setup_log(cli.verbose, cli.pretty);

    info!("~~~ Starting the Hello World operator ~~~");
    if let Err(e) = run(cli).await {
        error!("Operator stopped: {e}");
        return Err(e.into());
    }
    Ok(())
}

async fn run(cli: OperatorCli) -> hello_world_operator_eigenlayer::Result<()> {
    let config = OperatorConfig::load(&cli.config)?;
    let gateway = evm::connect(
        &config.provider,
        &config.identity,
        config.addresses,
        config.transactions.rpc_timeout,
    )
    .await?;
    let ctx = OperatorContext::resolve(
        Arc::new(gateway),
        config.identity,
        config.addresses,
        config.transactions.rpc_timeout,
    )
    .await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signals: {e}");
            std::future::pending::<()>().await;
        }
    };

    OperatorRunner::new(
        ctx,
        config.monitor,
        config.transactions,
        config.responder,
    )
    .skip_registration(cli.skip_registration)
    .execute(shutdown)
    .await
}
