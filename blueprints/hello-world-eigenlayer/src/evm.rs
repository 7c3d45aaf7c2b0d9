use crate::context::ContractAddresses;
use crate::gateway::{
    with_timeout, ChainGateway, ContractCall, DigestRequest, GatewayError, TxReceipt,
};
use crate::identity::Identity;
use crate::monitor::TaskEvent;
use crate::{ECDSAStakeRegistry, HelloWorldServiceManager, IAVSDirectory, IDelegationManager};
use alloy_network::{Ethereum, Network, TransactionBuilder};
use alloy_primitives::{TxHash, B256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_transport::{Transport, TransportError};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::time::Duration;
use url::Url;

type TransactionRequest = <Ethereum as Network>::TransactionRequest;

/// Builds a wallet-backed HTTP provider for `endpoint` that signs every call as `identity`,
/// and binds the gateway to the chain the node reports.
///
/// # Errors
/// - [`GatewayError`] if the node cannot report its chain id within `rpc_timeout`
pub async fn connect(
    endpoint: &Url,
    identity: &Identity,
    addresses: ContractAddresses,
    rpc_timeout: Duration,
) -> Result<impl ChainGateway, GatewayError> {
    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(identity.wallet())
        .on_http(endpoint.clone());
    let chain_id = with_timeout("eth_chainId", rpc_timeout, async {
        provider.get_chain_id().await.map_err(transport_error)
    })
    .await?;
    Ok(EvmGateway::new(provider, addresses, chain_id))
}

/// [`ChainGateway`] over an alloy provider and the Hello World contract bindings.
///
/// Every transaction it sends carries the chain id it was built with.
pub struct EvmGateway<T, P> {
    provider: P,
    addresses: ContractAddresses,
    chain_id: u64,
    _transport: PhantomData<fn() -> T>,
}

impl<T, P> EvmGateway<T, P>
where
    T: Transport + Clone,
    P: Provider<T, Ethereum> + Clone,
{
    pub fn new(provider: P, addresses: ContractAddresses, chain_id: u64) -> Self {
        Self {
            provider,
            addresses,
            chain_id,
            _transport: PhantomData,
        }
    }

    /// Encodes `call` against its contract, pinned to this gateway's chain.
    fn transaction(&self, call: ContractCall) -> TransactionRequest {
        let request = match call {
            ContractCall::RegisterAsOperator {
                details,
                metadata_url,
            } => {
                let manager = IDelegationManager::new(
                    self.addresses.delegation_manager,
                    self.provider.clone(),
                );
                manager
                    .registerAsOperator(
                        IDelegationManager::OperatorDetails {
                            earningsReceiver: details.earnings_receiver,
                            delegationApprover: details.delegation_approver,
                            stakerOptOutWindowBlocks: details.staker_opt_out_window_blocks,
                        },
                        metadata_url,
                    )
                    .into_transaction_request()
            }
            ContractCall::RegisterOperatorWithSignature {
                operator,
                signature,
            } => {
                let registry =
                    ECDSAStakeRegistry::new(self.addresses.stake_registry, self.provider.clone());
                registry
                    .registerOperatorWithSignature(
                        operator,
                        ECDSAStakeRegistry::SignatureWithSaltAndExpiry {
                            signature: signature.signature,
                            salt: signature.salt,
                            expiry: signature.expiry,
                        },
                    )
                    .into_transaction_request()
            }
            ContractCall::RespondToTask(response) => {
                let service = HelloWorldServiceManager::new(
                    self.addresses.service_manager,
                    self.provider.clone(),
                );
                service
                    .respondToTask(
                        HelloWorldServiceManager::Task {
                            name: response.task_name,
                            taskCreatedBlock: response.task_created_block,
                        },
                        response.task_index,
                        response.signature,
                    )
                    .into_transaction_request()
            }
        };
        request.with_chain_id(self.chain_id)
    }
}

#[async_trait]
impl<T, P> ChainGateway for EvmGateway<T, P>
where
    T: Transport + Clone + Send + Sync + 'static,
    P: Provider<T, Ethereum> + Clone + Send + Sync + 'static,
{
    async fn chain_id(&self) -> Result<u64, GatewayError> {
        Ok(self.chain_id)
    }

    async fn submit(&self, call: ContractCall) -> Result<TxHash, GatewayError> {
        let pending = self
            .provider
            .send_transaction(self.transaction(call))
            .await
            .map_err(transport_error)?;
        Ok(*pending.tx_hash())
    }

    async fn registration_digest_hash(
        &self,
        request: DigestRequest,
    ) -> Result<B256, GatewayError> {
        let directory = IAVSDirectory::new(self.addresses.avs_directory, self.provider.clone());
        let digest = directory
            .calculateOperatorAVSRegistrationDigestHash(
                request.operator,
                request.avs,
                request.salt,
                request.expiry,
            )
            .call()
            .await
            .map_err(contract_error)?;
        Ok(digest._0)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TxReceipt>, GatewayError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(transport_error)?;
        Ok(receipt.map(|receipt| TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
        }))
    }

    async fn new_task_events(&self, from_block: u64) -> Result<Vec<TaskEvent>, GatewayError> {
        let service =
            HelloWorldServiceManager::new(self.addresses.service_manager, self.provider.clone());
        let logs = service
            .NewTaskCreated_filter()
            .from_block(from_block)
            .query()
            .await
            .map_err(contract_error)?;

        Ok(logs
            .into_iter()
            .map(|(event, _log)| TaskEvent {
                task_index: event.taskIndex,
                task_created_block: event.task.taskCreatedBlock,
                task_name: event.task.name,
            })
            .collect())
    }
}

fn transport_error(e: TransportError) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

fn contract_error(e: alloy_contract::Error) -> GatewayError {
    match e {
        alloy_contract::Error::TransportError(e) => transport_error(e),
        other => GatewayError::Contract(other.to_string()),
    }
}
