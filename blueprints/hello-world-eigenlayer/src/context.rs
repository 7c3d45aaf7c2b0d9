use crate::gateway::{with_timeout, ChainGateway, GatewayError};
use crate::identity::Identity;
use alloy_primitives::Address;
use operator_logging::info;
use std::sync::Arc;
use std::time::Duration;

/// Addresses of the contracts the operator interacts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    /// The Hello World service manager: emits tasks, receives responses, identifies the AVS
    pub service_manager: Address,
    pub delegation_manager: Address,
    pub stake_registry: Address,
    pub avs_directory: Address,
}

/// Everything resolved at startup and shared read-only afterwards.
pub struct OperatorContext<G: ?Sized> {
    pub chain_id: u64,
    pub addresses: ContractAddresses,
    pub identity: Arc<Identity>,
    pub gateway: Arc<G>,
}

impl<G: ?Sized> Clone for OperatorContext<G> {
    fn clone(&self) -> Self {
        Self {
            chain_id: self.chain_id,
            addresses: self.addresses,
            identity: Arc::clone(&self.identity),
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<G: ChainGateway + ?Sized> OperatorContext<G> {
    /// Looks up the chain id through `gateway` and freezes the context.
    ///
    /// # Errors
    /// - [`GatewayError`] if the chain id cannot be fetched within `rpc_timeout`
    pub async fn resolve(
        gateway: Arc<G>,
        identity: Identity,
        addresses: ContractAddresses,
        rpc_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let chain_id = with_timeout("eth_chainId", rpc_timeout, gateway.chain_id()).await?;
        info!(
            "Connected to chain {chain_id} as operator {}",
            identity.address()
        );
        Ok(Self {
            chain_id,
            addresses,
            identity: Arc::new(identity),
            gateway,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_identity, MockGateway, CHAIN_ID};

    #[tokio::test]
    async fn resolves_the_chain_id() {
        let addresses = ContractAddresses {
            service_manager: Address::repeat_byte(1),
            delegation_manager: Address::repeat_byte(2),
            stake_registry: Address::repeat_byte(3),
            avs_directory: Address::repeat_byte(4),
        };
        let context = OperatorContext::resolve(
            Arc::new(MockGateway::new()),
            test_identity(),
            addresses,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(context.chain_id, CHAIN_ID);
        assert_eq!(context.identity.address(), test_identity().address());
        assert_eq!(context.clone().addresses, addresses);
    }
}
