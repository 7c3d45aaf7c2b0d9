//! Two-phase operator registration: EigenLayer first, then the Hello World AVS.

use crate::constants::{
    DELEGATION_APPROVER, OPERATOR_METADATA_URL, SIGNATURE_EXPIRY, STAKER_OPT_OUT_WINDOW_BLOCKS,
};
use crate::context::OperatorContext;
use crate::gateway::{
    with_timeout, ChainGateway, ContractCall, DigestRequest, GatewayError, OperatorDetails,
};
use crate::identity::{Identity, IdentityError};
use crate::tx::{submit_and_confirm, TxError, TxPolicy};
use alloy_primitives::{Bytes, B256, U256};
use operator_logging::{debug, info};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A one-time authorization for registering with the AVS.
///
/// Built fresh for every registration attempt and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSignature {
    pub salt: B256,
    /// Unix timestamp after which the signature is rejected
    pub expiry: U256,
    pub signature: Bytes,
}

impl RegistrationSignature {
    /// Signs `digest`, the directory's registration digest for `salt` and `expiry`.
    ///
    /// # Errors
    /// - [`IdentityError`] if signing fails
    pub fn sign(
        identity: &Identity,
        digest: &B256,
        salt: B256,
        expiry: U256,
    ) -> Result<Self, IdentityError> {
        let signature = identity.sign_hash(digest)?;
        Ok(Self {
            salt,
            expiry,
            signature: Bytes::copy_from_slice(&signature.as_bytes()),
        })
    }
}

/// A random 32-byte salt.
#[must_use]
pub fn fresh_salt() -> B256 {
    B256::from(rand::random::<[u8; 32]>())
}

/// One hour from `now`.
#[must_use]
pub fn signature_expiry(now: SystemTime) -> U256 {
    now.duration_since(UNIX_EPOCH).map_or_else(
        |_| SIGNATURE_EXPIRY,
        |duration| U256::from(duration.as_secs()) + SIGNATURE_EXPIRY,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    /// Registered with the EigenLayer delegation manager
    BaseLayer,
    /// Registered with the AVS stake registry
    Service,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Unregistered => "unregistered",
            Self::BaseLayer => "registered on EigenLayer",
            Self::Service => "registered on the AVS",
        };
        f.write_str(state)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("EigenLayer operator registration failed: {0}")]
    BaseLayer(#[source] TxError),
    #[error("Failed to fetch the AVS registration digest: {0}")]
    Digest(#[source] GatewayError),
    #[error("Failed to sign the AVS registration digest: {0}")]
    Sign(#[source] IdentityError),
    #[error("AVS operator registration failed: {0}")]
    Service(#[source] TxError),
}

impl RegistrationError {
    /// The last state reached before the failure.
    #[must_use]
    pub fn reached(&self) -> RegistrationState {
        match self {
            Self::BaseLayer(_) => RegistrationState::Unregistered,
            Self::Digest(_) | Self::Sign(_) | Self::Service(_) => RegistrationState::BaseLayer,
        }
    }
}

/// Registers the operator with EigenLayer, then with the AVS.
///
/// Each transaction must be mined successfully before the next step starts.
/// Nothing is persisted: running this again against an already registered
/// operator is rejected by the contracts.
///
/// # Errors
/// - [`RegistrationError::BaseLayer`] if `registerAsOperator` failed; the AVS step is skipped
/// - [`RegistrationError::Digest`] or [`RegistrationError::Sign`] if the AVS signature could not be built
/// - [`RegistrationError::Service`] if `registerOperatorWithSignature` failed
pub async fn register_operator<G: ChainGateway + ?Sized>(
    ctx: &OperatorContext<G>,
    policy: &TxPolicy,
) -> Result<RegistrationState, RegistrationError> {
    let operator = ctx.identity.address();
    let gateway = &*ctx.gateway;

    info!("Registering operator {operator} on EigenLayer");
    let details = OperatorDetails {
        earnings_receiver: operator,
        delegation_approver: DELEGATION_APPROVER,
        staker_opt_out_window_blocks: STAKER_OPT_OUT_WINDOW_BLOCKS,
    };
    let receipt = submit_and_confirm(
        gateway,
        ContractCall::RegisterAsOperator {
            details,
            metadata_url: OPERATOR_METADATA_URL.to_string(),
        },
        policy,
    )
    .await
    .map_err(RegistrationError::BaseLayer)?;
    info!(
        "Operator {} in transaction {}",
        RegistrationState::BaseLayer,
        receipt.tx_hash
    );

    let request = DigestRequest {
        operator,
        avs: ctx.addresses.service_manager,
        salt: fresh_salt(),
        expiry: signature_expiry(SystemTime::now()),
    };
    debug!(
        "Registration parameters: operator={operator}, avs={}, salt={}, expiry={}",
        request.avs, request.salt, request.expiry
    );
    let digest = with_timeout(
        "calculateOperatorAVSRegistrationDigestHash",
        policy.rpc_timeout,
        gateway.registration_digest_hash(request),
    )
    .await
    .map_err(RegistrationError::Digest)?;

    let signature =
        RegistrationSignature::sign(&ctx.identity, &digest, request.salt, request.expiry)
            .map_err(RegistrationError::Sign)?;

    let receipt = submit_and_confirm(
        gateway,
        ContractCall::RegisterOperatorWithSignature {
            operator,
            signature,
        },
        policy,
    )
    .await
    .map_err(RegistrationError::Service)?;
    info!(
        "Operator {} in transaction {}",
        RegistrationState::Service,
        receipt.tx_hash
    );

    Ok(RegistrationState::Service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContractAddresses;
    use crate::testing::{fast_tx_policy, test_identity, MockGateway, Outcome, CHAIN_ID};
    use alloy_primitives::{Address, Signature};
    use std::sync::Arc;
    use std::time::Duration;

    fn context(gateway: MockGateway) -> OperatorContext<MockGateway> {
        OperatorContext {
            chain_id: CHAIN_ID,
            addresses: ContractAddresses {
                service_manager: Address::repeat_byte(0xaa),
                delegation_manager: Address::repeat_byte(0xbb),
                stake_registry: Address::repeat_byte(0xcc),
                avs_directory: Address::repeat_byte(0xdd),
            },
            identity: Arc::new(test_identity()),
            gateway: Arc::new(gateway),
        }
    }

    #[tokio::test]
    async fn registers_on_both_layers_in_order() {
        let ctx = context(MockGateway::new());
        let operator = ctx.identity.address();

        let state = register_operator(&ctx, &fast_tx_policy()).await.unwrap();
        assert_eq!(state, RegistrationState::Service);

        let submissions = ctx.gateway.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(
            submissions[0],
            ContractCall::RegisterAsOperator {
                details: OperatorDetails {
                    earnings_receiver: operator,
                    delegation_approver: Address::ZERO,
                    staker_opt_out_window_blocks: 0,
                },
                metadata_url: String::new(),
            }
        );

        let requests = ctx.gateway.digest_requests();
        assert_eq!(requests.len(), 1);
        let request = requests[0];
        assert_eq!(request.operator, operator);
        assert_eq!(request.avs, ctx.addresses.service_manager);

        let ContractCall::RegisterOperatorWithSignature {
            operator: registered,
            signature,
        } = &submissions[1]
        else {
            panic!("unexpected call {:?}", submissions[1]);
        };
        assert_eq!(*registered, operator);
        assert_eq!(signature.salt, request.salt);
        assert_eq!(signature.expiry, request.expiry);

        let recovered = Signature::try_from(&signature.signature[..])
            .unwrap()
            .recover_address_from_prehash(&MockGateway::digest_for(&request))
            .unwrap();
        assert_eq!(recovered, operator);
    }

    #[tokio::test]
    async fn failed_base_layer_step_stops_registration() {
        let ctx = context(MockGateway::new().with_outcomes([Outcome::Reverted]));

        let err = register_operator(&ctx, &fast_tx_policy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::BaseLayer(TxError::Reverted { .. })
        ));
        assert_eq!(err.reached(), RegistrationState::Unregistered);
        assert_eq!(ctx.gateway.submissions().len(), 1);
        assert!(ctx.gateway.digest_requests().is_empty());
    }

    #[tokio::test]
    async fn unreachable_node_stops_registration() {
        let ctx = context(MockGateway::new().with_outcomes([Outcome::SubmitFails]));

        let err = register_operator(&ctx, &fast_tx_policy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::BaseLayer(TxError::Gateway(_))
        ));
        assert!(ctx.gateway.digest_requests().is_empty());
    }

    #[tokio::test]
    async fn digest_failure_skips_the_service_step() {
        let ctx = context(MockGateway::new().failing_digest());

        let err = register_operator(&ctx, &fast_tx_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Digest(_)));
        assert_eq!(err.reached(), RegistrationState::BaseLayer);
        assert_eq!(ctx.gateway.submissions().len(), 1);
    }

    #[tokio::test]
    async fn failed_service_step_is_reported() {
        let ctx =
            context(MockGateway::new().with_outcomes([Outcome::Success, Outcome::Reverted]));

        let err = register_operator(&ctx, &fast_tx_policy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Service(TxError::Reverted { .. })
        ));
        assert_eq!(ctx.gateway.submissions().len(), 2);
    }

    #[tokio::test]
    async fn every_attempt_uses_a_fresh_salt() {
        let first = context(MockGateway::new());
        let second = context(MockGateway::new());
        register_operator(&first, &fast_tx_policy()).await.unwrap();
        register_operator(&second, &fast_tx_policy()).await.unwrap();

        assert_ne!(
            first.gateway.digest_requests()[0].salt,
            second.gateway.digest_requests()[0].salt
        );
    }

    #[test]
    fn expiry_is_one_hour_ahead() {
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(signature_expiry(now), U256::from(1_700_003_600_u64));
    }
}
