use alloy_sol_types::sol;

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod evm;
pub mod gateway;
pub mod identity;
pub mod monitor;
pub mod queue;
pub mod registration;
pub mod responder;
pub mod runner;
pub mod tx;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

// Only the entry points the operator touches are declared here.
sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IDelegationManager {
        struct OperatorDetails {
            address earningsReceiver;
            address delegationApprover;
            uint32 stakerOptOutWindowBlocks;
        }

        function registerAsOperator(
            OperatorDetails calldata registeringOperatorDetails,
            string calldata metadataURI
        ) external;
    }

    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IAVSDirectory {
        function calculateOperatorAVSRegistrationDigestHash(
            address operator,
            address avs,
            bytes32 salt,
            uint256 expiry
        ) external view returns (bytes32);
    }

    #[allow(missing_docs)]
    #[sol(rpc)]
    interface ECDSAStakeRegistry {
        struct SignatureWithSaltAndExpiry {
            bytes signature;
            bytes32 salt;
            uint256 expiry;
        }

        function registerOperatorWithSignature(
            address operator,
            SignatureWithSaltAndExpiry memory operatorSignature
        ) external;
    }

    #[allow(missing_docs)]
    #[sol(rpc)]
    interface HelloWorldServiceManager {
        struct Task {
            string name;
            uint32 taskCreatedBlock;
        }

        event NewTaskCreated(uint32 indexed taskIndex, Task task);

        function respondToTask(
            Task calldata task,
            uint32 referenceTaskIndex,
            bytes calldata signature
        ) external;
    }
);
