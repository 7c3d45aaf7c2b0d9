use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::identity::IdentityError;
use crate::registration::RegistrationError;

/// Conditions that stop the operator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error("Task monitor stopped unexpectedly: {0}")]
    MonitorStopped(String),
}

pub type Result<T> = std::result::Result<T, Error>;
