use crate::auth::CredentialState;

use super::routes::Visibility;

/// Outcome of the gate for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Deny,
}

/// Public paths are admitted whatever the credential state; protected ones
/// only with a valid credential.
pub fn decide(visibility: Visibility, credential: &CredentialState) -> Decision {
    match (visibility, credential) {
        (Visibility::Public, _) => Decision::Admit,
        (Visibility::Protected, CredentialState::Valid(_)) => Decision::Admit,
        (Visibility::Protected, CredentialState::Absent | CredentialState::Invalid(_)) => {
            Decision::Deny
        }
    }
}
