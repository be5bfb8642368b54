use uuid::Uuid;

/// Signals emitted for consumers outside the core (UI badges, refresh of credential lists).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    NewCredential {
        batch_id: Uuid,
        credential_issuer: String,
        credential_configuration_id: String,
        instances: usize,
    },
    PresentationSent {
        presentation_identifier: String,
        verifier_domain: String,
    },
}
