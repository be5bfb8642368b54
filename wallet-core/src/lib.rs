//! The **wallet core** wires the holder providers into a small set of services for the UI.
//!
//! The library consists of three crates:
//!
//! * **Providers**: credential codecs and the parser registry, the OpenID4VCI client, the
//!   OpenID4VP engine, the DPoP proof engine, the encrypted keystore and its sync, and the
//!   credential storage mirror.
//! * **Crypto**: hashing, ES256 signing, key derivation and sealing.
//! * **Core**: configuration, the [`session::Session`] and the services.
//!
//! Initialize the core, open a session and unlock it before issuing or presenting:
//!
//! ```ignore rust
//! let mut core = WalletCore::new(None, client, session_owner, None)?;
//! let selections = core.take_selection_requests();
//! let session = core.session("user-handle");
//! core.keystore_service.open(&session).await?;
//! core.keystore_service.unlock_with_password(&session, password).await?;
//! ```
//!
//! Presentations wait for the UI on the selection channel; every pending
//! [`SelectionRequested`] must be resolved or dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use wallet_crypto::imp::hasher::sha256::SHA256;
use wallet_crypto::imp::signer::es256::ES256Signer;
use wallet_crypto::imp::CryptoProviderImpl;
use wallet_crypto::CryptoProvider;

use config::WalletConfig;
use service::credential_service::CredentialService;
use service::error::ServiceError;
use service::issuance_service::IssuanceService;
use service::keystore_service::KeystoreService;
use service::presentation_service::PresentationService;
use session::Session;
use wallet_providers::common_models::event::WalletEvent;
use wallet_providers::credential_codec::imp::key_resolver::X509JwksKeyResolver;
use wallet_providers::credential_codec::imp::mdoc::MdocCodec;
use wallet_providers::credential_codec::imp::registry::CredentialParserRegistryImpl;
use wallet_providers::credential_codec::imp::sdjwt::SDJWTCodec;
use wallet_providers::credential_storage::imp::http::HttpCredentialStorage;
use wallet_providers::dpop::ProofEngineImpl;
use wallet_providers::exchange_protocol::openid4vci::flow_state::InMemoryIssuanceFlowRepository;
use wallet_providers::exchange_protocol::openid4vci::imp::OpenID4VCIClientImpl;
use wallet_providers::exchange_protocol::openid4vp::imp::OpenID4VPEngineImpl;
use wallet_providers::exchange_protocol::openid4vp::selection::{
    selection_channel, SelectionRequested,
};
use wallet_providers::exchange_protocol::openid4vp::VerifierTrustProbe;
use wallet_providers::http_client::HttpClient;
use wallet_providers::keystore::imp::EncryptedKeystore;
use wallet_providers::keystore::session_guard::{SessionGuard, SessionOwnerStore};
use wallet_providers::keystore::sync::HttpPrivateDataSync;
use wallet_providers::util::x509::decode_x5c;

pub mod config;
pub mod service;
pub mod session;

const EVENT_CAPACITY: usize = 16;

pub struct WalletCore {
    pub keystore_service: KeystoreService,
    pub issuance_service: IssuanceService,
    pub presentation_service: PresentationService,
    pub credential_service: CredentialService,
    keystore: Arc<EncryptedKeystore>,
    events: broadcast::Sender<WalletEvent>,
    selection_requests: Option<mpsc::Receiver<SelectionRequested>>,
}

impl WalletCore {
    pub fn new(
        config: Option<WalletConfig>,
        client: Arc<dyn HttpClient>,
        session_owner: Arc<dyn SessionOwnerStore>,
        verifier_trust_probe: Option<Arc<dyn VerifierTrustProbe>>,
    ) -> Result<Self, ServiceError> {
        let config = config.unwrap_or_default();

        // initialize crypto provider
        let crypto: Arc<dyn CryptoProvider> = Arc::new(CryptoProviderImpl::new(
            HashMap::from_iter(vec![("sha-256".to_string(), Arc::new(SHA256 {}) as _)]),
            HashMap::from_iter(vec![("ES256".to_string(), Arc::new(ES256Signer {}) as _)]),
        ));

        // private data lives in the backend, sealed by the keystore
        let sync = Arc::new(HttpPrivateDataSync::new(
            client.clone(),
            config.backend_base_url.clone(),
        ));
        let keystore = Arc::new(EncryptedKeystore::new(
            crypto.clone(),
            sync.clone(),
            SessionGuard::new(session_owner),
            config.keystore.clone(),
        ));
        let storage = Arc::new(HttpCredentialStorage::new(
            client.clone(),
            config.backend_base_url.clone(),
        ));

        // initialize credential codecs
        let trust_anchors = if config.issuer_trust_anchors.is_empty() {
            vec![]
        } else {
            decode_x5c(&config.issuer_trust_anchors)?
        };
        let issuer_key_resolver = Arc::new(X509JwksKeyResolver::new(client.clone(), trust_anchors));
        let sd_jwt = Arc::new(SDJWTCodec::new(crypto.clone(), issuer_key_resolver.clone()));
        let mdoc = Arc::new(MdocCodec::new(crypto.clone(), issuer_key_resolver));
        let registry = Arc::new(CredentialParserRegistryImpl::new(
            sd_jwt.clone(),
            mdoc,
            config.registry.clone(),
        ));

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        // initialize exchange protocols
        let flows = Arc::new(InMemoryIssuanceFlowRepository::new(
            config.openid4vci.remember_issuer_for_seconds,
        ));
        let issuance_client = Arc::new(OpenID4VCIClientImpl::new(
            client.clone(),
            Arc::new(ProofEngineImpl::new(crypto.clone())),
            keystore.clone(),
            storage.clone(),
            registry.clone(),
            flows.clone(),
            events.clone(),
            config.openid4vci.clone(),
        ));
        let presentation_engine = Arc::new(OpenID4VPEngineImpl::new(
            client,
            crypto,
            registry.clone(),
            sd_jwt,
            keystore.clone(),
            storage,
            events.clone(),
            verifier_trust_probe,
            config.openid4vp.clone(),
        ));

        let (selection, selection_requests) = selection_channel(config.selection_buffer.max(1));

        Ok(Self {
            keystore_service: KeystoreService::new(sync, flows.clone()),
            issuance_service: IssuanceService::new(issuance_client, flows),
            presentation_service: PresentationService::new(presentation_engine, selection),
            credential_service: CredentialService::new(registry),
            keystore,
            events,
            selection_requests: Some(selection_requests),
        })
    }

    pub fn session(&self, user_handle: impl Into<String>) -> Session {
        Session::new(user_handle, self.keystore.clone())
    }

    /// Credential selections the UI has to resolve. Available once.
    pub fn take_selection_requests(&mut self) -> Option<mpsc::Receiver<SelectionRequested>> {
        self.selection_requests.take()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
