use serde::Deserialize;

use wallet_providers::credential_codec::imp::registry::RegistryParams;
use wallet_providers::exchange_protocol::openid4vci::model::OpenID4VCIParams;
use wallet_providers::exchange_protocol::openid4vp::model::OpenID4VPParams;
use wallet_providers::keystore::model::KeystoreParams;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConfig {
    /// Wallet backend serving private data sync and credential storage.
    pub backend_base_url: String,
    pub openid4vci: OpenID4VCIParams,
    #[serde(default)]
    pub openid4vp: OpenID4VPParams,
    #[serde(default)]
    pub keystore: KeystoreParams,
    #[serde(default)]
    pub registry: RegistryParams,
    /// Base64 DER certificates issuer `x5c` chains must end in. Empty accepts any chain.
    #[serde(default)]
    pub issuer_trust_anchors: Vec<String>,
    #[serde(default = "default_selection_buffer")]
    pub selection_buffer: usize,
}

fn default_selection_buffer() -> usize {
    1
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:8080".to_string(),
            openid4vci: OpenID4VCIParams {
                client_id: "wallet".to_string(),
                redirect_uri: "http://localhost:8080/callback".to_string(),
                credential_issuer: "https://issuer.example.com".to_string(),
                remember_issuer_for_seconds: 86400,
                batch_size: 1,
                allow_insecure_http_transport: false,
                use_par: true,
            },
            openid4vp: OpenID4VPParams::default(),
            keystore: KeystoreParams::default(),
            registry: RegistryParams::default(),
            issuer_trust_anchors: vec![],
            selection_buffer: default_selection_buffer(),
        }
    }
}
