//! Client certificate configuration for EAP and VPN services.

use log::debug;
use serde::Deserialize;

use crate::api::models::CertificatePattern;
use crate::types::constants::{client_cert_property, network_type, provider_type, security};
use crate::types::property::{PropertyMap, PropertyValue};

/// Access to the user's certificate store.
///
/// Provided by the embedder; the connection handler only queries it.
pub trait CertificateStore {
    fn is_user_logged_in(&self) -> bool;

    /// True once the initial certificate load has completed.
    fn certificates_loaded(&self) -> bool;

    /// True if keys live in a hardware (TPM) backed token.
    fn is_hardware_backed(&self) -> bool;

    fn tpm_token_slot(&self) -> String;

    fn tpm_user_pin(&self) -> String;

    /// Returns the PKCS#11 id of a certificate matching `pattern`.
    fn find_matching_certificate(&self, pattern: &CertificatePattern) -> Option<String>;
}

/// How a service consumes its client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCertType {
    None,
    OpenVpn,
    Ipsec,
    Eap,
}

/// Decides which certificate properties a service needs.
///
/// L2TP/IPsec only uses a client certificate when one was configured, either
/// through a policy pattern or an explicit client cert id.
pub fn client_cert_type(
    service_type: &str,
    service_security: &str,
    vpn_provider_type: &str,
    has_cert_pattern: bool,
    has_client_cert_id: bool,
) -> ClientCertType {
    match service_type {
        network_type::VPN => match vpn_provider_type {
            provider_type::OPENVPN => ClientCertType::OpenVpn,
            provider_type::L2TP_IPSEC if has_cert_pattern || has_client_cert_id => {
                ClientCertType::Ipsec
            }
            _ => ClientCertType::None,
        },
        network_type::WIFI if service_security == security::IEEE8021X => ClientCertType::Eap,
        _ => ClientCertType::None,
    }
}

/// Adds the TPM slot, PIN and certificate id properties for `cert_type`.
///
/// Id properties are only set when `pkcs11_id` is present and non-empty;
/// the PIN only when non-empty.
pub fn set_shill_properties(
    cert_type: ClientCertType,
    tpm_slot: &str,
    tpm_pin: &str,
    pkcs11_id: Option<&str>,
    properties: &mut PropertyMap,
) {
    let pkcs11_id = pkcs11_id.filter(|id| !id.is_empty());
    let mut set = |key: &str, value: &str| {
        properties.insert(key.to_owned(), PropertyValue::from(value));
    };
    let pin_property = match cert_type {
        ClientCertType::None => return,
        ClientCertType::OpenVpn => {
            if let Some(id) = pkcs11_id {
                set(client_cert_property::OPENVPN_CLIENT_CERT_ID, id);
            }
            client_cert_property::OPENVPN_PIN
        }
        ClientCertType::Ipsec => {
            set(client_cert_property::L2TP_IPSEC_CLIENT_CERT_SLOT, tpm_slot);
            if let Some(id) = pkcs11_id {
                set(client_cert_property::L2TP_IPSEC_CLIENT_CERT_ID, id);
            }
            client_cert_property::L2TP_IPSEC_PIN
        }
        ClientCertType::Eap => {
            // Shill wants both even though they name the same object.
            if let Some(id) = pkcs11_id {
                set(client_cert_property::EAP_CERT_ID, id);
                set(client_cert_property::EAP_KEY_ID, id);
            }
            client_cert_property::EAP_PIN
        }
    };
    if !tpm_pin.is_empty() {
        set(pin_property, tpm_pin);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UiData {
    certificate_type: String,
    certificate_pattern: Option<CertificatePattern>,
}

/// Extracts the policy certificate pattern from a service's `UIData` JSON.
///
/// Returns `None` unless the data selects a pattern and the pattern is
/// non-empty. Malformed data is treated as no pattern.
pub fn certificate_pattern_from_ui_data(ui_data: &str) -> Option<CertificatePattern> {
    if ui_data.is_empty() {
        return None;
    }
    let parsed: UiData = match serde_json::from_str(ui_data) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Ignoring malformed UIData: {e}");
            return None;
        }
    };
    if parsed.certificate_type != "pattern" {
        return None;
    }
    parsed.certificate_pattern.filter(|pattern| !pattern.is_empty())
}
