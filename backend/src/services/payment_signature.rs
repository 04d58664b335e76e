//! Canonical request signing for the payment gateway
//!
//! Parameters are sorted by key, empty values dropped, values URL-encoded
//! and joined as `key=value&...`. The configured passphrase is appended as a
//! final `passphrase=` pair before hashing but never sent. The signature is
//! HMAC-SHA256 keyed with the merchant key, URL-safe base64 without padding.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct PaymentSigner {
    merchant_key: String,
    passphrase: Option<String>,
}

impl std::fmt::Debug for PaymentSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSigner")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl PaymentSigner {
    pub fn new(merchant_key: impl Into<String>, passphrase: Option<String>) -> Self {
        Self {
            merchant_key: merchant_key.into(),
            passphrase: passphrase.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn from_config(config: &PaymentConfig) -> Self {
        Self::new(config.merchant_key.clone(), config.passphrase.clone())
    }

    /// Sorted `key=value` pairs without the passphrase; what goes on the wire
    pub fn query_string(fields: &[(&str, Option<&str>)]) -> String {
        let mut pairs: Vec<(&str, &str)> = fields
            .iter()
            .filter_map(|(key, value)| {
                value
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (*key, v))
            })
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        pairs
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// The exact string the signature is computed over
    pub fn canonical_string(&self, fields: &[(&str, Option<&str>)]) -> String {
        let mut canonical = Self::query_string(fields);
        if let Some(passphrase) = &self.passphrase {
            if !canonical.is_empty() {
                canonical.push('&');
            }
            canonical.push_str("passphrase=");
            canonical.push_str(&urlencoding::encode(passphrase.trim()));
        }
        canonical
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(self.merchant_key.as_bytes())
            .map_err(|_| AppError::Configuration("Invalid merchant key".to_string()))
    }

    pub fn sign(&self, fields: &[(&str, Option<&str>)]) -> AppResult<String> {
        let mut mac = self.mac()?;
        mac.update(self.canonical_string(fields).as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a received signature
    pub fn verify(&self, fields: &[(&str, Option<&str>)], signature: &str) -> bool {
        let Ok(expected) = URL_SAFE_NO_PAD.decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(self.canonical_string(fields).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    /// Gateway redirect URL with the signature as the final parameter
    pub fn build_payment_url(
        &self,
        gateway_url: &str,
        fields: &[(&str, Option<&str>)],
    ) -> AppResult<String> {
        let signature = self.sign(fields)?;
        let query = Self::query_string(fields);
        let separator = if gateway_url.contains('?') { '&' } else { '?' };

        if query.is_empty() {
            Ok(format!("{}{}signature={}", gateway_url, separator, signature))
        } else {
            Ok(format!(
                "{}{}{}&signature={}",
                gateway_url, separator, query, signature
            ))
        }
    }
}
