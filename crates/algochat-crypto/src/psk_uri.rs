//! Out-of-band PSK exchange URIs: `algochat-psk://v1?addr=...&psk=...&label=...`.
//!
//! Two parties who can share a link or scan a QR code bootstrap a
//! quantum-defended [`crate::psk_ratchet`] session without either side
//! needing to be online — the address identifies the contact, the PSK
//! seeds `currentPSK(0)`, and the label is a human-readable reminder of
//! who this is.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use data_encoding::BASE32_NOPAD;
use url::Url;

const SCHEME: &str = "algochat-psk";
const VERSION_HOST: &str = "v1";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PskUriError {
    #[error("not a valid URI: {0}")]
    Malformed(String),
    #[error("expected scheme \"{SCHEME}\", got {0:?}")]
    SchemeMismatch(String),
    #[error("expected version \"{VERSION_HOST}\", got {0:?}")]
    UnsupportedVersion(Option<String>),
    #[error("missing required \"addr\" query parameter")]
    MissingAddr,
    #[error("\"addr\" is not valid base32 or not 32 bytes")]
    InvalidAddr,
    #[error("missing required \"psk\" query parameter")]
    MissingPsk,
    #[error("\"psk\" decodes to {0} bytes, expected 32")]
    InvalidPskLength(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PskExchangeUri {
    pub address: [u8; 32],
    pub psk: [u8; 32],
    pub label: Option<String>,
}

pub fn parse(uri: &str) -> Result<PskExchangeUri, PskUriError> {
    let url = Url::parse(uri).map_err(|e| PskUriError::Malformed(e.to_string()))?;

    if url.scheme() != SCHEME {
        return Err(PskUriError::SchemeMismatch(url.scheme().to_string()));
    }
    if url.host_str() != Some(VERSION_HOST) {
        return Err(PskUriError::UnsupportedVersion(url.host_str().map(str::to_string)));
    }

    let mut addr: Option<String> = None;
    let mut psk: Option<String> = None;
    let mut label: Option<String> = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "addr" => addr = Some(value.into_owned()),
            "psk" => psk = Some(value.into_owned()),
            "label" => label = Some(value.into_owned()),
            _ => {}
        }
    }

    let addr = addr.ok_or(PskUriError::MissingAddr)?;
    let address_bytes = BASE32_NOPAD
        .decode(addr.to_uppercase().as_bytes())
        .map_err(|_| PskUriError::InvalidAddr)?;
    let address: [u8; 32] = address_bytes.try_into().map_err(|_| PskUriError::InvalidAddr)?;

    let psk = psk.ok_or(PskUriError::MissingPsk)?;
    let psk_bytes = URL_SAFE_NO_PAD
        .decode(psk.as_bytes())
        .map_err(|_| PskUriError::InvalidPskLength(0))?;
    let psk_len = psk_bytes.len();
    let psk: [u8; 32] = psk_bytes
        .try_into()
        .map_err(|_| PskUriError::InvalidPskLength(psk_len))?;

    Ok(PskExchangeUri { address, psk, label })
}

pub fn format(exchange: &PskExchangeUri) -> String {
    let addr = BASE32_NOPAD.encode(&exchange.address);
    let psk = URL_SAFE_NO_PAD.encode(exchange.psk);
    let mut url = Url::parse(&format!("{SCHEME}://{VERSION_HOST}")).expect("static scheme and host are valid");
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("addr", &addr);
        pairs.append_pair("psk", &psk);
        if let Some(label) = &exchange.label {
            pairs.append_pair("label", label);
        }
    }
    url.into()
}
