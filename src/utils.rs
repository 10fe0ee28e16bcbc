//! Utility functions for identifier minting and decoding

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32m under the given prefix
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Returns the uuid7 payload when `encoded` is a bech32 string minted under `hrp`.
pub fn bech32_payload(encoded: &str, hrp: &str) -> Option<[u8; 16]> {
    let (decoded_hrp, data) = bech32::decode(encoded.trim()).ok()?;
    if decoded_hrp.as_str() != hrp {
        return None;
    }
    data.try_into().ok()
}
