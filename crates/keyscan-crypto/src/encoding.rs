//! Base58Check encodings: P2PKH addresses and WIF private keys

use thiserror::Error;

use crate::hash::{double_sha256, Hash160};

/// Mainnet P2PKH version byte
pub const P2PKH_VERSION: u8 = 0x00;
/// Mainnet WIF version byte
pub const WIF_VERSION: u8 = 0x80;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Invalid checksum")]
    InvalidChecksum,
    #[error("Invalid character in input")]
    InvalidCharacter,
    #[error("Invalid length")]
    InvalidLength,
    #[error("Unsupported version byte 0x{0:02x}")]
    UnsupportedVersion(u8),
}

/// Base58Check encode (version byte, payload, 4-byte checksum)
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + 4);
    data.push(version);
    data.extend_from_slice(payload);

    let checksum = double_sha256(&data);
    data.extend_from_slice(&checksum[..4]);

    bs58::encode(data).into_string()
}

/// Base58Check decode, returns (version, payload)
pub fn base58check_decode(input: &str) -> Result<(u8, Vec<u8>), EncodingError> {
    let data = bs58::decode(input)
        .into_vec()
        .map_err(|_| EncodingError::InvalidCharacter)?;

    if data.len() < 5 {
        return Err(EncodingError::InvalidLength);
    }

    let (payload_with_version, checksum) = data.split_at(data.len() - 4);
    let computed_checksum = &double_sha256(payload_with_version)[..4];

    if checksum != computed_checksum {
        return Err(EncodingError::InvalidChecksum);
    }

    let version = payload_with_version[0];
    let payload = payload_with_version[1..].to_vec();

    Ok((version, payload))
}

/// Encode WIF (Wallet Import Format) for a compressed-key private key
pub fn wif_encode(private_key: &[u8; 32]) -> String {
    let mut payload = Vec::with_capacity(33);
    payload.extend_from_slice(private_key);
    payload.push(0x01);
    base58check_encode(WIF_VERSION, &payload)
}

/// Legacy `1...` address for a digest
pub fn p2pkh_address(digest: &Hash160) -> String {
    base58check_encode(P2PKH_VERSION, digest.as_bytes())
}

/// Recover the digest from a legacy `1...` address
pub fn p2pkh_digest(address: &str) -> Result<Hash160, EncodingError> {
    let (version, payload) = base58check_decode(address.trim())?;
    if version != P2PKH_VERSION {
        return Err(EncodingError::UnsupportedVersion(version));
    }
    let bytes: [u8; 20] = payload
        .as_slice()
        .try_into()
        .map_err(|_| EncodingError::InvalidLength)?;
    Ok(Hash160::from_bytes(bytes))
}
