//! secp256k1 key derivation for range candidates

use std::sync::OnceLock;

use k256::{elliptic_curve::sec1::ToEncodedPoint, SecretKey};
use num_bigint::BigUint;
use num_traits::Zero;
use thiserror::Error;

/// SEC1 compressed public key: 0x02/0x03 parity byte || x
pub type CompressedPublicKey = [u8; 33];

/// Group order n, big-endian
const CURVE_ORDER_BE: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeriveError {
    #[error("invalid scalar: zero is not a private key")]
    ZeroScalar,
    #[error("invalid scalar: {0} is not below the curve order")]
    OutOfRange(String),
    #[error("invalid scalar: rejected by curve arithmetic")]
    Rejected,
}

/// Turns a private scalar into a public key encoding.
///
/// Implementations must be pure: the same scalar always yields the same
/// bytes, and they are shared between worker threads.
pub trait KeyDeriver: Send + Sync {
    /// Curve name for logs
    fn name(&self) -> &'static str;

    /// Derive the compressed public key for `scalar`
    fn derive(&self, scalar: &BigUint) -> Result<CompressedPublicKey, DeriveError>;
}

/// secp256k1 backed by `k256`
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1;

impl KeyDeriver for Secp256k1 {
    fn name(&self) -> &'static str {
        "secp256k1"
    }

    fn derive(&self, scalar: &BigUint) -> Result<CompressedPublicKey, DeriveError> {
        if scalar.is_zero() {
            return Err(DeriveError::ZeroScalar);
        }
        if scalar >= curve_order() {
            return Err(DeriveError::OutOfRange(scalar_hex(scalar)));
        }
        // Below n, so always fits in 32 bytes
        let bytes = scalar_to_bytes(scalar).ok_or(DeriveError::Rejected)?;
        let secret_key =
            SecretKey::from_bytes((&bytes).into()).map_err(|_| DeriveError::Rejected)?;

        let point = secret_key.public_key().to_encoded_point(true);
        let mut result = [0u8; 33];
        result.copy_from_slice(point.as_bytes());
        Ok(result)
    }
}

/// The secp256k1 group order n
pub fn curve_order() -> &'static BigUint {
    static ORDER: OnceLock<BigUint> = OnceLock::new();
    ORDER.get_or_init(|| BigUint::from_bytes_be(&CURVE_ORDER_BE))
}

/// Big-endian 32-byte encoding, `None` if the value needs more than 256 bits
pub fn scalar_to_bytes(scalar: &BigUint) -> Option<[u8; 32]> {
    let raw = scalar.to_bytes_be();
    if raw.len() > 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out[32 - raw.len()..].copy_from_slice(&raw);
    Some(out)
}

/// Fixed-width 64 hex digit rendering of a scalar
pub fn scalar_hex(scalar: &BigUint) -> String {
    format!("{:0>64}", scalar.to_str_radix(16))
}
