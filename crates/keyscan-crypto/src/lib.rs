//! KeyScan Crypto Primitives
//!
//! The per-candidate pipeline: secp256k1 key derivation, hash160 digests
//! and the Base58Check encodings used for targets and exported keys.

pub mod secp256k1;
pub mod hash;
pub mod encoding;

pub use self::hash::{Hash160, HashError};
pub use self::secp256k1::{
    curve_order, scalar_hex, scalar_to_bytes, CompressedPublicKey, DeriveError, KeyDeriver,
    Secp256k1,
};

// Re-export dependencies for use by other crates
pub use hex;
pub use num_bigint;
