//! Credential hashing
//!
//! Users carry a salted Argon2id hash of their secret. The ledger never
//! authenticates anyone; the hash is stored so an outer layer can.
//!
//! Format: `argon2id$<base64 salt>$<hex key>`

use base64::Engine;
use rand::Rng;

use super::result::{Error, Result};

const SCHEME: &str = "argon2id";
const KEY_LEN: usize = 32;

/// Argon2id parameters (memory KiB, iterations, lanes)
const MEMORY_COST: u32 = 19_456;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

fn derive(secret: &str, salt: &[u8]) -> Result<Vec<u8>> {
    let params = argon2::Params::new(MEMORY_COST, TIME_COST, PARALLELISM, Some(KEY_LEN))
        .map_err(|e| Error::Config(format!("Failed to create argon2 params: {:?}", e)))?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = vec![0u8; KEY_LEN];
    argon2
        .hash_password_into(secret.as_bytes(), salt, &mut key)
        .map_err(|e| Error::Config(format!("Failed to derive credential hash: {:?}", e)))?;
    Ok(key)
}

/// Hash a secret with a fresh random salt
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let key = derive(secret, &salt)?;
    Ok(format!(
        "{}${}${}",
        SCHEME,
        base64::engine::general_purpose::STANDARD.encode(salt),
        hex::encode(key)
    ))
}

/// Check a secret against a stored hash
///
/// Hashes that are not in the `argon2id$` format never match.
pub fn verify_secret(secret: &str, stored: &str) -> Result<bool> {
    let mut parts = stored.splitn(3, '$');
    let (Some(SCHEME), Some(salt_b64), Some(key_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return Ok(false);
    };
    let Ok(salt) = base64::engine::general_purpose::STANDARD.decode(salt_b64) else {
        return Ok(false);
    };
    let key = derive(secret, &salt)?;
    Ok(hex::encode(key) == key_hex)
}
