//! BIP38 password-protected private keys
//!
//! Only the non-EC-multiplied form (`0x0142` prefix) is decrypted. Keys made
//! with the EC-multiply mode (`0x0143`) are recognised so the user gets a
//! clear format error instead of a password prompt.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::Aes256;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::{Secp256k1, SecretKey, Signing};
use bitcoin::{Address, Network, PrivateKey};
use zeroize::Zeroizing;

const PAYLOAD_LEN: usize = 39;
const PREFIX: u8 = 0x01;
const NON_EC_MULTIPLIED: u8 = 0x42;
const EC_MULTIPLIED: u8 = 0x43;
const COMPRESSED_FLAG: u8 = 0x20;

// scrypt parameters fixed by BIP38
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 8;

/// Why a BIP38 key could not be decrypted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bip38Error {
    /// Not a key we can decrypt at all
    Unsupported(String),
    /// The password does not match the embedded address checksum
    WrongPassphrase,
}

fn decode_payload(text: &str) -> Option<Zeroizing<Vec<u8>>> {
    let payload = Zeroizing::new(bs58::decode(text).with_check(None).into_vec().ok()?);
    let well_formed = payload.len() == PAYLOAD_LEN
        && payload[0] == PREFIX
        && (payload[1] == NON_EC_MULTIPLIED || payload[1] == EC_MULTIPLIED);
    well_formed.then_some(payload)
}

/// Whether `text` looks like a BIP38 encrypted key
pub fn is_encrypted_key(text: &str) -> bool {
    text.starts_with("6P") && decode_payload(text).is_some()
}

/// Reject keys this module cannot decrypt, before anyone is asked for a password
pub fn check_supported(text: &str) -> Result<(), Bip38Error> {
    let payload =
        decode_payload(text).ok_or_else(|| Bip38Error::Unsupported("malformed BIP38 key".into()))?;
    if payload[1] == EC_MULTIPLIED {
        return Err(Bip38Error::Unsupported(
            "EC-multiplied BIP38 keys are not supported".into(),
        ));
    }
    Ok(())
}

/// Decrypt a non-EC-multiplied BIP38 key
///
/// The returned key is tagged with `network`; the address checksum is always
/// computed on mainnet as the standard requires.
pub fn decrypt<C: Signing>(
    secp: &Secp256k1<C>,
    text: &str,
    passphrase: &str,
    network: Network,
) -> Result<PrivateKey, Bip38Error> {
    check_supported(text)?;
    let payload =
        decode_payload(text).ok_or_else(|| Bip38Error::Unsupported("malformed BIP38 key".into()))?;

    let compressed = payload[2] & COMPRESSED_FLAG != 0;
    let address_hash = &payload[3..7];

    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 64)
        .map_err(|e| Bip38Error::Unsupported(e.to_string()))?;
    let mut derived = Zeroizing::new([0u8; 64]);
    scrypt::scrypt(passphrase.as_bytes(), address_hash, &params, &mut derived[..])
        .map_err(|e| Bip38Error::Unsupported(e.to_string()))?;

    let cipher = Aes256::new(GenericArray::from_slice(&derived[32..]));
    let mut secret = Zeroizing::new([0u8; 32]);
    for half in 0..2 {
        let start = 7 + 16 * half;
        let mut block = GenericArray::clone_from_slice(&payload[start..start + 16]);
        cipher.decrypt_block(&mut block);
        for (i, byte) in block.iter().enumerate() {
            secret[16 * half + i] = byte ^ derived[16 * half + i];
        }
    }

    let secret_key = SecretKey::from_slice(&secret[..]).map_err(|_| Bip38Error::WrongPassphrase)?;
    let key = if compressed {
        PrivateKey::new(secret_key, network)
    } else {
        PrivateKey::new_uncompressed(secret_key, network)
    };

    let address = Address::p2pkh(&key.public_key(secp), Network::Bitcoin).to_string();
    let checksum = sha256d::Hash::hash(address.as_bytes());
    if &checksum.as_byte_array()[..4] != address_hash {
        return Err(Bip38Error::WrongPassphrase);
    }

    Ok(key)
}
