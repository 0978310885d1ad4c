//! Address encoding for derived public keys

use bitcoin::secp256k1::{Secp256k1, Verification};
use bitcoin::{Address, AddressType, Network, PublicKey};

use crate::catalogue::ScriptKind;

/// Encode `public_key` for `script` on `network`
pub fn encode_address<C: Verification>(
    secp: &Secp256k1<C>,
    public_key: &PublicKey,
    script: ScriptKind,
    network: Network,
) -> Result<Address, String> {
    if script.requires_compressed_key() && !public_key.compressed {
        return Err(format!("{:?} requires a compressed public key", script));
    }

    match script {
        ScriptKind::P2pkh => Ok(Address::p2pkh(public_key, network)),
        ScriptKind::P2wpkh => Address::p2wpkh(public_key, network).map_err(|e| e.to_string()),
        ScriptKind::P2shP2wpkh => Address::p2shwpkh(public_key, network).map_err(|e| e.to_string()),
        ScriptKind::P2tr => {
            let (internal_key, _parity) = public_key.inner.x_only_public_key();
            Ok(Address::p2tr(secp, internal_key, None, network))
        }
    }
}

/// Best-effort script kind of an existing address
pub fn script_of(address: &Address) -> Option<ScriptKind> {
    match address.address_type()? {
        AddressType::P2pkh => Some(ScriptKind::P2pkh),
        AddressType::P2sh => Some(ScriptKind::P2shP2wpkh),
        AddressType::P2wpkh => Some(ScriptKind::P2wpkh),
        AddressType::P2tr => Some(ScriptKind::P2tr),
        _ => None,
    }
}
