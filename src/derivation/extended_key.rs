//! SLIP-132 handling for account-level extended public keys
//!
//! Wallets export account keys with version bytes that encode the script
//! type (`xpub`, `ypub`, `zpub` and their testnet siblings). The `bitcoin`
//! crate only understands `xpub`/`tpub`, so keys are normalised before
//! decoding and re-labelled when displayed.

use bitcoin::bip32::Xpub;
use bitcoin::Network;

use crate::catalogue::ScriptKind;

const XPUB: [u8; 4] = [0x04, 0x88, 0xb2, 0x1e];
const YPUB: [u8; 4] = [0x04, 0x9d, 0x7c, 0xb2];
const ZPUB: [u8; 4] = [0x04, 0xb2, 0x47, 0x46];
const TPUB: [u8; 4] = [0x04, 0x35, 0x87, 0xcf];
const UPUB: [u8; 4] = [0x04, 0x4a, 0x52, 0x62];
const VPUB: [u8; 4] = [0x04, 0x5f, 0x1c, 0xf6];

const ENCODED_LEN: usize = 78;

/// A decoded extended public key together with the script its version bytes announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    pub xpub: Xpub,
    pub script: ScriptKind,
    pub mainnet: bool,
}

impl ExtendedPublicKey {
    /// Whether the key belongs to `network`
    pub fn matches_network(&self, network: Network) -> bool {
        self.mainnet == (network == Network::Bitcoin)
    }
}

fn version_info(version: &[u8]) -> Option<(ScriptKind, bool)> {
    let version: [u8; 4] = version.try_into().ok()?;
    match version {
        XPUB => Some((ScriptKind::P2pkh, true)),
        YPUB => Some((ScriptKind::P2shP2wpkh, true)),
        ZPUB => Some((ScriptKind::P2wpkh, true)),
        TPUB => Some((ScriptKind::P2pkh, false)),
        UPUB => Some((ScriptKind::P2shP2wpkh, false)),
        VPUB => Some((ScriptKind::P2wpkh, false)),
        _ => None,
    }
}

fn version_for(script: ScriptKind, mainnet: bool) -> [u8; 4] {
    match (script, mainnet) {
        (ScriptKind::P2shP2wpkh, true) => YPUB,
        (ScriptKind::P2wpkh, true) => ZPUB,
        (ScriptKind::P2pkh | ScriptKind::P2tr, true) => XPUB,
        (ScriptKind::P2shP2wpkh, false) => UPUB,
        (ScriptKind::P2wpkh, false) => VPUB,
        (ScriptKind::P2pkh | ScriptKind::P2tr, false) => TPUB,
    }
}

/// Decode an xpub/ypub/zpub/tpub/upub/vpub string
pub fn parse_extended_public_key(text: &str) -> Result<ExtendedPublicKey, String> {
    let mut data = bs58::decode(text)
        .with_check(None)
        .into_vec()
        .map_err(|e| format!("invalid base58check: {}", e))?;

    if data.len() != ENCODED_LEN {
        return Err(format!("expected {} bytes, got {}", ENCODED_LEN, data.len()));
    }

    let (script, mainnet) =
        version_info(&data[..4]).ok_or_else(|| "unknown extended key version".to_string())?;

    let canonical = if mainnet { XPUB } else { TPUB };
    data[..4].copy_from_slice(&canonical);

    let xpub = Xpub::decode(&data).map_err(|e| e.to_string())?;
    Ok(ExtendedPublicKey {
        xpub,
        script,
        mainnet,
    })
}

/// Encode `xpub` with the SLIP-132 prefix matching `script`
pub fn to_slip132_string(xpub: &Xpub, script: ScriptKind, network: Network) -> String {
    let mut data = xpub.encode();
    data[..4].copy_from_slice(&version_for(script, network == Network::Bitcoin));
    bs58::encode(data).with_check().into_string()
}
