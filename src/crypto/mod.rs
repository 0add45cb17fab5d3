//! LoRaWAN cryptographic operations
//!
//! This module provides the cryptographic functions the codec is bound to:
//! - AES-128 ECB block encryption/decryption
//! - AES-CMAC (RFC 4493) and the 4-byte message integrity codes cut from it
//! - FRMPayload keystream encryption (uplink and downlink)
//! - Session key derivation from a join accept
//!
//! No padding configuration is exposed; callers construct exact byte
//! sequences and the keystream generator truncates to payload length.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use heapless::Vec;

use crate::config::device::{AESKey, DevAddr};
use crate::lorawan::mhdr::Direction;

/// MIC size in bytes
pub const MIC_SIZE: usize = 4;

/// Block size for AES-128
pub const BLOCK_SIZE: usize = 16;

/// Largest FRMPayload carried by an EU868 frame
pub const MAX_FRM_PAYLOAD: usize = 222;

fn cipher(key: &AESKey) -> Aes128 {
    // 16-byte keys cannot fail length validation
    Aes128::new_from_slice(key.as_bytes()).unwrap()
}

/// AES-128 ECB encrypt `data`, which must be a whole number of 16-byte
/// blocks (at most 32 bytes: a join accept with CFList plus its MIC)
pub fn aes128_encrypt(key: &AESKey, data: &[u8]) -> Vec<u8, 32> {
    let cipher = cipher(key);
    let mut out = Vec::new();
    for chunk in data.chunks(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block[..chunk.len()].copy_from_slice(chunk);
        cipher.encrypt_block((&mut block).into());
        out.extend_from_slice(&block[..chunk.len()]).unwrap();
    }
    out
}

/// AES-128 ECB decrypt, the inverse of [`aes128_encrypt`]
pub fn aes128_decrypt(key: &AESKey, data: &[u8]) -> Vec<u8, 32> {
    let cipher = cipher(key);
    let mut out = Vec::new();
    for chunk in data.chunks(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block[..chunk.len()].copy_from_slice(chunk);
        cipher.decrypt_block((&mut block).into());
        out.extend_from_slice(&block[..chunk.len()]).unwrap();
    }
    out
}

/// AES-CMAC over `message` per RFC 4493
pub fn aes_cmac(key: &AESKey, message: &[u8]) -> [u8; BLOCK_SIZE] {
    let mut mac: Cmac<Aes128> = KeyInit::new_from_slice(key.as_bytes()).unwrap();
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// First 4 octets of the CMAC, used as the MIC of join frames
pub fn join_mic(key: &AESKey, message: &[u8]) -> [u8; MIC_SIZE] {
    let full = aes_cmac(key, message);
    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(&full[..MIC_SIZE]);
    mic
}

/// MIC of a data frame
///
/// Computes `CMAC(key, B0 | msg)[0..4]` where `msg` is MHDR | MACPayload
/// with the already-encrypted FRMPayload, and B0 is the 0x49-tagged block
/// carrying direction, device address and frame counter.
pub fn data_mic(
    key: &AESKey,
    msg: &[u8],
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
) -> [u8; MIC_SIZE] {
    let mut mac: Cmac<Aes128> = KeyInit::new_from_slice(key.as_bytes()).unwrap();
    let mut b0 = [0u8; BLOCK_SIZE];
    b0[0] = 0x49;
    b0[5] = dir as u8;
    b0[6..10].copy_from_slice(&dev_addr.to_wire());
    b0[10..14].copy_from_slice(&fcnt.to_le_bytes());
    b0[15] = msg.len() as u8;
    mac.update(&b0);
    mac.update(msg);
    let full = mac.finalize().into_bytes();
    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(&full[..MIC_SIZE]);
    mic
}

/// Encrypt or decrypt a FRMPayload (the operation is its own inverse)
///
/// Keystream block `i` (1-indexed) is the encryption of the 0x01-tagged
/// block `A_i`; payload byte `j` XORs with byte `j mod 16` of block
/// `⌊j/16⌋ + 1`. The final block is truncated to the payload length.
pub fn encrypt_frm_payload(
    key: &AESKey,
    dev_addr: DevAddr,
    fcnt: u32,
    dir: Direction,
    payload: &[u8],
) -> Vec<u8, MAX_FRM_PAYLOAD> {
    let cipher = cipher(key);
    let mut out = Vec::new();
    for (i, chunk) in payload.chunks(BLOCK_SIZE).enumerate() {
        let mut a = [0u8; BLOCK_SIZE];
        a[0] = 0x01;
        a[5] = dir as u8;
        a[6..10].copy_from_slice(&dev_addr.to_wire());
        a[10..14].copy_from_slice(&fcnt.to_le_bytes());
        a[15] = (i + 1) as u8;
        cipher.encrypt_block((&mut a).into());
        for (j, &byte) in chunk.iter().enumerate() {
            out.push(byte ^ a[j]).unwrap();
        }
    }
    out
}

/// Derive the network and application session keys from a join accept
///
/// `NwkSKey = AES128(AppKey, 0x01 | AppNonce | NetID | DevNonce | pad16)`
/// and `AppSKey` the same with a 0x02 prefix; the pad is zero octets.
pub fn derive_session_keys(
    app_key: &AESKey,
    app_nonce: &[u8; 3],
    net_id: &[u8; 3],
    dev_nonce: u16,
) -> (AESKey, AESKey) {
    let cipher = cipher(app_key);

    let mut nwk_skey = [0u8; BLOCK_SIZE];
    nwk_skey[0] = 0x01;
    nwk_skey[1..4].copy_from_slice(app_nonce);
    nwk_skey[4..7].copy_from_slice(net_id);
    nwk_skey[7..9].copy_from_slice(&dev_nonce.to_le_bytes());
    cipher.encrypt_block((&mut nwk_skey).into());

    let mut app_skey = [0u8; BLOCK_SIZE];
    app_skey[0] = 0x02;
    app_skey[1..4].copy_from_slice(app_nonce);
    app_skey[4..7].copy_from_slice(net_id);
    app_skey[7..9].copy_from_slice(&dev_nonce.to_le_bytes());
    cipher.encrypt_block((&mut app_skey).into());

    (AESKey::new(nwk_skey), AESKey::new(app_skey))
}
