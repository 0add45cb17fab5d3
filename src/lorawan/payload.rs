//! Frame payload variants
//!
//! The FRMPayload of a frame is one of three shapes selected by the
//! message type: a join request, a join accept (held encrypted exactly as
//! received), or application/MAC-command data. Each variant knows its own
//! MIC and encryption rules.

use heapless::Vec;

use crate::config::device::{AESKey, DevAddr, EUI64};
use crate::crypto;
use crate::lorawan::mhdr::{Direction, MHDR};
use crate::Error;

/// Wire size of a join request payload: AppEUI(8) | DevEUI(8) | DevNonce(2)
pub const JOIN_REQUEST_LEN: usize = 18;

/// Join accept payload without CFList
pub const JOIN_ACCEPT_LEN: usize = 12;

/// Join accept payload with the optional 16-byte CFList
pub const JOIN_ACCEPT_CFLIST_LEN: usize = 28;

fn reversed(eui: &EUI64) -> [u8; 8] {
    let mut out = *eui;
    out.reverse();
    out
}

/// Join request: the device's identity plus a fresh nonce
///
/// EUIs are held in logical big-endian; the wire layout is little-endian
/// and the reversal happens in `read`/`to_raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequestPayload {
    app_eui: EUI64,
    dev_eui: EUI64,
    dev_nonce: u16,
}

impl JoinRequestPayload {
    /// Assemble a join request from logical big-endian EUIs
    pub fn new(app_eui: EUI64, dev_eui: EUI64, dev_nonce: u16) -> Self {
        Self {
            app_eui,
            dev_eui,
            dev_nonce,
        }
    }

    /// Parse the 18-byte wire payload
    pub fn read(payload: &[u8]) -> crate::Result<Self> {
        if payload.len() != JOIN_REQUEST_LEN {
            return Err(Error::MalformedPacket("invalid join request length"));
        }
        let mut app_eui = [0u8; 8];
        let mut dev_eui = [0u8; 8];
        app_eui.copy_from_slice(&payload[0..8]);
        dev_eui.copy_from_slice(&payload[8..16]);
        app_eui.reverse();
        dev_eui.reverse();
        Ok(Self {
            app_eui,
            dev_eui,
            dev_nonce: u16::from_le_bytes([payload[16], payload[17]]),
        })
    }

    /// Serialize to the on-wire little-endian layout
    pub fn to_raw(&self) -> Vec<u8, JOIN_REQUEST_LEN> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&reversed(&self.app_eui)).unwrap();
        raw.extend_from_slice(&reversed(&self.dev_eui)).unwrap();
        raw.extend_from_slice(&self.dev_nonce.to_le_bytes()).unwrap();
        raw
    }

    /// MIC over MHDR | AppEUI | DevEUI | DevNonce under the AppKey
    pub fn compute_mic(&self, app_key: &AESKey, mhdr: &MHDR) -> [u8; crypto::MIC_SIZE] {
        let mut msg = Vec::<u8, 19>::new();
        msg.push(mhdr.to_byte()).unwrap();
        msg.extend_from_slice(&self.to_raw()).unwrap();
        crypto::join_mic(app_key, &msg)
    }

    /// Application EUI (logical big-endian)
    pub fn app_eui(&self) -> &EUI64 {
        &self.app_eui
    }

    /// Device EUI (logical big-endian)
    pub fn dev_eui(&self) -> &EUI64 {
        &self.dev_eui
    }

    /// Device nonce
    pub fn dev_nonce(&self) -> u16 {
        self.dev_nonce
    }
}

/// Join accept as received: still encrypted under the AppKey
///
/// The network encrypted plaintext | MIC with an AES *decrypt* operation,
/// so the device recovers both by ECB-*encrypting* the received bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAcceptPayload {
    encrypted: Vec<u8, JOIN_ACCEPT_CFLIST_LEN>,
}

impl JoinAcceptPayload {
    /// Take custody of the encrypted payload (12 or 28 bytes, the PHY
    /// MIC field holds the remaining 4 bytes of ciphertext)
    pub fn read(payload: &[u8]) -> crate::Result<Self> {
        if payload.len() != JOIN_ACCEPT_LEN && payload.len() != JOIN_ACCEPT_CFLIST_LEN {
            return Err(Error::MalformedPacket("invalid join accept length"));
        }
        Ok(Self {
            encrypted: Vec::from_slice(payload).unwrap(),
        })
    }

    /// The encrypted bytes, exactly as received
    pub fn to_raw(&self) -> &[u8] {
        &self.encrypted
    }

    /// Recover the plaintext fields
    ///
    /// `mic` is the 4-byte tail of the PHY payload; it is part of the
    /// ciphertext and must be re-appended before the block operation.
    pub fn decrypt(&self, app_key: &AESKey, mic: &[u8; crypto::MIC_SIZE]) -> crate::Result<JoinAccept> {
        let mut ciphertext = Vec::<u8, 32>::new();
        ciphertext.extend_from_slice(&self.encrypted).unwrap();
        ciphertext.extend_from_slice(mic).unwrap();

        let recovered = crypto::aes128_encrypt(app_key, &ciphertext);
        let (clear, clear_mic) = recovered.split_at(recovered.len() - crypto::MIC_SIZE);

        let mut cf_list = None;
        if clear.len() > JOIN_ACCEPT_LEN {
            let mut list = [0u8; 16];
            list.copy_from_slice(&clear[12..28]);
            cf_list = Some(list);
        }
        let mut mic = [0u8; crypto::MIC_SIZE];
        mic.copy_from_slice(clear_mic);

        Ok(JoinAccept {
            app_nonce: [clear[0], clear[1], clear[2]],
            net_id: [clear[3], clear[4], clear[5]],
            dev_addr: DevAddr::from_wire([clear[6], clear[7], clear[8], clear[9]]),
            dl_settings: clear[10],
            rx_delay: clear[11],
            cf_list,
            mic,
            clear: Vec::from_slice(clear).unwrap(),
        })
    }
}

/// Decrypted join accept fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAccept {
    app_nonce: [u8; 3],
    net_id: [u8; 3],
    dev_addr: DevAddr,
    dl_settings: u8,
    rx_delay: u8,
    cf_list: Option<[u8; 16]>,
    mic: [u8; crypto::MIC_SIZE],
    clear: Vec<u8, JOIN_ACCEPT_CFLIST_LEN>,
}

impl JoinAccept {
    /// Check the recovered MIC against CMAC(AppKey, MHDR | plaintext)
    pub fn valid_mic(&self, app_key: &AESKey, mhdr: &MHDR) -> bool {
        let mut msg = Vec::<u8, 29>::new();
        msg.push(mhdr.to_byte()).unwrap();
        msg.extend_from_slice(&self.clear).unwrap();
        crypto::join_mic(app_key, &msg) == self.mic
    }

    /// Derive (NwkSKey, AppSKey) using the nonce from our join request
    pub fn derive_session_keys(&self, app_key: &AESKey, dev_nonce: u16) -> (AESKey, AESKey) {
        crypto::derive_session_keys(app_key, &self.app_nonce, &self.net_id, dev_nonce)
    }

    /// Application nonce (wire order)
    pub fn app_nonce(&self) -> &[u8; 3] {
        &self.app_nonce
    }

    /// Network identifier (wire order)
    pub fn net_id(&self) -> &[u8; 3] {
        &self.net_id
    }

    /// Assigned device address (logical big-endian)
    pub fn dev_addr(&self) -> DevAddr {
        self.dev_addr
    }

    /// DLSettings octet (RX1 data-rate offset and RX2 data rate)
    pub fn dl_settings(&self) -> u8 {
        self.dl_settings
    }

    /// Delay before the first receive window, in seconds
    pub fn rx_delay(&self) -> u8 {
        self.rx_delay
    }

    /// Optional channel frequency list, opaque 16 bytes
    pub fn cf_list(&self) -> Option<&[u8; 16]> {
        self.cf_list.as_ref()
    }

    /// The MIC recovered from the ciphertext tail
    pub fn mic(&self) -> &[u8; crypto::MIC_SIZE] {
        &self.mic
    }
}

/// Data frame payload, held in its encrypted on-wire form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPayload {
    encrypted: Vec<u8, { crypto::MAX_FRM_PAYLOAD }>,
}

impl DataPayload {
    /// Take custody of an already-encrypted FRMPayload
    pub fn read(payload: &[u8]) -> crate::Result<Self> {
        let encrypted = Vec::from_slice(payload)
            .map_err(|_| Error::MalformedPacket("frame payload too long"))?;
        Ok(Self { encrypted })
    }

    /// Encrypt application plaintext for transmission
    pub fn encrypt(
        plaintext: &[u8],
        key: &AESKey,
        dev_addr: DevAddr,
        fcnt: u32,
        dir: Direction,
    ) -> crate::Result<Self> {
        if plaintext.len() > crypto::MAX_FRM_PAYLOAD {
            return Err(Error::InvalidParam("frame payload too long"));
        }
        Ok(Self {
            encrypted: crypto::encrypt_frm_payload(key, dev_addr, fcnt, dir, plaintext),
        })
    }

    /// Recover the plaintext (the keystream XOR is its own inverse)
    pub fn decrypt(
        &self,
        key: &AESKey,
        dev_addr: DevAddr,
        fcnt: u32,
        dir: Direction,
    ) -> Vec<u8, { crypto::MAX_FRM_PAYLOAD }> {
        crypto::encrypt_frm_payload(key, dev_addr, fcnt, dir, &self.encrypted)
    }

    /// The encrypted bytes as they appear on the wire
    pub fn to_raw(&self) -> &[u8] {
        &self.encrypted
    }

    /// Encrypted payload length
    pub fn len(&self) -> usize {
        self.encrypted.len()
    }

    /// True when the frame carries no FRMPayload bytes
    pub fn is_empty(&self) -> bool {
        self.encrypted.is_empty()
    }
}
