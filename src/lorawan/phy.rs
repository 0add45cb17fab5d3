//! PHYPayload: the outer framing `MHDR | MACPayload | MIC`
//!
//! A frame is produced either by parsing received bytes (read path) or by
//! building from a message type plus field arguments (create path). The
//! create path encrypts the FRMPayload and computes the MIC once at build
//! time; the frame is immutable afterwards and `to_raw` is deterministic.

use heapless::Vec;

use crate::config::device::{AESKey, DevAddr, EUI64};
use crate::crypto;
use crate::lorawan::fhdr::FHDR;
use crate::lorawan::mac::{FRMPayload, MacPayload};
use crate::lorawan::mhdr::{MType, MHDR};
use crate::lorawan::payload::{DataPayload, JoinAccept, JoinRequestPayload};
use crate::Error;

/// Shortest valid PHY payload: MHDR, a 7-byte FHDR and the MIC
pub const MIN_PHY_PAYLOAD: usize = 12;

/// Largest serialized frame this stack produces
pub const MAX_PHY_PAYLOAD: usize = 255;

/// A complete LoRaWAN frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhyPayload {
    mhdr: MHDR,
    mac_payload: MacPayload,
    mic: [u8; crypto::MIC_SIZE],
}

impl PhyPayload {
    /// Parse a received byte vector
    ///
    /// Splits MHDR, MACPayload and MIC, then delegates to the MACPayload
    /// parser for the message type announced by the header. The MIC is
    /// kept as received; validate it with [`PhyPayload::valid_mic`].
    pub fn read(packet: &[u8]) -> crate::Result<Self> {
        if packet.len() < MIN_PHY_PAYLOAD {
            return Err(Error::MalformedPacket("phy payload too short"));
        }
        let mhdr = MHDR::from_byte(packet[0])?;
        let mac_end = packet.len() - crypto::MIC_SIZE;
        let mac_payload = MacPayload::read(mhdr.mtype(), &packet[1..mac_end])?;
        let mut mic = [0u8; crypto::MIC_SIZE];
        mic.copy_from_slice(&packet[mac_end..]);
        Ok(Self {
            mhdr,
            mac_payload,
            mic,
        })
    }

    /// Build a join request frame, MIC included
    pub fn new_join_request(
        app_eui: EUI64,
        dev_eui: EUI64,
        dev_nonce: u16,
        app_key: &AESKey,
    ) -> Self {
        let mhdr = MHDR::new(MType::JoinRequest);
        let payload = JoinRequestPayload::new(app_eui, dev_eui, dev_nonce);
        let mic = payload.compute_mic(app_key, &mhdr);
        Self {
            mhdr,
            mac_payload: MacPayload::new_join_request(payload),
            mic,
        }
    }

    /// Build a data frame: encrypt the payload and compute the MIC
    ///
    /// The FRMPayload is encrypted under the NwkSKey when `fport` is 0
    /// (MAC commands) and the AppSKey otherwise; the MIC always uses the
    /// NwkSKey. Only the low 16 bits of `fcnt` travel in the FHDR and the
    /// crypto blocks use the same truncated value.
    pub fn new_data(
        mtype: MType,
        dev_addr: DevAddr,
        fcnt: u32,
        fport: u8,
        data: &[u8],
        nwk_skey: &AESKey,
        app_skey: &AESKey,
    ) -> crate::Result<Self> {
        if !mtype.is_data() {
            return Err(Error::InvalidParam("not a data message type"));
        }
        let mhdr = MHDR::new(mtype);
        let dir = mhdr.direction();
        let fcnt = fcnt & 0xFFFF;

        let key = if fport == 0 { nwk_skey } else { app_skey };
        let payload = DataPayload::encrypt(data, key, dev_addr, fcnt, dir)?;
        let fhdr = FHDR::new(dev_addr, fcnt as u16);
        let mac_payload = MacPayload::new_data(fhdr, fport, payload);

        let mut msg = Vec::<u8, MAX_PHY_PAYLOAD>::new();
        msg.push(mhdr.to_byte()).unwrap();
        msg.extend_from_slice(&mac_payload.to_raw()).unwrap();
        let mic = crypto::data_mic(nwk_skey, &msg, dev_addr, fcnt, dir);

        Ok(Self {
            mhdr,
            mac_payload,
            mic,
        })
    }

    /// Serialize: `mhdr | mac_payload | mic`
    pub fn to_raw(&self) -> Vec<u8, MAX_PHY_PAYLOAD> {
        let mut raw = Vec::new();
        raw.push(self.mhdr.to_byte()).unwrap();
        raw.extend_from_slice(&self.mac_payload.to_raw()).unwrap();
        raw.extend_from_slice(&self.mic).unwrap();
        raw
    }

    /// MAC header
    pub fn mhdr(&self) -> &MHDR {
        &self.mhdr
    }

    /// MACPayload
    pub fn mac_payload(&self) -> &MacPayload {
        &self.mac_payload
    }

    /// The frame's MIC (received or computed at build time)
    pub fn mic(&self) -> &[u8; crypto::MIC_SIZE] {
        &self.mic
    }

    /// Recompute and compare the MIC
    ///
    /// `key` is the NwkSKey for data frames and the AppKey for join
    /// frames. A mismatch is reported as `false`, never as an error; the
    /// caller decides what to do with a frame that fails the check.
    pub fn valid_mic(&self, key: &AESKey) -> bool {
        match self.mac_payload.frm_payload() {
            FRMPayload::JoinRequest(p) => p.compute_mic(key, &self.mhdr) == self.mic,
            FRMPayload::JoinAccept(p) => match p.decrypt(key, &self.mic) {
                Ok(accept) => accept.valid_mic(key, &self.mhdr),
                Err(_) => false,
            },
            FRMPayload::Data(_) => {
                let fhdr = match self.mac_payload.fhdr() {
                    Some(fhdr) => fhdr,
                    None => return false,
                };
                let mut msg = Vec::<u8, MAX_PHY_PAYLOAD>::new();
                msg.push(self.mhdr.to_byte()).unwrap();
                msg.extend_from_slice(&self.mac_payload.to_raw()).unwrap();
                let mic = crypto::data_mic(
                    key,
                    &msg,
                    fhdr.dev_addr(),
                    u32::from(fhdr.fcnt()),
                    self.mhdr.direction(),
                );
                mic == self.mic
            }
        }
    }

    /// Decrypt the FRMPayload of a data frame (or return the cleartext
    /// fields of a join request)
    ///
    /// The key is selected by FPort: 0 is MAC commands under the NwkSKey,
    /// anything else application data under the AppSKey. Join accepts
    /// need the AppKey instead; use [`PhyPayload::join_accept`].
    pub fn decrypt_payload(
        &self,
        nwk_skey: &AESKey,
        app_skey: &AESKey,
    ) -> crate::Result<Vec<u8, { crypto::MAX_FRM_PAYLOAD }>> {
        match self.mac_payload.frm_payload() {
            FRMPayload::JoinRequest(p) => {
                let mut clear = Vec::new();
                clear.extend_from_slice(&p.to_raw()).unwrap();
                Ok(clear)
            }
            FRMPayload::JoinAccept(_) => {
                Err(Error::InvalidParam("join accept requires the application key"))
            }
            FRMPayload::Data(p) => {
                let fhdr = self
                    .mac_payload
                    .fhdr()
                    .ok_or(Error::MalformedPacket("data frame without frame header"))?;
                let key = match self.mac_payload.fport() {
                    Some(0) => nwk_skey,
                    _ => app_skey,
                };
                Ok(p.decrypt(
                    key,
                    fhdr.dev_addr(),
                    u32::from(fhdr.fcnt()),
                    self.mhdr.direction(),
                ))
            }
        }
    }

    /// Decrypt and decode a join accept frame
    pub fn join_accept(&self, app_key: &AESKey) -> crate::Result<JoinAccept> {
        match self.mac_payload.frm_payload() {
            FRMPayload::JoinAccept(p) => p.decrypt(app_key, &self.mic),
            _ => Err(Error::InvalidParam("not a join accept frame")),
        }
    }

    /// Device address of a data frame (join accepts carry theirs
    /// encrypted; decode with [`PhyPayload::join_accept`])
    pub fn dev_addr(&self) -> Option<DevAddr> {
        self.mac_payload.fhdr().map(|fhdr| fhdr.dev_addr())
    }
}
