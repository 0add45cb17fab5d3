//! MACPayload composition
//!
//! Dispatches on the message type: join frames place their payload
//! directly after the MHDR, data frames carry `FHDR | FPort |
//! FRMPayload`. FPort is present whenever a FRMPayload is.

use heapless::Vec;

use crate::lorawan::fhdr::FHDR;
use crate::lorawan::mhdr::MType;
use crate::lorawan::payload::{DataPayload, JoinAcceptPayload, JoinRequestPayload};
use crate::Error;

/// Maximum serialized MACPayload: a full FHDR, FPort and FRMPayload
pub const MAX_MAC_PAYLOAD: usize = 250;

/// Frame payload variant, selected by the message type at parse time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FRMPayload {
    /// Join request fields
    JoinRequest(JoinRequestPayload),
    /// Join accept, still encrypted
    JoinAccept(JoinAcceptPayload),
    /// Application or MAC-command data
    Data(DataPayload),
}

/// The variable portion of a frame between MHDR and MIC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacPayload {
    fhdr: Option<FHDR>,
    fport: Option<u8>,
    frm_payload: FRMPayload,
}

impl MacPayload {
    /// MACPayload of a data frame
    pub fn new_data(fhdr: FHDR, fport: u8, payload: DataPayload) -> Self {
        Self {
            fhdr: Some(fhdr),
            fport: Some(fport),
            frm_payload: FRMPayload::Data(payload),
        }
    }

    /// MACPayload of a join request
    pub fn new_join_request(payload: JoinRequestPayload) -> Self {
        Self {
            fhdr: None,
            fport: None,
            frm_payload: FRMPayload::JoinRequest(payload),
        }
    }

    /// Parse the bytes between MHDR and MIC for the given message type
    pub fn read(mtype: MType, bytes: &[u8]) -> crate::Result<Self> {
        if bytes.is_empty() {
            return Err(Error::MalformedPacket("empty mac payload"));
        }
        match mtype {
            MType::JoinRequest => Ok(Self {
                fhdr: None,
                fport: None,
                frm_payload: FRMPayload::JoinRequest(JoinRequestPayload::read(bytes)?),
            }),
            MType::JoinAccept => Ok(Self {
                fhdr: None,
                fport: None,
                frm_payload: FRMPayload::JoinAccept(JoinAcceptPayload::read(bytes)?),
            }),
            MType::UnconfDataUp
            | MType::UnconfDataDown
            | MType::ConfDataUp
            | MType::ConfDataDown => {
                let fhdr = FHDR::read(bytes)?;
                let rest = &bytes[fhdr.length()..];
                let (fport, payload) = match rest.split_first() {
                    Some((&fport, payload)) => (Some(fport), payload),
                    None => (None, &[][..]),
                };
                Ok(Self {
                    fhdr: Some(fhdr),
                    fport,
                    frm_payload: FRMPayload::Data(DataPayload::read(payload)?),
                })
            }
            MType::Rfu | MType::Proprietary => {
                Err(Error::MalformedPacket("unsupported message type"))
            }
        }
    }

    /// Serialize to the on-wire layout
    pub fn to_raw(&self) -> Vec<u8, MAX_MAC_PAYLOAD> {
        let mut raw = Vec::new();
        if let Some(fhdr) = &self.fhdr {
            raw.extend_from_slice(&fhdr.to_raw()).unwrap();
        }
        if let Some(fport) = self.fport {
            raw.push(fport).unwrap();
        }
        match &self.frm_payload {
            FRMPayload::JoinRequest(p) => raw.extend_from_slice(&p.to_raw()).unwrap(),
            FRMPayload::JoinAccept(p) => raw.extend_from_slice(p.to_raw()).unwrap(),
            FRMPayload::Data(p) => raw.extend_from_slice(p.to_raw()).unwrap(),
        }
        raw
    }

    /// Frame header (data frames only)
    pub fn fhdr(&self) -> Option<&FHDR> {
        self.fhdr.as_ref()
    }

    /// Frame port: 0 carries MAC commands, 1-223 application data
    pub fn fport(&self) -> Option<u8> {
        self.fport
    }

    /// The payload variant
    pub fn frm_payload(&self) -> &FRMPayload {
        &self.frm_payload
    }
}
