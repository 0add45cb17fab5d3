//! Downlink dispatch walkthrough against a simulated radio
//!
//! An ABP device sends an uplink, then a pretend network server delivers
//! a downlink in the receive window and the registered callback prints
//! it. Run with:
//!
//! ```text
//! cargo run --example downlink
//! ```

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use dragino::config::device::{AESKey, DevAddr};
use dragino::device::Dragino;
use dragino::lorawan::mhdr::MType;
use dragino::lorawan::phy::PhyPayload;
use dragino::radio::traits::{IrqFlags, Radio, RadioMode, MAX_PAYLOAD};
use heapless::Vec as HVec;
use tracing::info;
use tracing_subscriber::EnvFilter;

const NWK_SKEY: [u8; 16] = [
    0xC3, 0xF6, 0xA2, 0x25, 0x5B, 0x9A, 0x86, 0xF3, 0xFD, 0x8B, 0x5A, 0x07, 0xD5, 0x5E, 0x4C, 0x26,
];
const APP_SKEY: [u8; 16] = [
    0x15, 0xF6, 0xFE, 0x2A, 0x2C, 0x0F, 0x5D, 0x74, 0xBE, 0x6C, 0x3B, 0x1A, 0x58, 0xD9, 0x40, 0x45,
];
const DEV_ADDR: [u8; 4] = [0x26, 0x01, 0x11, 0x5F];

/// A stand-in for the SX127x: records transmissions, plays back queued
/// downlinks. Clones share state so the harness keeps a handle.
#[derive(Clone, Default)]
struct SimRadio {
    state: Rc<RefCell<SimState>>,
}

#[derive(Default)]
struct SimState {
    tx: Vec<Vec<u8>>,
    rx: Vec<Vec<u8>>,
}

impl SimRadio {
    fn last_tx(&self) -> Option<Vec<u8>> {
        self.state.borrow().tx.last().cloned()
    }

    fn queue_rx(&self, frame: &[u8]) {
        self.state.borrow_mut().rx.push(frame.to_vec());
    }
}

impl Radio for SimRadio {
    type Error = core::convert::Infallible;

    fn set_mode(&mut self, _mode: RadioMode) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_frequency(&mut self, _freq_mhz: f64) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_spreading_factor(&mut self, _sf: u8) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_sync_word(&mut self, _sync_word: u8) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_pa_config(&mut self, _max_power: u8, _output_power: u8) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_rx_crc(&mut self, _enabled: bool) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_invert_iq(&mut self, _invert: bool) -> Result<(), Self::Error> {
        Ok(())
    }
    fn set_dio_mapping(&mut self, _mapping: [u8; 6]) -> Result<(), Self::Error> {
        Ok(())
    }
    fn write_payload(&mut self, payload: &[u8]) -> Result<(), Self::Error> {
        self.state.borrow_mut().tx.push(payload.to_vec());
        Ok(())
    }
    fn read_payload(
        &mut self,
        _nocheck: bool,
    ) -> Result<Option<HVec<u8, MAX_PAYLOAD>>, Self::Error> {
        Ok(self
            .state
            .borrow_mut()
            .rx
            .pop()
            .map(|data| HVec::from_slice(&data).unwrap()))
    }
    fn clear_irq_flags(&mut self, _flags: IrqFlags) -> Result<(), Self::Error> {
        Ok(())
    }
    fn reset_ptr_rx(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

fn write_sample_config(dir: &PathBuf) -> PathBuf {
    let path = dir.join("dragino.toml");
    let content = format!(
        r#"gps_baud_rate = 9600
gps_serial_port = "/dev/serial0"
gps_serial_timeout = 3
gps_wait_period = 30
spreading_factor = 7
max_power = "0F"
output_power = "0E"
sync_word = "34"
rx_crc = true
fcount_filename = "{}"
auth_mode = "ABP"
devaddr = "{}"
nwskey = "{}"
appskey = "{}"
"#,
        dir.join("fcount").display(),
        hex::encode(DEV_ADDR),
        hex::encode(NWK_SKEY),
        hex::encode(APP_SKEY)
    );
    std::fs::write(&path, content).expect("unable to write sample config");
    path
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let dir = std::env::temp_dir().join(format!("dragino-downlink-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("unable to create demo directory");
    let config_path = write_sample_config(&dir);

    let radio = SimRadio::default();
    let mut device = Dragino::new(radio.clone(), &config_path).expect("device setup failed");

    device.set_downlink_callback(|payload, mtype| {
        info!("downlink ({}) payload: {}", mtype, hex::encode(payload));
    });

    device.send("ping").expect("send failed");
    info!("uplink frame: {}", hex::encode(radio.last_tx().unwrap()));
    device.on_tx_done().expect("tx-done handling failed");

    // what the network server would transmit into the receive window
    let downlink = PhyPayload::new_data(
        MType::UnconfDataDown,
        DevAddr::new(DEV_ADDR),
        0,
        2,
        &[0xCA, 0xFE],
        &AESKey::new(NWK_SKEY),
        &AESKey::new(APP_SKEY),
    )
    .expect("downlink construction failed");
    radio.queue_rx(&downlink.to_raw());
    device.on_rx_done().expect("rx-done handling failed");
}
