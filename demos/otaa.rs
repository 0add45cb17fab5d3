//! OTAA join walkthrough against a simulated radio
//!
//! Writes a sample configuration, performs the join handshake with a
//! pretend network server, then sends an uplink. Run with:
//!
//! ```text
//! cargo run --example otaa
//! ```

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use dragino::config::device::AESKey;
use dragino::crypto;
use dragino::device::Dragino;
use dragino::lorawan::phy::PhyPayload;
use dragino::radio::traits::{IrqFlags, Radio, RadioMode, MAX_PAYLOAD};
use heapless::Vec as HVec;
use tracing::info;
use tracing_subscriber::EnvFilter;

const APP_KEY: [u8; 16] = [
    0x13, 0x1C, 0x8A, 0xF7, 0xA3, 0xE4, 0x35, 0xD0, 0xD5, 0xE9, 0x47, 0x6B, 0x04, 0xB9, 0x16, 0x39,
];

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
auth_mode = "OTAA"
deveui = "0082AA0D429C7934"
appeui = "70B3D57EF0004DBC"
appkey = "{}"
"#,
        dir.join("fcount").display(),
        hex::encode(APP_KEY)
    );
    std::fs::write(&path, content).expect("unable to write sample config");
    path
}

/// What the network server would answer with
fn network_join_accept(app_key: &AESKey) -> Vec<u8> {
    let mut clear = Vec::new();
    clear.extend_from_slice(&[0x11, 0x22, 0x33]); // AppNonce
    clear.extend_from_slice(&[0x00, 0x00, 0x13]); // NetID
    clear.extend_from_slice(&[0x5D, 0x15, 0x01, 0x26]); // DevAddr, wire order
    clear.push(0x00); // DLSettings
    clear.push(0x01); // RxDelay

    let mut msg = vec![0x20];
    msg.extend_from_slice(&clear);
    let mic = crypto::join_mic(app_key, &msg);

    let mut block = clear;
    block.extend_from_slice(&mic);
    let wire = crypto::aes128_decrypt(app_key, &block);

    let mut frame = vec![0x20];
    frame.extend_from_slice(&wire);
    frame
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let dir = std::env::temp_dir().join(format!("dragino-otaa-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("unable to create demo directory");
    let config_path = write_sample_config(&dir);

    let radio = SimRadio::default();
    let mut device = Dragino::new(radio.clone(), &config_path).expect("device setup failed");

    device.join().expect("join request failed");
    let request = radio.last_tx().expect("no join request transmitted");
    info!("join request on air: {}", hex::encode(&request));

    // TX-done opens the receive windows; the server answers there
    device.on_tx_done().expect("tx-done handling failed");
    radio.queue_rx(&network_join_accept(&AESKey::new(APP_KEY)));
    device.on_rx_done().expect("rx-done handling failed");

    let session = device.session().expect("join did not activate a session");
    info!("joined, device address {}", session.dev_addr);

    device.send("hello over the air").expect("send failed");
    let uplink = radio.last_tx().expect("no uplink transmitted");
    info!("uplink frame: {}", hex::encode(&uplink));
    let frame = PhyPayload::read(&uplink).expect("uplink should parse");
    info!("uplink counter {}", frame.mac_payload().fhdr().unwrap().fcnt());
    device.on_tx_done().expect("tx-done handling failed");
}
