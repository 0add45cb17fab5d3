//! High-level device driver for the Dragino LoRa/GPS HAT
//!
//! [`Dragino`] owns the radio collaborator and the session. It performs
//! OTAA or ABP activation, assembles and transmits uplinks with a
//! persistent frame counter, opens the Class A receive windows after each
//! transmission, and dispatches validated downlinks to a registered
//! callback. All of it runs on a single control thread; the platform's
//! GPIO layer feeds TX-done / RX-done edges into [`Dragino::on_tx_done`]
//! and [`Dragino::on_rx_done`].

use core::fmt;
use std::path::Path;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::class::{ClassA, ClassAState};
use crate::config::device::SessionState;
use crate::config::store::{AuthConfig, ConfigError, DraginoConfig};
use crate::lorawan::mhdr::MType;
use crate::lorawan::phy::PhyPayload;
use crate::lorawan::region::FrequencyPlan;
use crate::radio::traits::{IrqFlags, Radio, RadioMode};
use crate::Error;

/// Transmission attempts before `send_bytes` gives up
pub const DEFAULT_RETRIES: u32 = 3;

/// FPort used for application uplinks
const DEFAULT_FPORT: u8 = 1;

/// DIO mapping routing TX-done to DIO0
const DIO_MAPPING_TX: [u8; 6] = [1, 0, 0, 0, 0, 0];

/// DIO mapping routing RX-done to DIO0
const DIO_MAPPING_RX: [u8; 6] = [0, 0, 0, 0, 0, 0];

/// Callback invoked with the decrypted payload and message type of a
/// validated downlink
pub type DownlinkCallback = Box<dyn FnMut(&[u8], MType)>;

/// Driver error, generic over the radio collaborator's error type
#[derive(Debug)]
pub enum DriverError<E> {
    /// Codec or session error
    Frame(Error),
    /// Radio hardware error
    Radio(E),
    /// Configuration file error
    Config(ConfigError),
    /// Every transmission attempt failed
    RetriesExhausted,
}

impl<E> From<Error> for DriverError<E> {
    fn from(err: Error) -> Self {
        DriverError::Frame(err)
    }
}

impl<E> From<ConfigError> for DriverError<E> {
    fn from(err: ConfigError) -> Self {
        DriverError::Config(err)
    }
}

impl<E: fmt::Debug> fmt::Display for DriverError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Frame(err) => write!(f, "{}", err),
            DriverError::Radio(err) => write!(f, "radio error: {:?}", err),
            DriverError::Config(err) => write!(f, "{}", err),
            DriverError::RetriesExhausted => write!(f, "all transmission attempts failed"),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for DriverError<E> {}

/// Interface to the Dragino LoRa/GPS HAT
pub struct Dragino<R: Radio> {
    radio: R,
    config: DraginoConfig,
    freq_plan: FrequencyPlan,
    session: Option<SessionState>,
    dev_nonce: Option<u16>,
    lora_retries: u32,
    class_a: ClassA,
    transmitting: bool,
    downlink_callback: Option<DownlinkCallback>,
}

impl<R: Radio> Dragino<R> {
    /// Create the driver from a configuration file, with the default
    /// retry count
    pub fn new(radio: R, config_path: &Path) -> Result<Self, DriverError<R::Error>> {
        Self::with_retries(radio, config_path, DEFAULT_RETRIES)
    }

    /// Create the driver with an explicit retry count
    pub fn with_retries(
        radio: R,
        config_path: &Path,
        lora_retries: u32,
    ) -> Result<Self, DriverError<R::Error>> {
        let config = DraginoConfig::load(config_path)?;
        let mut device = Self {
            radio,
            freq_plan: FrequencyPlan::eu868(),
            session: None,
            dev_nonce: None,
            lora_retries,
            class_a: ClassA::new(false),
            transmitting: false,
            downlink_callback: None,
            config,
        };
        device.configure_radio()?;

        if let AuthConfig::Abp {
            devaddr,
            nwskey,
            appskey,
        } = &device.config.auth
        {
            let fcnt = device.config.read_fcount();
            device.session = Some(SessionState::new_abp(
                *devaddr,
                nwskey.clone(),
                appskey.clone(),
                fcnt,
            ));
            device.class_a.activated();
            info!("ABP session active, device {}", devaddr);
        }
        Ok(device)
    }

    fn configure_radio(&mut self) -> Result<(), DriverError<R::Error>> {
        self.radio
            .set_mode(RadioMode::Sleep)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_dio_mapping(DIO_MAPPING_TX)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_spreading_factor(self.config.spreading_factor)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_pa_config(self.config.max_power, self.config.output_power)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_sync_word(self.config.sync_word)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_rx_crc(self.config.rx_crc)
            .map_err(DriverError::Radio)?;
        Ok(())
    }

    /// Pick a random channel and retune the sleeping radio
    fn choose_freq(&mut self, join: bool) -> Result<(), DriverError<R::Error>> {
        let freq = self.freq_plan.random_channel(join);
        self.radio
            .set_mode(RadioMode::Sleep)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_frequency(freq)
            .map_err(DriverError::Radio)?;
        info!("frequency = {:.1} MHz", freq);
        Ok(())
    }

    /// Hand a serialized frame to the radio and start transmitting
    fn transmit(&mut self, raw: &[u8]) -> Result<(), DriverError<R::Error>> {
        self.radio.write_payload(raw).map_err(DriverError::Radio)?;
        self.radio
            .set_dio_mapping(DIO_MAPPING_TX)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_invert_iq(false)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_mode(RadioMode::Tx)
            .map_err(DriverError::Radio)?;
        self.transmitting = true;
        Ok(())
    }

    /// Register the function that receives validated downlinks
    ///
    /// The callback gets the decrypted payload bytes and the message type
    /// (`UnconfDataDown` or `ConfDataDown`), after MIC validation.
    pub fn set_downlink_callback(&mut self, callback: impl FnMut(&[u8], MType) + 'static) {
        info!("downlink callback registered");
        self.downlink_callback = Some(Box::new(callback));
    }

    /// True once session keys are in place
    pub fn registered(&self) -> bool {
        self.session.is_some()
    }

    /// True between handing a frame to the radio and its TX-done event
    pub fn transmitting(&self) -> bool {
        self.transmitting
    }

    /// Current Class A state
    pub fn state(&self) -> ClassAState {
        self.class_a.state()
    }

    /// The active session, if any
    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Perform the activation needed before sending
    ///
    /// ABP and cached OTAA credentials activate immediately. Otherwise a
    /// join request with a fresh random DevNonce goes out on a join
    /// channel and the accept is awaited in the receive windows.
    pub fn join(&mut self) -> Result<(), DriverError<R::Error>> {
        match &self.config.auth {
            AuthConfig::Abp { .. } => {
                info!("using ABP, no need to join");
                Ok(())
            }
            AuthConfig::Otaa {
                session: Some(cached),
                ..
            } => {
                info!("using cached session details");
                let fcnt = self.config.read_fcount();
                self.session = Some(SessionState::new_abp(
                    cached.devaddr,
                    cached.nwkskey.clone(),
                    cached.appskey.clone(),
                    fcnt,
                ));
                self.class_a.activated();
                Ok(())
            }
            AuthConfig::Otaa {
                deveui,
                appeui,
                appkey,
                ..
            } => {
                let (deveui, appeui, appkey) = (*deveui, *appeui, appkey.clone());
                let dev_nonce: u16 = rand::thread_rng().gen();
                debug!("performing OTAA join, nonce = {:04X}", dev_nonce);
                let frame = PhyPayload::new_join_request(appeui, deveui, dev_nonce, &appkey);
                self.dev_nonce = Some(dev_nonce);
                self.choose_freq(true)?;
                self.transmit(&frame.to_raw())?;
                self.class_a.begin_join();
                Ok(())
            }
        }
    }

    /// Send a string over the LoRaWAN channel
    pub fn send(&mut self, message: &str) -> Result<(), DriverError<R::Error>> {
        self.send_bytes(message.as_bytes())
    }

    /// Send raw bytes over the LoRaWAN channel
    ///
    /// Retries up to the configured attempt count; every attempt
    /// re-selects a channel and rebuilds the frame with a freshly
    /// consumed frame counter (the counter advances even when an attempt
    /// fails, so a retry can never replay a counter value). Invalid
    /// arguments fail fast. Returns once the radio has accepted the
    /// frame; poll [`Dragino::transmitting`] for over-the-air completion.
    pub fn send_bytes(&mut self, message: &[u8]) -> Result<(), DriverError<R::Error>> {
        let session = self.session.as_ref().ok_or(Error::NotActivated)?;
        let (dev_addr, nwk_skey, app_skey) =
            (session.dev_addr, session.nwk_skey.clone(), session.app_skey.clone());

        for attempt in 1..=self.lora_retries {
            self.choose_freq(false)?;
            let session = self.session.as_mut().ok_or(Error::NotActivated)?;
            let fcnt = session.fcnt_up;
            session.fcnt_up += 1;
            debug!("frame count {}", fcnt);

            match PhyPayload::new_data(
                MType::UnconfDataUp,
                dev_addr,
                fcnt,
                DEFAULT_FPORT,
                message,
                &nwk_skey,
                &app_skey,
            ) {
                Ok(frame) => {
                    self.transmit(&frame.to_raw())?;
                    self.class_a.begin_transmit();
                    info!("succeeded on attempt {}/{}", attempt, self.lora_retries);
                    self.config.save_fcount(fcnt + 1);
                    return Ok(());
                }
                Err(err @ Error::InvalidParam(_)) => {
                    error!("{}", err);
                    return Err(err.into());
                }
                Err(err) => {
                    warn!("attempt {}/{} failed: {}", attempt, self.lora_retries, err);
                }
            }
        }
        Err(DriverError::RetriesExhausted)
    }

    /// TX-done hook, called on the DIO0 edge after a transmission
    ///
    /// Puts the radio into continuous receive with inverted IQ so the
    /// RX1/RX2 downlink (or join accept) can arrive.
    pub fn on_tx_done(&mut self) -> Result<(), DriverError<R::Error>> {
        debug!("TX complete");
        self.transmitting = false;
        self.radio
            .clear_irq_flags(IrqFlags::tx_done())
            .map_err(DriverError::Radio)?;
        self.radio
            .set_mode(RadioMode::Standby)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_dio_mapping(DIO_MAPPING_RX)
            .map_err(DriverError::Radio)?;
        self.radio
            .set_invert_iq(true)
            .map_err(DriverError::Radio)?;
        self.radio.reset_ptr_rx().map_err(DriverError::Radio)?;
        self.radio
            .set_mode(RadioMode::RxContinuous)
            .map_err(DriverError::Radio)?;
        self.class_a.tx_done();
        Ok(())
    }

    /// RX-done hook, called on the DIO0 edge when a frame arrives
    ///
    /// Parses the payload and dispatches it: a join accept (while one is
    /// awaited) activates the session, a validated data downlink goes to
    /// the registered callback. Malformed frames and MIC failures are
    /// logged and dropped, never propagated.
    pub fn on_rx_done(&mut self) -> Result<(), DriverError<R::Error>> {
        self.radio
            .clear_irq_flags(IrqFlags::rx_done())
            .map_err(DriverError::Radio)?;
        debug!("received message");

        let payload = match self.radio.read_payload(true).map_err(DriverError::Radio)? {
            Some(payload) => payload,
            None => {
                info!("payload is empty");
                return Ok(());
            }
        };
        let frame = match PhyPayload::read(&payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("dropping undecodable frame: {}", err);
                return Ok(());
            }
        };

        let mtype = frame.mhdr().mtype();
        debug!("processing message type {}", mtype);
        match mtype {
            MType::JoinAccept if self.class_a.awaiting_join() => self.handle_join_accept(&frame),
            MType::UnconfDataDown | MType::ConfDataDown => self.handle_data_down(&frame, mtype),
            _ => debug!("unexpected message type {}", mtype),
        }
        Ok(())
    }

    fn handle_join_accept(&mut self, frame: &PhyPayload) {
        let appkey = match &self.config.auth {
            AuthConfig::Otaa { appkey, .. } => appkey.clone(),
            AuthConfig::Abp { .. } => return,
        };
        let dev_nonce = match self.dev_nonce {
            Some(nonce) => nonce,
            None => {
                warn!("join accept without an outstanding join request");
                return;
            }
        };
        let accept = match frame.join_accept(&appkey) {
            Ok(accept) => accept,
            Err(err) => {
                warn!("undecodable join accept: {}", err);
                return;
            }
        };
        if !accept.valid_mic(&appkey, frame.mhdr()) {
            warn!("join accept failed MIC validation");
            return;
        }

        let (nwk_skey, app_skey) = accept.derive_session_keys(&appkey, dev_nonce);
        let dev_addr = accept.dev_addr();
        info!("joined, device {}", dev_addr);
        debug!("network key {}", nwk_skey);
        debug!("apps key {}", app_skey);

        let session = SessionState::from_join_accept(dev_addr, nwk_skey, app_skey);
        let fcnt = session.fcnt_up;
        if let Err(err) =
            self.config
                .save_credentials(dev_addr, &session.nwk_skey, &session.app_skey, fcnt)
        {
            warn!("unable to cache session details: {}", err);
        }
        self.session = Some(session);
        self.class_a.activated();
    }

    fn handle_data_down(&mut self, frame: &PhyPayload, mtype: MType) {
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return,
        };
        if !frame.valid_mic(&session.nwk_skey) {
            warn!("downlink failed MIC validation");
            return;
        }
        let fcnt = match frame.mac_payload().fhdr() {
            Some(fhdr) => u32::from(fhdr.fcnt()),
            None => return,
        };
        if fcnt < session.fcnt_down {
            warn!(
                "replayed downlink dropped (counter {} below {})",
                fcnt, session.fcnt_down
            );
            return;
        }
        session.fcnt_down = fcnt + 1;

        let decoded = match frame.decrypt_payload(&session.nwk_skey, &session.app_skey) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("undecryptable downlink: {}", err);
                return;
            }
        };
        debug!("downlink data received ({} bytes)", decoded.len());
        if let Some(callback) = self.downlink_callback.as_mut() {
            callback(&decoded, mtype);
        }
        self.class_a.downlink_handled();
    }
}
