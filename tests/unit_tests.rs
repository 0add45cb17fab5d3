use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use dragino::config::device::{AESKey, AuthMode, DevAddr};
use dragino::config::store::{AuthConfig, ConfigError, DraginoConfig};
use dragino::crypto;
use dragino::lorawan::fhdr::FHDR;
use dragino::lorawan::mac::{FRMPayload, MacPayload};
use dragino::lorawan::mhdr::{Direction, MType, MHDR};
use dragino::lorawan::phy::PhyPayload;
use dragino::lorawan::region::{FrequencyPlan, EU868_UPLINK_MHZ, PUBLIC_SYNC_WORD};
use dragino::Error;

fn key(hex_str: &str) -> AESKey {
    AESKey::new(hex::decode(hex_str).unwrap().try_into().unwrap())
}

fn temp_dir(name: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "dragino-unit-{}-{}-{}",
        std::process::id(),
        name,
        n
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Build the wire form of a join accept the way the network does: MIC over
/// MHDR | plaintext, then an AES decrypt of plaintext | MIC.
fn network_join_accept(
    app_key: &AESKey,
    app_nonce: [u8; 3],
    net_id: [u8; 3],
    dev_addr: [u8; 4],
    cf_list: Option<[u8; 16]>,
) -> Vec<u8> {
    let mut clear = Vec::new();
    clear.extend_from_slice(&app_nonce);
    clear.extend_from_slice(&net_id);
    let mut addr_wire = dev_addr;
    addr_wire.reverse();
    clear.extend_from_slice(&addr_wire);
    clear.push(0x00); // DLSettings
    clear.push(0x01); // RxDelay
    if let Some(list) = cf_list {
        clear.extend_from_slice(&list);
    }

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

#[test]
fn aes128_matches_fips197_vector() {
    let key = key("000102030405060708090a0b0c0d0e0f");
    let plaintext = hex::decode("00112233445566778899aabbccddeeff").unwrap();
    let ciphertext = crypto::aes128_encrypt(&key, &plaintext);
    assert_eq!(
        ciphertext.as_slice(),
        hex::decode("69c4e0d86a7b0430d8cdb78070b4c55a").unwrap()
    );
    let recovered = crypto::aes128_decrypt(&key, &ciphertext);
    assert_eq!(recovered.as_slice(), plaintext.as_slice());
}

#[test]
fn aes_cmac_matches_rfc4493_vectors() {
    let key = key("2b7e151628aed2a6abf7158809cf4f3c");
    assert_eq!(
        crypto::aes_cmac(&key, &[]).to_vec(),
        hex::decode("bb1d6929e95937287fa37d129b756746").unwrap()
    );
    let message = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
    assert_eq!(
        crypto::aes_cmac(&key, &message).to_vec(),
        hex::decode("070a16b46b4d4144f79bdd9dd04a287c").unwrap()
    );
}

#[test]
fn mhdr_direction_table() {
    let expected = [
        Direction::Up,   // JoinRequest
        Direction::Down, // JoinAccept
        Direction::Up,   // UnconfDataUp
        Direction::Down, // UnconfDataDown
        Direction::Up,   // ConfDataUp
        Direction::Down, // ConfDataDown
        Direction::Up,   // RFU
        Direction::Up,   // Proprietary
    ];
    for (mtype, expected) in expected.iter().enumerate() {
        let mhdr = MHDR::from_byte((mtype as u8) << 5).unwrap();
        assert_eq!(mhdr.direction(), *expected, "mtype {}", mtype);
        assert_eq!(mhdr.to_byte(), (mtype as u8) << 5);
    }
}

#[test]
fn mhdr_rejects_bad_major_version() {
    for major in 1..=3u8 {
        assert_eq!(
            MHDR::from_byte(0x40 | major),
            Err(Error::MalformedPacket("invalid major version"))
        );
    }
}

#[test]
fn phy_payload_shorter_than_12_is_malformed() {
    let short = [0x40u8; 11];
    assert!(matches!(
        PhyPayload::read(&short),
        Err(Error::MalformedPacket(_))
    ));
}

#[test]
fn fhdr_with_full_fopts_spans_22_bytes() {
    let mut raw = vec![0x5F, 0x11, 0x01, 0x26]; // DevAddr, wire order
    raw.push(0x0F); // FCtrl: FOptsLen = 15
    raw.extend_from_slice(&7u16.to_le_bytes());
    raw.extend_from_slice(&[0xAA; 15]);

    let fhdr = FHDR::read(&raw).unwrap();
    assert_eq!(fhdr.length(), 22);
    assert_eq!(fhdr.fopts().len(), 15);
    assert_eq!(fhdr.dev_addr(), DevAddr::new([0x26, 0x01, 0x11, 0x5F]));
    assert_eq!(fhdr.fcnt(), 7);
    assert_eq!(fhdr.to_raw().as_slice(), raw.as_slice());

    // a data frame whose MACPayload is exactly FHDR + FPort consumes all
    // 15 option bytes
    let mut mac = raw.clone();
    mac.push(0x01);
    let parsed = MacPayload::read(MType::UnconfDataUp, &mac).unwrap();
    assert_eq!(parsed.fhdr().unwrap().fopts().len(), 15);
    assert_eq!(parsed.fport(), Some(1));
}

#[test]
fn fhdr_truncated_fopts_is_malformed() {
    let mut raw = vec![0x5F, 0x11, 0x01, 0x26, 0x0F];
    raw.extend_from_slice(&1u16.to_le_bytes());
    raw.extend_from_slice(&[0xAA; 4]); // 4 of the announced 15
    assert!(matches!(FHDR::read(&raw), Err(Error::MalformedPacket(_))));
}

#[test]
fn join_request_round_trip() {
    let app_key = key("131c8af7a3e435d0d5e9476b04b91639");
    let dev_eui = [0x00, 0x82, 0xAA, 0x0D, 0x42, 0x9C, 0x79, 0x34];
    let app_eui = [0x70, 0xB3, 0xD5, 0x7E, 0xF0, 0x00, 0x4D, 0xBC];
    let dev_nonce = u16::from_le_bytes([0x01, 0x25]);

    let frame = PhyPayload::new_join_request(app_eui, dev_eui, dev_nonce, &app_key);
    let raw = frame.to_raw();

    assert_eq!(raw.len(), 23);
    assert_eq!(raw[0], 0x00);

    // EUIs little-endian on the wire, nonce bytes in wire order
    let mut app_eui_wire = app_eui;
    app_eui_wire.reverse();
    let mut dev_eui_wire = dev_eui;
    dev_eui_wire.reverse();
    assert_eq!(&raw[1..9], &app_eui_wire);
    assert_eq!(&raw[9..17], &dev_eui_wire);
    assert_eq!(&raw[17..19], &[0x01, 0x25]);

    // MIC is the CMAC of everything before it
    assert_eq!(&raw[19..23], &crypto::join_mic(&app_key, &raw[..19]));
    assert!(frame.valid_mic(&app_key));

    // re-parsing reproduces the logical fields
    let parsed = PhyPayload::read(&raw).unwrap();
    assert_eq!(parsed, frame);
    match parsed.mac_payload().frm_payload() {
        FRMPayload::JoinRequest(p) => {
            assert_eq!(p.app_eui(), &app_eui);
            assert_eq!(p.dev_eui(), &dev_eui);
            assert_eq!(p.dev_nonce(), dev_nonce);
        }
        other => panic!("unexpected payload variant {:?}", other),
    }
}

#[test]
fn uplink_data_frame_encrypts_and_authenticates() {
    let nwk_skey = key("c3f6a2255b9a86f3fd8b5a07d55e4c26");
    let app_skey = key("15f6fe2a2c0f5d74be6c3b1a58d94045");
    let dev_addr = DevAddr::new([0x26, 0x01, 0x11, 0x5F]);
    let plaintext = b"hello dragino";

    let frame = PhyPayload::new_data(
        MType::UnconfDataUp,
        dev_addr,
        1,
        1,
        plaintext,
        &nwk_skey,
        &app_skey,
    )
    .unwrap();
    let raw = frame.to_raw();

    // MHDR(1) + FHDR(7) + FPort(1) + FRMPayload(13) + MIC(4)
    assert_eq!(raw.len(), 26);
    assert_eq!(raw[0], 0x40);
    assert_eq!(&raw[1..5], &[0x5F, 0x11, 0x01, 0x26]);
    assert_eq!(raw[8], 1); // FPort

    // the payload travels encrypted
    assert_ne!(&raw[9..22], plaintext.as_slice());

    // MIC recomputed from an independently constructed B0 block
    let mut b0 = [0u8; 16];
    b0[0] = 0x49;
    b0[5] = 0x00; // uplink
    b0[6..10].copy_from_slice(&[0x5F, 0x11, 0x01, 0x26]);
    b0[10..14].copy_from_slice(&1u32.to_le_bytes());
    b0[15] = 22;
    let mut mic_input = b0.to_vec();
    mic_input.extend_from_slice(&raw[..22]);
    let full_cmac = crypto::aes_cmac(&nwk_skey, &mic_input);
    assert_eq!(&raw[22..26], &full_cmac[..4]);
    assert!(frame.valid_mic(&nwk_skey));

    // keystream check for the (single, truncated) block
    let mut a1 = [0u8; 16];
    a1[0] = 0x01;
    a1[6..10].copy_from_slice(&[0x5F, 0x11, 0x01, 0x26]);
    a1[10..14].copy_from_slice(&1u32.to_le_bytes());
    a1[15] = 1;
    let keystream = crypto::aes128_encrypt(&app_skey, &a1);
    for (i, &byte) in plaintext.iter().enumerate() {
        assert_eq!(raw[9 + i], byte ^ keystream[i]);
    }

    // round trip
    let parsed = PhyPayload::read(&raw).unwrap();
    assert_eq!(parsed, frame);
    assert_eq!(parsed.dev_addr(), Some(dev_addr));
    assert!(parsed.valid_mic(&nwk_skey));
    let decoded = parsed.decrypt_payload(&nwk_skey, &app_skey).unwrap();
    assert_eq!(decoded.as_slice(), plaintext.as_slice());
}

#[test]
fn mac_command_payload_uses_network_key() {
    let nwk_skey = key("000102030405060708090a0b0c0d0e0f");
    let app_skey = key("f0e0d0c0b0a090807060504030201000");
    let dev_addr = DevAddr::new([0x01, 0x02, 0x03, 0x04]);

    let frame = PhyPayload::new_data(
        MType::UnconfDataUp,
        dev_addr,
        9,
        0,
        &[0x02, 0x30], // opaque MAC command bytes
        &nwk_skey,
        &app_skey,
    )
    .unwrap();

    let parsed = PhyPayload::read(&frame.to_raw()).unwrap();
    assert_eq!(parsed.mac_payload().fport(), Some(0));
    let decoded = parsed.decrypt_payload(&nwk_skey, &app_skey).unwrap();
    assert_eq!(decoded.as_slice(), &[0x02, 0x30]);
}

#[test]
fn empty_frm_payload_keeps_fport() {
    let nwk_skey = key("000102030405060708090a0b0c0d0e0f");
    let app_skey = key("f0e0d0c0b0a090807060504030201000");
    let dev_addr = DevAddr::new([0x01, 0x02, 0x03, 0x04]);

    let frame =
        PhyPayload::new_data(MType::UnconfDataUp, dev_addr, 3, 1, &[], &nwk_skey, &app_skey)
            .unwrap();
    let raw = frame.to_raw();
    assert_eq!(raw.len(), 13);

    let parsed = PhyPayload::read(&raw).unwrap();
    assert_eq!(parsed.mac_payload().fport(), Some(1));
    assert!(parsed.valid_mic(&nwk_skey));
    let decoded = parsed.decrypt_payload(&nwk_skey, &app_skey).unwrap();
    assert!(decoded.is_empty());
}

#[test]
fn oversized_frm_payload_is_invalid_param() {
    let nwk_skey = key("000102030405060708090a0b0c0d0e0f");
    let app_skey = key("f0e0d0c0b0a090807060504030201000");
    let dev_addr = DevAddr::new([0x01, 0x02, 0x03, 0x04]);
    let oversized = [0u8; 223];

    assert!(matches!(
        PhyPayload::new_data(
            MType::UnconfDataUp,
            dev_addr,
            1,
            1,
            &oversized,
            &nwk_skey,
            &app_skey
        ),
        Err(Error::InvalidParam(_))
    ));
}

#[test]
fn non_data_mtype_rejected_by_create() {
    let nwk_skey = key("000102030405060708090a0b0c0d0e0f");
    let app_skey = key("f0e0d0c0b0a090807060504030201000");
    let dev_addr = DevAddr::new([0x01, 0x02, 0x03, 0x04]);

    assert!(matches!(
        PhyPayload::new_data(
            MType::JoinRequest,
            dev_addr,
            1,
            1,
            &[],
            &nwk_skey,
            &app_skey
        ),
        Err(Error::InvalidParam(_))
    ));
}

#[test]
fn join_accept_decode_and_key_derivation() {
    let app_key = key("131c8af7a3e435d0d5e9476b04b91639");
    let app_nonce = [0x11, 0x22, 0x33];
    let net_id = [0x00, 0x00, 0x13];
    let dev_addr = [0x26, 0x01, 0x15, 0x5D];
    let dev_nonce = 0x2501;

    let wire = network_join_accept(&app_key, app_nonce, net_id, dev_addr, None);
    assert_eq!(wire.len(), 17);

    let frame = PhyPayload::read(&wire).unwrap();
    assert_eq!(frame.mhdr().mtype(), MType::JoinAccept);
    assert!(frame.valid_mic(&app_key));

    let accept = frame.join_accept(&app_key).unwrap();
    assert_eq!(accept.app_nonce(), &app_nonce);
    assert_eq!(accept.net_id(), &net_id);
    assert_eq!(accept.dev_addr(), DevAddr::new(dev_addr));
    assert_eq!(accept.dl_settings(), 0x00);
    assert_eq!(accept.rx_delay(), 0x01);
    assert!(accept.cf_list().is_none());

    let (nwk_skey, app_skey) = accept.derive_session_keys(&app_key, dev_nonce);
    assert_eq!(nwk_skey.as_bytes().len(), 16);
    assert_eq!(app_skey.as_bytes().len(), 16);
    assert_ne!(nwk_skey, app_skey);
    assert_eq!(
        (nwk_skey, app_skey),
        crypto::derive_session_keys(&app_key, &app_nonce, &net_id, dev_nonce)
    );
}

#[test]
fn join_accept_with_cf_list() {
    let app_key = key("131c8af7a3e435d0d5e9476b04b91639");
    let cf_list = [0x42u8; 16];
    let wire = network_join_accept(
        &app_key,
        [0x01, 0x02, 0x03],
        [0x00, 0x00, 0x13],
        [0xAA, 0xBB, 0xCC, 0xDD],
        Some(cf_list),
    );
    assert_eq!(wire.len(), 33);

    let frame = PhyPayload::read(&wire).unwrap();
    assert!(frame.valid_mic(&app_key));
    let accept = frame.join_accept(&app_key).unwrap();
    assert_eq!(accept.cf_list(), Some(&cf_list));
}

#[test]
fn join_accept_tampered_mic_fails_validation() {
    let app_key = key("131c8af7a3e435d0d5e9476b04b91639");
    let mut wire = network_join_accept(
        &app_key,
        [0x11, 0x22, 0x33],
        [0x00, 0x00, 0x13],
        [0x26, 0x01, 0x15, 0x5D],
        None,
    );
    let last = wire.len() - 1;
    wire[last] ^= 0xFF;
    let frame = PhyPayload::read(&wire).unwrap();
    assert!(!frame.valid_mic(&app_key));
}

#[test]
fn eu868_plan_channels() {
    let plan = FrequencyPlan::eu868();
    assert_eq!(plan.uplink_channels(), &EU868_UPLINK_MHZ);
    assert_eq!(plan.join_channels(), &EU868_UPLINK_MHZ[..3]);
    assert_eq!(PUBLIC_SYNC_WORD, 0x34);
    for _ in 0..32 {
        assert!(plan.join_channels().contains(&plan.random_channel(true)));
        assert!(plan.uplink_channels().contains(&plan.random_channel(false)));
    }

    // a custom plan without a join subset draws joins from the full list
    let custom = FrequencyPlan::new(vec![867.1, 867.3], vec![]);
    assert_eq!(custom.join_channels(), custom.uplink_channels());
}

fn write_abp_config(dir: &PathBuf) -> PathBuf {
    let fcount = dir.join("fcount");
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
devaddr = "2601115F"
nwskey = "c3f6a2255b9a86f3fd8b5a07d55e4c26"
appskey = "15f6fe2a2c0f5d74be6c3b1a58d94045"
"#,
        fcount.display()
    );
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn abp_config_loads() {
    let dir = temp_dir("abp-config");
    let config = DraginoConfig::load(&write_abp_config(&dir)).unwrap();
    assert_eq!(config.spreading_factor, 7);
    assert_eq!(config.max_power, 0x0F);
    assert_eq!(config.output_power, 0x0E);
    assert_eq!(config.sync_word, 0x34);
    assert!(config.rx_crc);
    assert!(config.joined());
    assert_eq!(config.auth_mode(), AuthMode::Abp);
    match &config.auth {
        AuthConfig::Abp { devaddr, .. } => {
            assert_eq!(*devaddr, DevAddr::new([0x26, 0x01, 0x11, 0x5F]));
        }
        other => panic!("unexpected auth config {:?}", other),
    }
}

#[test]
fn otaa_config_requires_join_material() {
    let dir = temp_dir("otaa-config");
    let path = dir.join("dragino.toml");
    let content = r#"gps_baud_rate = 9600
gps_serial_port = "/dev/serial0"
gps_serial_timeout = 3
gps_wait_period = 30
spreading_factor = 7
max_power = "0F"
output_power = "0E"
sync_word = "34"
rx_crc = true
fcount_filename = "/tmp/fcount"
auth_mode = "OTAA"
deveui = "0082AA0D429C7934"
appeui = "70B3D57EF0004DBC"
"#;
    std::fs::write(&path, content).unwrap();
    match DraginoConfig::load(&path) {
        Err(ConfigError::MissingField("appkey")) => {}
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn unknown_auth_mode_is_invalid() {
    let dir = temp_dir("bad-auth");
    let path = dir.join("dragino.toml");
    let content = write_abp_config(&dir);
    let content = std::fs::read_to_string(content)
        .unwrap()
        .replace("auth_mode = \"ABP\"", "auth_mode = \"MAGIC\"");
    std::fs::write(&path, content).unwrap();
    match DraginoConfig::load(&path) {
        Err(ConfigError::InvalidField("auth_mode")) => {}
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn fcount_defaults_and_round_trips() {
    let dir = temp_dir("fcount");
    let mut config = DraginoConfig::load(&write_abp_config(&dir)).unwrap();
    assert_eq!(config.read_fcount(), 1);

    config.save_fcount(7);
    assert_eq!(
        std::fs::read_to_string(&config.fcount_filename).unwrap(),
        "7\n"
    );
    assert_eq!(config.read_fcount(), 7);
}
