use basestation::ble::decode_payload;
use basestation::dsp::{blood_oxygenation, percentage_from_millivolts};
use basestation::model::{characteristic_for_handle, Intent, PatchId, PatientId};
use basestation::state::Hub;
use pretty_assertions::assert_eq;

fn patch(text: &str) -> PatchId {
    PatchId::parse(text).expect("valid patch address")
}

/// S1: connect/disconnect round-trip. After a worker tears down a
/// disconnected patch, both mailboxes are empty again.
#[test]
fn connect_then_disconnect_round_trip_clears_both_mailboxes() {
    let hub = Hub::new();
    let p1 = patch("AA:BB:CC:DD:EE:01");

    hub.connect_patient(p1, PatientId::new("patient-1"));
    assert_eq!(Some(PatientId::new("patient-1")), hub.patient_mapping.get_cloned(&p1));
    assert_eq!(Some(Intent::Connect), hub.mac_address_update.get_cloned(&p1));

    hub.disconnect_patient(p1, false);
    assert!(hub.patient_mapping.get_cloned(&p1).is_none());
    assert_eq!(Some(Intent::Disconnect), hub.mac_address_update.get_cloned(&p1));

    // A worker acting on the queued Disconnect intent clears it once torn
    // down, mirroring ble::worker::ConnectionWorker::step_disconnecting.
    hub.mac_address_update.remove(&p1);
    assert!(hub.mac_address_update.get_cloned(&p1).is_none());
}

/// S4: SpO2 ratio of one clips to 80, and a low enough ratio clips to
/// the 100 ceiling.
#[test]
fn spo2_ratio_of_one_gives_eighty_and_low_ratio_clips() {
    let spo2 = blood_oxygenation(1.0, 1.0, 1.0, 1.0);
    assert!((spo2 - 80.0).abs() < 1e-9);

    let clipped = blood_oxygenation(0.3, 1.0, 1.0, 1.0);
    assert_eq!(100.0, clipped);
}

/// S5: the battery curve's three named points.
#[test]
fn battery_curve_matches_named_voltage_points() {
    assert_eq!(100.0, percentage_from_millivolts(4150.0));
    assert_eq!(12.0, percentage_from_millivolts(3650.0));
    assert!((percentage_from_millivolts(3500.0) - (-5.13)).abs() < 1e-9);
}

/// S6: handle 2 (imu) decodes signed little-endian 16-bit samples.
#[test]
fn imu_handle_decodes_signed_little_endian_words() {
    let characteristic = characteristic_for_handle(2).expect("handle 2 is mapped");
    let bytes = [0x00, 0x00, 0xFF, 0xFF, 0x02, 0x00];
    let decoded = decode_payload(characteristic, &bytes).expect("well-formed payload");
    assert_eq!(vec![0, -1, 2], decoded);
}
