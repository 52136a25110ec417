mod common;

use common::{
    MockDriver, ata_identify_with, opal_v2_discovery, status_only_response, sync_session_response,
    tper_response,
};
use pretty_assertions::assert_eq;
use sedparm::tcg::TcgDialect;
use sedparm::{DriveHandle, ErrorKind, TcgSupport};

fn opal_drive(mut driver: MockDriver) -> DriveHandle<MockDriver> {
    driver.discovery = Some(opal_v2_discovery());
    DriveHandle::new("/dev/mock", Some(driver), None)
}

fn ata_identify_plain() -> Vec<u8> {
    let mut identify = ata_identify_with(&[(49, 1 << 9), (60, 0x1000)]);
    // Word-swapped raw serial: "0123456789ABCDEFGHIJ" on the wire.
    identify[20..40].copy_from_slice(b"1032547698BADCFEHGJI");
    identify
}

#[test]
fn discovery_sets_feature_flags_and_selects_opal_v2() {
    let mut drive = opal_drive(MockDriver::ata(ata_identify_plain()));
    let info = drive.info();
    assert_eq!(info.tcg.support, TcgSupport::Supported);
    assert!(info.tcg.tper);
    assert!(info.tcg.locking);
    assert!(info.tcg.opal_v200);
    assert!(!info.tcg.enterprise);

    let tcg = drive.tcg_device().unwrap();
    assert_eq!(tcg.dialect(), TcgDialect::OpalV2);
    assert_eq!(tcg.base_com_id().unwrap(), 0x07fe);
    assert_eq!(tcg.num_com_ids().unwrap(), 1);
    assert!(tcg.is_locking_supported());
    assert!(tcg.is_locking_enabled());
    assert!(!tcg.is_locked());
}

#[test]
fn failed_discovery_leaves_support_undetermined() {
    // No discovery scripted: the security path reports NotSupported and
    // the TRUSTED fallback aborts, so nothing is known about the drive.
    let drive = DriveHandle::new(
        "/dev/mock",
        Some(MockDriver::ata(ata_identify_plain())),
        None,
    );
    assert_eq!(drive.info().tcg.support, TcgSupport::Undetermined);
    assert!(drive.info().tcg.features.is_empty());
}

#[test]
fn psid_revert_sends_exactly_two_commands_and_skips_session_close() {
    const PSID: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ012345";

    let mut driver = MockDriver::ata(ata_identify_plain());
    driver
        .tper_responses
        .push_back(sync_session_response(0x69, 0x1001));
    driver.tper_responses.push_back(status_only_response(0x00));
    let mut drive = opal_drive(driver);

    let mut tcg = drive.tcg_device().unwrap();
    tcg.revert_tper(PSID, true, false).unwrap();

    let driver = drive.driver().unwrap();
    assert_eq!(driver.security_sends.len(), 2);
    for send in &driver.security_sends {
        assert_eq!(send.protocol, 0x01);
        assert_eq!(send.com_id, 0x07fe);
    }

    // The StartSession call carries the raw PSID: hash suppression wraps
    // the printed label as a bytestring atom without the KDF.
    let start_session = &driver.security_sends[0].payload;
    let mut credential = vec![0xd0, PSID.len() as u8];
    credential.extend_from_slice(PSID.as_bytes());
    assert!(
        start_session
            .windows(credential.len())
            .any(|w| w == credential)
    );

    // Revert invokes AdminSP.Revert.
    let revert = &driver.security_sends[1].payload;
    let admin_sp = [0xa8, 0x00, 0x00, 0x02, 0x05, 0x00, 0x00, 0x00, 0x01];
    let revert_method = [0xa8, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x02, 0x02];
    assert!(revert.windows(admin_sp.len()).any(|w| w == admin_sp));
    assert!(revert.windows(revert_method.len()).any(|w| w == revert_method));

    // The TPer destroyed the session with the revert; no EndOfSession may
    // follow.
    drop(drive);
}

#[test]
fn revert_with_error_status_is_reported() {
    let mut driver = MockDriver::ata(ata_identify_plain());
    driver
        .tper_responses
        .push_back(sync_session_response(0x69, 0x1001));
    // NOT_AUTHORIZED on the revert itself.
    driver.tper_responses.push_back(status_only_response(0x01));
    let mut drive = opal_drive(driver);

    let mut tcg = drive.tcg_device().unwrap();
    let err = tcg.revert_tper("wrong", false, false).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TcgErrorStatus);
    assert_eq!(err.drive_status, 0x01);
}

#[test]
fn msid_retrieval_reads_the_pin_column() {
    const MSID: &[u8] = b"FACTORYDEFAULT1234567890";

    let mut driver = MockDriver::ata(ata_identify_plain());
    driver
        .tper_responses
        .push_back(sync_session_response(0x42, 0x2002));
    // Get result: [[ PIN bytestring ]] then the status list.
    let mut payload = vec![0xf0, 0xf0];
    payload.push(0xd0);
    payload.push(MSID.len() as u8);
    payload.extend_from_slice(MSID);
    payload.extend_from_slice(&[0xf1, 0xf1, 0xf9, 0xf0, 0x00, 0x00, 0x00, 0xf1]);
    driver.tper_responses.push_back(tper_response(&payload));
    let mut drive = opal_drive(driver);

    let mut tcg = drive.tcg_device().unwrap();
    let msid = tcg.default_password().unwrap();
    assert_eq!(msid, MSID);

    // The Get call addressed C_PIN_MSID.
    let driver = drive.driver().unwrap();
    let get_call = &driver.security_sends[1].payload;
    let c_pin_msid = [0xa8, 0x00, 0x00, 0x00, 0x0b, 0x00, 0x00, 0x84, 0x02];
    assert!(get_call.windows(c_pin_msid.len()).any(|w| w == c_pin_msid));
}

#[test]
fn session_close_emits_end_of_session() {
    let mut driver = MockDriver::ata(ata_identify_plain());
    driver
        .tper_responses
        .push_back(sync_session_response(0x42, 0x2002));
    let mut drive = opal_drive(driver);

    {
        let mut tcg = drive.tcg_device().unwrap();
        let mut session = tcg.session();
        session
            .start(sedparm::tcg::OpalUid::ADMIN_SP, None, sedparm::tcg::OpalUid::ANYBODY)
            .unwrap();
        assert_eq!(session.hsn(), 0x42);
        assert_eq!(session.tsn(), 0x2002);
        // Dropping the active session sends the close.
    }

    let driver = drive.driver().unwrap();
    assert_eq!(driver.security_sends.len(), 2);
    let close = &driver.security_sends[1].payload;
    // Bare EndOfSession token right behind the envelope.
    assert_eq!(close[56], 0xfa);
}
