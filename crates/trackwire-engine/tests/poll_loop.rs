//! End-to-end tests of the poll loop over scripted transports.

use std::thread;
use std::time::{Duration, Instant};
use trackwire_devicemap::LogicalDeviceSpec;
use trackwire_engine::{
    ByteSource, DeviceConfig, DeviceLink, LinkEvent, LoopState, PollError, RequestError,
    ScriptedSource, SourceError,
};
use trackwire_protocol::formats::ascii::{AsciiBody, encode_line};
use trackwire_protocol::formats::relay::{
    POSE_TYPE_NAME, RelayHeader, encode_message, encode_type_description, pose_payload,
};
use trackwire_protocol::formats::remote::{
    CALIBRATION_ADDRESS, MemorySpace, REPORT_BUTTONS, encode_input_report, encode_read_reply,
    read_memory_request,
};
use trackwire_protocol::formats::station::encode_station;
use trackwire_protocol::sync::AsciiTag;
use trackwire_protocol::{StationLayout, WireFormat};
use trackwire_types::{DQuat, DVec3, FormatTag, Pose};

const EVENT_WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _installed = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn fast(config: DeviceConfig) -> DeviceConfig {
    config.with_read_timeout(Duration::from_millis(10))
}

fn expect_event(link: &DeviceLink, want: LinkEvent) {
    assert_eq!(link.events().recv_timeout(EVENT_WAIT).ok(), Some(want));
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + EVENT_WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn station_stream_publishes_after_garbage_and_split_reads() -> Result<(), PollError> {
    init_tracing();
    let layout = StationLayout::new(true, 2);
    let pose = Pose::new(DVec3::new(1.0, 2.0, 3.0), DQuat::from_rotation_y(0.3));
    let record = encode_station(1, layout, &pose, 0b0000_0101, &[1.0, -1.0]);
    let (head, tail) = record.split_at(11);

    let (source, _handle) = ScriptedSource::replay([
        b"noise\x00\xFF".to_vec(),
        head.to_vec(),
        tail.to_vec(),
        record.clone(),
    ]);
    let config = fast(DeviceConfig::new("hybrid", WireFormat::Station))
        .with_station(1, true, 2)
        .with_device(
            LogicalDeviceSpec::new("wand", FormatTag::Station)
                .with_wire_id(1)
                .with_buttons(8)
                .with_valuators(2),
        );

    let mut link = DeviceLink::start(config, source)?;
    expect_event(&link, LinkEvent::Started);
    expect_event(&link, LinkEvent::Stopped);
    link.join()?;
    assert_eq!(link.state(), LoopState::Stopped);

    let frame = link.reader().snapshot();
    assert!(frame.generation >= 1);
    let tracker = frame.trackers[0];
    assert!((tracker.position - pose.position).length() < 1e-5);
    assert!(tracker.orientation.dot(pose.orientation).abs() > 1.0 - 1e-5);
    assert_eq!(&frame.buttons[..3], &[true, false, true]);
    assert!(frame.valuators[0] > 0.99);
    assert!(frame.valuators[1] < -0.99);

    let counters = link.counters();
    assert_eq!(counters.records, 2);
    assert!(counters.commits >= 2);
    assert_eq!(counters.bytes, (7 + record.len() * 2) as u64);
    Ok(())
}

#[test]
fn ascii_stream_drops_unmapped_bodies_and_survives_bad_lines() -> Result<(), PollError> {
    let pose = Pose::new(DVec3::new(0.1, 0.2, 0.3), DQuat::IDENTITY);
    let mut text = String::from("fr 42\n6d 1 [0 1.0][garbage\n");
    text.push_str(&encode_line(
        AsciiTag::Body6d,
        &[AsciiBody::new(7, pose), AsciiBody::new(0, pose)],
    ));
    text.push('\n');

    let (source, _handle) = ScriptedSource::replay([text.into_bytes()]);
    let config = fast(DeviceConfig::new("optical", WireFormat::Ascii))
        .with_device(LogicalDeviceSpec::new("head", FormatTag::Body6d).with_wire_id(0));

    let mut link = DeviceLink::start(config, source)?;
    link.join()?;

    let head = link.reader().tracker(0).unwrap_or_default();
    assert!((head.position - pose.position).length() < 1e-9);
    let counters = link.counters();
    assert_eq!(counters.unmapped, 1);
    assert!(counters.truncated >= 1);
    Ok(())
}

#[test]
fn relay_pose_uses_declared_type_codes() -> Result<(), Box<dyn std::error::Error>> {
    let pose = Pose::new(DVec3::new(-1.0, 0.5, 2.0), DQuat::from_rotation_x(0.2));
    let mut stream = encode_type_description(4, POSE_TYPE_NAME)?;
    stream.extend(encode_message(RelayHeader::new(0, 4), &pose_payload(2, &pose))?);

    let (source, _handle) = ScriptedSource::replay([stream]);
    let config = fast(DeviceConfig::new("relay", WireFormat::Relay))
        .with_device(LogicalDeviceSpec::new("sensor2", FormatTag::Relay).with_wire_id(2));

    let mut link = DeviceLink::start(config, source)?;
    link.join()?;

    let tracker = link.reader().tracker(0).unwrap_or_default();
    assert!((tracker.position - pose.position).length() < 1e-9);
    assert_eq!(tracker.velocity, DVec3::ZERO);
    Ok(())
}

fn remote_config() -> DeviceConfig {
    fast(DeviceConfig::new("remote", WireFormat::Remote))
        .with_reply_timeout(Duration::from_secs(2))
        .with_device(
            LogicalDeviceSpec::new("remote", FormatTag::Remote)
                .with_wire_id(0)
                .with_trackers(0)
                .with_buttons(18)
                .with_valuators(9),
        )
}

#[test]
fn side_channel_read_resolves_from_reply_report() -> Result<(), Box<dyn std::error::Error>> {
    let request = read_memory_request(MemorySpace::Eeprom, u32::from(CALIBRATION_ADDRESS), 10)?;
    let calibration = [0x80, 0x80, 0x80, 0, 0x9A, 0x9A, 0x9A, 0, 0, 0];
    let reply = encode_read_reply(0, CALIBRATION_ADDRESS, 0, &calibration);

    let (source, handle) = ScriptedSource::new();
    let source = source.with_responder(move |out| {
        if out == request.as_slice() {
            vec![reply.clone()]
        } else {
            Vec::new()
        }
    });
    let mut link = DeviceLink::start(remote_config(), source)?;
    expect_event(&link, LinkEvent::Started);

    let answer = link.request(request.to_vec())?;
    assert_eq!(answer.data(), &calibration);
    assert_eq!(handle.written(), vec![request.to_vec()]);
    assert!(!link.is_waiting_for_reply());

    handle.push(encode_input_report(REPORT_BUTTONS, 0x0008, [0; 3], &[]));
    assert!(wait_until(|| link.reader().button(3) == Some(true)));

    link.stop()?;
    expect_event(&link, LinkEvent::Stopped);
    Ok(())
}

#[test]
fn side_channel_device_error_fails_only_that_request() -> Result<(), Box<dyn std::error::Error>> {
    let (source, _handle) = ScriptedSource::new();
    let source = source.with_responder(|_| vec![encode_read_reply(0, 0x0016, 8, &[0])]);
    let mut link = DeviceLink::start(remote_config(), source)?;

    let request = read_memory_request(MemorySpace::Eeprom, 0x0016, 1)?;
    assert_eq!(
        link.request(request.to_vec()),
        Err(RequestError::Device { status: 8 })
    );
    assert!(link.request(request.to_vec()).is_err());
    link.stop()?;
    Ok(())
}

#[test]
fn unanswered_request_times_out() -> Result<(), PollError> {
    let (source, handle) = ScriptedSource::new();
    let mut link = DeviceLink::start(remote_config(), source)?;
    let started = Instant::now();
    assert_eq!(
        link.request_with_timeout(vec![0x15, 0x00], Duration::from_millis(50)),
        Err(RequestError::Timeout)
    );
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(wait_until(|| handle.written().len() == 1));
    link.stop()
}

#[test]
fn cancel_wakes_waiting_request() -> Result<(), PollError> {
    let (source, _handle) = ScriptedSource::new();
    let mut link = DeviceLink::start(remote_config(), source)?;

    thread::scope(|s| {
        let waiter = s.spawn(|| link.request_with_timeout(vec![0x15, 0x00], Duration::from_secs(30)));
        assert!(wait_until(|| link.is_waiting_for_reply()));
        link.cancel();
        assert_eq!(waiter.join().ok(), Some(Err(RequestError::Cancelled)));
    });

    link.join()?;
    assert_eq!(link.state(), LoopState::Stopped);
    assert_eq!(
        link.request(vec![0x15, 0x00]),
        Err(RequestError::Cancelled)
    );
    Ok(())
}

#[test]
fn transport_failure_reports_failed_event() -> Result<(), PollError> {
    let (source, handle) = ScriptedSource::new();
    let mut link = DeviceLink::start(remote_config(), source)?;
    expect_event(&link, LinkEvent::Started);

    handle.fail("unplugged");
    expect_event(
        &link,
        LinkEvent::Failed("Transport failed: Transport I/O error: unplugged".into()),
    );
    assert!(matches!(
        link.join(),
        Err(PollError::Transport(SourceError::Io(_)))
    ));
    assert_eq!(link.state(), LoopState::Stopped);
    assert!(link.join().is_ok());
    Ok(())
}

#[test]
fn config_from_json_is_validated_before_start() -> Result<(), serde_json::Error> {
    let config: DeviceConfig = serde_json::from_str(
        r#"{
            "name": "optical",
            "format": "ascii",
            "read_timeout": { "secs": 0, "nanos": 10000000 },
            "devices": [
                { "name": "head", "format": "body6d", "wire_id": 0 },
                { "name": "wand", "format": "body6d", "wire_id": 0 }
            ]
        }"#,
    )?;
    assert_eq!(config.read_timeout, Duration::from_millis(10));
    assert_eq!(config.reply_timeout, Duration::from_secs(2));

    let (source, _handle) = ScriptedSource::new();
    let err = DeviceLink::start(config, source).err();
    insta::assert_snapshot!(
        err.map(|e| e.to_string()).unwrap_or_default(),
        @"Invalid device map: Wire id 0 is used twice for format body6d"
    );
    Ok(())
}

#[test]
fn boxed_sources_are_accepted() -> Result<(), PollError> {
    let (source, _handle) = ScriptedSource::replay(Vec::new());
    let boxed: Box<dyn ByteSource> = Box::new(source);
    let mut link = DeviceLink::start(fast(DeviceConfig::new("empty", WireFormat::Binary)), boxed)?;
    link.join()?;
    assert_eq!(link.counters().bytes, 0);
    Ok(())
}
