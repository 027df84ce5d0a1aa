use bytes::BytesMut;
use std::time::{Duration, Instant};

use sweep_device::{Device, DeviceConfig, ErrorKind, SimConfig, SimulatedPort};
use sweep_frame::{encode_sample, Mnemonic, SamplePacket, SAMPLE_FRAME_LEN};
use sweep_transport::Transport;

fn scripted(name: &str) -> (SimulatedPort, Device<Box<dyn Transport>>) {
    let port = SimulatedPort::with_config(
        name,
        SimConfig {
            auto_generate: false,
            ..SimConfig::default()
        },
    );
    let device = port
        .connect(DeviceConfig::default())
        .expect("simulated device should open");
    port.clear_commands();
    (port, device)
}

/// One revolution of `len` samples: a boundary followed by `len - 1` others.
fn revolution(distance: u16, len: usize) -> Vec<SamplePacket> {
    (0..len)
        .map(|i| SamplePacket::new((i * 40) as u16, distance + i as u16, 100, i == 0))
        .collect()
}

fn count(port: &SimulatedPort, mnemonic: Mnemonic) -> usize {
    port.commands()
        .iter()
        .filter(|c| c.mnemonic == mnemonic)
        .count()
}

#[test]
fn motor_speed_round_trips_in_range() {
    let (_port, mut device) = scripted("motor-round-trip");
    for hz in 1..=10 {
        device.set_motor_speed(hz).expect("in-range speed should be accepted");
        assert_eq!(device.motor_speed().expect("speed should be readable"), hz);
    }
}

#[test]
fn motor_speed_out_of_range_never_reaches_device() {
    let (port, mut device) = scripted("motor-invalid");
    for hz in [0, 11, -1, 100, i32::MIN] {
        let err = device.set_motor_speed(hz).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }
    assert!(port.commands().is_empty());
}

#[test]
fn sample_rate_round_trips() {
    let (port, mut device) = scripted("rate-round-trip");
    for hz in [500, 750, 1000] {
        device.set_sample_rate(hz).expect("nominal rate should be accepted");
        assert_eq!(device.sample_rate().expect("rate should be readable"), hz);
    }
    assert_eq!(port.sample_rate().hz(), 1000);
}

#[test]
fn sample_rate_outside_set_never_reaches_device() {
    let (port, mut device) = scripted("rate-invalid");
    for hz in [0, 499, 600, 1001, -500] {
        let err = device.set_sample_rate(hz).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }
    assert!(port.commands().is_empty());
}

#[test]
fn sequential_scans_split_at_boundaries() {
    let (port, mut device) = scripted("two-scans");
    let (k, m) = (7, 12);

    // Tail of a revolution already in progress, then B1 K B2 M B3.
    let mut packets = vec![
        SamplePacket::new(4000, 50, 1, false),
        SamplePacket::new(4100, 50, 1, false),
    ];
    packets.extend(revolution(300, k + 1));
    packets.extend(revolution(600, m + 1));
    packets.extend(revolution(900, 1));
    port.queue_samples(packets);

    device.start_scanning().expect("scanning should start");
    let first = device.get_scan().expect("first scan");
    let second = device.get_scan().expect("second scan");

    assert_eq!(first.len(), k + 1);
    assert_eq!(second.len(), m + 1);
    for scan in [&first, &second] {
        assert!(scan.samples()[0].sync);
        assert!(scan.iter().skip(1).all(|s| !s.sync));
    }
    assert_eq!(first.distance(0).unwrap(), 300);
    assert_eq!(second.distance(0).unwrap(), 600);
}

#[test]
fn start_and_stop_are_idempotent() {
    let (port, mut device) = scripted("idempotent");

    device.start_scanning().expect("first start");
    device.start_scanning().expect("second start");
    assert_eq!(count(&port, Mnemonic::StartScan), 1);
    assert!(device.is_scanning());

    device.stop_scanning().expect("first stop");
    device.stop_scanning().expect("second stop");
    assert_eq!(count(&port, Mnemonic::StopScan), 1);
    assert!(!device.is_scanning());
    assert!(!port.is_scanning());
}

#[test]
fn corrupt_sample_costs_one_error() {
    let (port, mut device) = scripted("corrupt");

    let mut buf = BytesMut::new();
    for (i, distance) in [100u16, 200, 300, 400, 500].into_iter().enumerate() {
        let len = if i == 4 { 1 } else { 10 };
        for packet in revolution(distance, len) {
            encode_sample(&packet, &mut buf);
        }
    }
    // Flip one distance bit in the fifth sample of the second revolution.
    buf[(10 + 4) * SAMPLE_FRAME_LEN + 3] ^= 0x10;
    port.queue_bytes(&buf);

    device.start_scanning().expect("scanning should start");
    let mut scans = Vec::new();
    let mut corrupt = 0;
    while scans.len() < 3 {
        match device.get_scan() {
            Ok(scan) => scans.push(scan),
            Err(err) if err.kind() == ErrorKind::CorruptFrame => corrupt += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_eq!(corrupt, 1);
    let starts: Vec<i32> = scans.iter().map(|s| s.distance(0).unwrap()).collect();
    assert_eq!(starts, vec![100, 300, 400]);
    assert!(scans.iter().all(|s| s.len() == 10));
}

#[test]
fn get_scan_requires_scanning_and_reads_nothing() {
    let (port, mut device) = scripted("not-scanning");
    let before = port.reads();

    let err = device.get_scan().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotScanning);
    assert_eq!(port.reads(), before);
}

#[test]
fn timeout_keeps_partial_scan() {
    let (port, mut device) = scripted("timeout");
    port.queue_samples(revolution(100, 4));
    device.start_scanning().expect("scanning should start");

    let err = device.get_scan().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_recoverable());

    let mut rest: Vec<SamplePacket> = revolution(100, 6).split_off(4);
    rest.push(SamplePacket::new(0, 900, 1, true));
    port.queue_samples(rest);

    let scan = device.get_scan().expect("scan should resume");
    assert_eq!(scan.len(), 6);
}

#[test]
fn device_fault_on_start() {
    let (port, mut device) = scripted("start-fault");
    port.force_status(Mnemonic::StartScan, 12);

    let err = device.start_scanning().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceFault);
    assert!(!device.is_scanning());
}

#[test]
fn stop_discards_in_flight_samples() {
    let port = SimulatedPort::new("in-flight");
    let mut device = port
        .connect(DeviceConfig::default())
        .expect("device should open");

    device.start_scanning().expect("scanning should start");
    let scan = device.get_scan().expect("generated scan");
    assert_eq!(scan.len(), port.samples_per_revolution());

    device.stop_scanning().expect("stop should find its acknowledgement");
    assert_eq!(device.motor_speed().expect("speed query after stop"), 5);
}

#[test]
fn reset_clears_state_and_cache() {
    let (port, mut device) = scripted("reset");
    device.set_motor_speed(8).expect("speed should be accepted");
    device.start_scanning().expect("scanning should start");

    device.reset().expect("reset should be sent");
    assert!(!device.is_scanning());

    port.clear_commands();
    assert_eq!(device.motor_speed().expect("speed after reset"), 5);
    assert_eq!(count(&port, Mnemonic::MotorInfo), 1);
}

#[test]
fn destruct_releases_port_for_reopen() {
    let port = SimulatedPort::new("reopen");

    let device = port.connect(DeviceConfig::default()).expect("first open");
    let err = port.connect(DeviceConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceUnreachable);

    device.close();
    let again = port.connect(DeviceConfig::default());
    assert!(again.is_ok());
}

#[test]
fn drop_while_scanning_stops_device() {
    let port = SimulatedPort::new("drop-scanning");
    {
        let mut device = port.connect(DeviceConfig::default()).expect("device");
        device.start_scanning().expect("scanning should start");
        assert!(port.is_scanning());
    }
    assert!(!port.is_scanning());
    assert!(!port.is_open());
}

#[test]
fn missing_serial_port_is_unreachable() {
    let err = Device::open("/dev/sweep-missing-port", DeviceConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceUnreachable);
}

#[test]
fn version_info_reports_firmware() {
    let (_port, mut device) = scripted("version");
    let info = device.version_info().expect("version query");
    assert_eq!(info.model, "SWEEP");
    assert_eq!(info.protocol_major, 1);
    assert_eq!(info.firmware_version(), "1.7");
}

#[test]
fn lost_stop_command_times_out_while_samples_stream() {
    let port = SimulatedPort::new("lost-stop");
    let config = DeviceConfig::default()
        .with_timeout(Duration::from_millis(10))
        .with_response_timeout(Duration::from_millis(200));
    let mut device = port.connect(config).expect("device should open");
    device.start_scanning().expect("scanning should start");

    port.lose_next(Mnemonic::StopScan);
    let started = Instant::now();
    let err = device.stop_scanning().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(device.is_scanning());
    assert!(port.is_scanning());

    device.stop_scanning().expect("retry should reach the device");
    assert!(!port.is_scanning());
}

#[test]
fn lost_query_times_out() {
    let (port, mut device) = scripted("lost-query");
    port.lose_next(Mnemonic::MotorInfo);

    let err = device.motor_speed().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(device.motor_speed().expect("second query is answered"), 5);
}

#[test]
fn silent_version_handshake_is_protocol_mismatch() {
    let port = SimulatedPort::new("silent-iv");
    port.lose_next(Mnemonic::VersionInfo);

    let err = port.connect(DeviceConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolMismatch);
    assert!(err.to_string().contains("timed out"));
    assert!(!port.is_open());
}

#[test]
fn garbled_version_reply_is_protocol_mismatch() {
    let port = SimulatedPort::with_config(
        "garbled-iv",
        SimConfig {
            firmware: *b"1x",
            ..SimConfig::default()
        },
    );

    let err = port.connect(DeviceConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolMismatch);
}

#[test]
fn cached_settings_unavailable_while_scanning() {
    let (_port, mut device) = scripted("cached-while-scanning");
    assert_eq!(device.motor_speed().expect("idle speed query"), 5);
    assert_eq!(device.sample_rate().expect("idle rate query"), 500);

    device.start_scanning().expect("scanning should start");
    assert_eq!(device.motor_speed().unwrap_err().kind(), ErrorKind::ScanningActive);
    assert_eq!(device.sample_rate().unwrap_err().kind(), ErrorKind::ScanningActive);

    device.stop_scanning().expect("scanning should stop");
    assert_eq!(device.motor_speed().expect("speed after stop"), 5);
}
