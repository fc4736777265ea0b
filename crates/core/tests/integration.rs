//! Integration tests: the service sending real UMD traffic over loopback.
//!
//! Each test starts a receiver (UDP socket or TCP listener) on an
//! ephemeral port, points a [`Service`] at it and checks the bytes that
//! arrive.

use std::io::{Read, Write};
use std::net::{TcpListener, UdpSocket};
use std::thread;
use std::time::Duration;

use tally::{Config, ConnectionState, ServerConfig, Service, TallySource, TransportKind};

const INTERVAL: Duration = Duration::from_millis(20);

fn cams() -> Vec<TallySource> {
    vec![TallySource::new(1, "CAM1"), TallySource::new(2, "CAM2")]
}

fn expected(address: u8, tally: u8, label: &[u8]) -> [u8; 18] {
    let mut buf = [0u8; 18];
    buf[0] = 0x80 + address;
    buf[1] = tally;
    buf[2..2 + label.len()].copy_from_slice(label);
    buf
}

#[test]
fn udp_sweep_reaches_receiver_in_order() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let port = receiver.local_addr().unwrap().port();

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        transport: TransportKind::Udp,
    };
    let mut service = Service::new(config, cams(), INTERVAL);
    service.start().expect("service start");

    let mut datagrams = Vec::new();
    let mut buf = [0u8; 64];
    while datagrams.len() < 5 {
        let (n, _) = receiver.recv_from(&mut buf).expect("datagram");
        datagrams.push(buf[..n].to_vec());
    }
    service.stop();

    assert!(datagrams.iter().all(|d| d.len() == 18));
    assert_eq!(datagrams[0], expected(1, 0x31, b"CAM1"));
    assert_eq!(datagrams[1], expected(1, 0x32, b"CAM1"));
    assert_eq!(datagrams[2], expected(1, 0x34, b"CAM1"));
    assert_eq!(datagrams[3], expected(1, 0x38, b"CAM1"));
    assert_eq!(datagrams[4], expected(2, 0x31, b"CAM2"));

    for source in service.sources() {
        assert!(source.tally().lit() <= 1);
    }
}

#[test]
fn tcp_sends_after_connect_and_closes_gracefully() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        transport: TransportKind::Tcp,
    };
    let mut service = Service::new(config, cams(), INTERVAL);
    service.start().expect("service start");

    let (mut peer, _) = listener.accept().expect("accept");
    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut first = [0u8; 18];
    peer.read_exact(&mut first).expect("first message");
    assert_eq!(first[0], 0x81);
    assert_eq!(first[1] & 0xF0, 0x30);
    assert_eq!((first[1] & 0x0F).count_ones(), 1);
    assert_eq!(&first[2..6], b"CAM1");

    service.stop();
    assert_eq!(service.connection_state(), None);

    let mut rest = Vec::new();
    peer.read_to_end(&mut rest).expect("stream ends with FIN");
    assert_eq!(rest.len() % 18, 0);
}

#[test]
fn tcp_without_receiver_keeps_ticking() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        transport: TransportKind::Tcp,
    };
    let mut service = Service::new(config, cams(), INTERVAL);
    service.start().expect("service start");
    thread::sleep(INTERVAL * 10);

    assert!(service.is_running());
    assert_eq!(service.connection_state(), Some(ConnectionState::Failed));
    // Ticks ran even though nothing was delivered.
    assert!(service.sources().iter().any(|s| s.tally().lit() == 1));
    service.stop();
}

#[test]
fn config_file_drives_service() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let port = receiver.local_addr().unwrap().port();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "server_config": {{ "ip": "127.0.0.1", "port": "{port}", "transport": "udp" }},
            "send_interval_ms": 10,
            "addresses": [ {{ "address": 7, "label": "STUDIO B", "tally1": 0 }} ]
        }}"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.sources.len(), 1);

    let mut service = Service::from_config(config);
    service.start().unwrap();
    let mut buf = [0u8; 64];
    let (n, _) = receiver.recv_from(&mut buf).unwrap();
    service.stop();

    assert_eq!(&buf[..n], &expected(7, 0x31, b"STUDIO B"));
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_or_default(dir.path().join("config.json"));
    assert_eq!(config, Config::default());

    let err = Config::load(dir.path().join("config.json")).unwrap_err();
    assert!(err.to_string().contains("file not found"));
}

#[test]
fn empty_source_list_runs_without_sending() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_millis(150)))
        .unwrap();
    let port = receiver.local_addr().unwrap().port();

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port,
        transport: TransportKind::Udp,
    };
    let mut service = Service::new(config, Vec::new(), INTERVAL);
    service.start().unwrap();

    let mut buf = [0u8; 64];
    assert!(receiver.recv_from(&mut buf).is_err());
    assert!(service.is_running());
    service.stop();
}
