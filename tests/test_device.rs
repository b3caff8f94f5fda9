use tickhttp::config::{ConfigError, SensorConfig};
use tickhttp::device::{
    self, DeviceKind, Display, LogDisplay, Reading, RemoteSensor, Sensor, Style,
};
use tickhttp::transport::memory::{MemoryNetwork, MemoryPeer};

const SAMPLE: Reading = Reading {
    humidity: 45.5,
    temperature: 21.5,
    pressure: 1013.0,
};

#[test]
fn test_reading_line_format() {
    assert_eq!(
        SAMPLE.to_line(1_700_000_000),
        "      1700000000  45.500  21.500 1013.000\r\n"
    );
}

#[test]
fn test_reading_parse_line() {
    let (ts, reading) = Reading::parse_line(&SAMPLE.to_line(42)).unwrap();
    assert_eq!(ts, 42);
    assert_eq!(reading, SAMPLE);

    let (_, negative) = Reading::parse_line("1 10.000 -3.250 990.500").unwrap();
    assert_eq!(negative.temperature, -3.25);
}

#[test]
fn test_reading_parse_line_rejects() {
    for line in [
        "",
        "1 2.0 3.0",
        "1 2.0 3.0 4.0 5.0",
        "x 2.0 3.0 4.0",
        "1 2 3.0 4.0",
        "1 1e3 3.0 4.0",
        "1 nan 3.0 4.0",
        "1 .5 3.0 4.0",
        "<html>not found</html>",
    ] {
        assert!(Reading::parse_line(line).is_none(), "line {line:?}");
    }
}

#[test]
fn test_device_kind_parse() {
    assert_eq!("http".parse::<DeviceKind>().unwrap(), DeviceKind::Http);
    assert_eq!(" BME280 ".parse::<DeviceKind>().unwrap(), DeviceKind::Bme280);
    assert_eq!("Hd44780".parse::<DeviceKind>().unwrap(), DeviceKind::Hd44780);
    assert!(matches!(
        "dht22".parse::<DeviceKind>(),
        Err(ConfigError::UnknownDevice(_))
    ));

    assert_eq!(DeviceKind::Sht30.to_string(), "sht30");
    assert!(DeviceKind::Http.is_sensor() && !DeviceKind::Http.is_display());
    assert!(DeviceKind::Log.is_display() && !DeviceKind::Log.needs_i2c());
    assert!(DeviceKind::Hd44780.needs_i2c());
}

#[test]
fn test_build_devices() {
    assert!(device::build_display(DeviceKind::Log).is_ok());

    match device::build_display(DeviceKind::Hd44780) {
        Err(ConfigError::Invalid { reason, .. }) => assert!(reason.contains("I2C")),
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("hd44780 has no backend here"),
    }

    let cfg = SensorConfig {
        name: "S1".to_string(),
        kind: DeviceKind::Sht30,
        host: String::new(),
        port: 80,
        path: "/".to_string(),
        interval_s: 1,
    };
    assert!(device::build_sensor(&cfg).is_err());
}

#[test]
fn test_fill_web_style() {
    let out = device::fill(
        "%TS%|%S1_HUMI%|%S1_TEMP%|%S1_PRES%|%S2_TEMP%",
        5,
        &[("S1", SAMPLE)],
        Style::Web,
    );

    assert_eq!(out, "               5| 45.500| 21.500|1013.000|%S2_TEMP%");
}

#[test]
fn test_fill_display_style() {
    let out = device::fill(
        "%S1_TEMP% %S1_HUMI% %S1_PRES% / %S2_TEMP%",
        0,
        &[("S1", SAMPLE), ("S2", Reading::ZERO)],
        Style::Display,
    );

    assert_eq!(out, " 21.5C  45.5% 1013.0hPa /   0.0C");
}

#[test]
fn test_log_display_lines() {
    let mut display = LogDisplay::default();

    display.show("second", 2);
    assert_eq!(display.lines(), ["", "second"]);

    display.show("first", 1);
    display.show("SECOND", 2);
    assert_eq!(display.lines(), ["first", "SECOND"]);

    display.clear();
    assert!(display.lines().is_empty());
}

fn remote(net: &MemoryNetwork) -> (RemoteSensor<MemoryNetwork>, MemoryPeer) {
    let sensor = RemoteSensor::new(net.clone(), "127.0.0.1", "/sensor", 8080).unwrap();
    let peer = net.last_dial().unwrap();
    (sensor, peer)
}

fn reply(peer: &MemoryPeer, status: &str, body: &str) {
    peer.send(format!("HTTP/1.0 {status}\r\n\r\n{body}"));
    peer.close();
}

#[test]
fn test_remote_sensor_reading() {
    let net = MemoryNetwork::new();
    let (mut sensor, peer) = remote(&net);

    assert_eq!(sensor.get(), None);
    assert_eq!(peer.received_string(), "GET /sensor HTTP/1.0\r\n\r\n");

    reply(&peer, "200 OK", &SAMPLE.to_line(99));
    assert_eq!(sensor.get(), Some(SAMPLE));

    // the client is rearmed for the next read
    assert_eq!(sensor.client().state(), tickhttp::client::RequestState::Init);
    assert!(net.last_dial().is_some());
}

#[test]
fn test_remote_sensor_bad_responses_read_zero() {
    let net = MemoryNetwork::new();

    let (mut sensor, peer) = remote(&net);
    reply(&peer, "404 Not Found", "404 Not Found");
    assert_eq!(sensor.get(), Some(Reading::ZERO));

    let (mut sensor, peer) = remote(&net);
    reply(&peer, "200 OK", "garbage");
    assert_eq!(sensor.get(), Some(Reading::ZERO));

    let (mut sensor, peer) = remote(&net);
    peer.close();
    assert_eq!(sensor.get(), Some(Reading::ZERO));
    assert_eq!(sensor.client().state(), tickhttp::client::RequestState::Init);
}

#[test]
fn test_remote_sensor_serves_another_node() {
    use tickhttp::config::ServerConfig;
    use tickhttp::server::Server;

    let net = MemoryNetwork::new();
    let mut node = Server::new(
        net.clone(),
        ServerConfig {
            port: 8080,
            ..Default::default()
        },
    );
    node.start().unwrap();
    node.set_route("/sensor", SAMPLE.to_line(7));

    let (mut sensor, client_end) = remote(&net);
    assert_eq!(sensor.get(), None);

    // relay the request bytes to the serving node and its answer back
    let server_end = net.connect(8080).unwrap();
    server_end.send(client_end.received());
    node.serve(0);
    client_end.send(server_end.received());
    client_end.close();

    assert_eq!(sensor.get(), Some(SAMPLE));
}
