//! End-to-end runs against a live echo responder on localhost.
//!
//! Windows are one second long so each test finishes in a few seconds.

use std::net::SocketAddr;
use std::time::Duration;

use netprobe::echo::EchoServer;
use netprobe::{agent, Settings};
use netprobe_engine::{AggregateRecord, Output, ProbeConfig, Prober, TransportKind};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

const RATE_HZ: f64 = 20.0;

fn fast_config() -> ProbeConfig {
    ProbeConfig::builder()
        .rate_hz(RATE_HZ)
        .window(Duration::from_secs(1))
        .grace(Duration::from_millis(200))
        .timeout(Duration::from_millis(200))
        .sweep_interval(Duration::from_millis(50))
        .build()
        .unwrap()
}

async fn echo_server(kind: TransportKind) -> SocketAddr {
    let server = EchoServer::bind(kind, "127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

/// UDP reflector that silently drops every tenth datagram.
async fn lossy_reflector() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        let mut count = 0u64;
        while let Ok((len, from)) = socket.recv_from(&mut buf).await {
            count += 1;
            if count % 10 == 0 {
                continue;
            }
            let _ = socket.send_to(&buf[..len], from).await;
        }
    });
    addr
}

async fn next_record(rx: &mut mpsc::Receiver<AggregateRecord>) -> AggregateRecord {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no record within 5s")
        .expect("record channel closed")
}

/// Probe `target` and collect the first `count` emitted records.
async fn collect(target: SocketAddr, kind: TransportKind, count: usize) -> Vec<AggregateRecord> {
    let (output, mut rx) = Output::channel(16);
    let handle = Prober::builder("e2e-agent", target.to_string())
        .config(fast_config())
        .transport(kind)
        .output(output)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(next_record(&mut rx).await);
    }
    handle.stop().await;
    records
}

fn assert_consecutive(records: &[AggregateRecord]) {
    for pair in records.windows(2) {
        assert_eq!((pair[1].time - pair[0].time).num_milliseconds(), 1000);
    }
}

fn assert_rate(record: &AggregateRecord) {
    // 20 Hz over a one-second window, allowing for timer edges
    assert!(
        (15..=25).contains(&record.sent),
        "unexpected probe count {}",
        record.sent
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn udp_lossless_windows() {
    let target = echo_server(TransportKind::Udp).await;
    let records = collect(target, TransportKind::Udp, 2).await;

    assert_consecutive(&records);
    for record in &records {
        assert_eq!(record.agent_id, "e2e-agent");
        assert_rate(record);
        assert_eq!(record.received, record.sent);
        assert_eq!(record.lost, 0);
        assert!(record.latency_min_ms > 0.0);
        assert!(record.latency_min_ms <= record.latency_avg_ms);
        assert!(record.latency_avg_ms <= record.latency_max_ms);
        assert!(record.latency_max_ms < 200.0);
        assert!(record.jitter_min_ms <= record.jitter_max_ms);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn udp_every_tenth_echo_dropped() {
    let target = lossy_reflector().await;
    let records = collect(target, TransportKind::Udp, 3).await;

    let sent: u64 = records.iter().map(|r| r.sent).sum();
    let lost: u64 = records.iter().map(|r| r.lost).sum();

    for record in &records {
        assert_eq!(record.lost, record.sent - record.received);
    }
    // One in ten, give or take the window edges
    let expected = sent / 10;
    assert!(
        lost + 1 >= expected && lost <= expected + 1,
        "lost {lost} of {sent}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_lossless_windows() {
    let target = echo_server(TransportKind::Tcp).await;
    let records = collect(target, TransportKind::Tcp, 2).await;

    assert_consecutive(&records);
    for record in &records {
        assert_rate(record);
        assert_eq!(record.lost, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn agent_writes_records_to_file() {
    let target = echo_server(TransportKind::Udp).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.jsonl");

    let mut settings = Settings::default();
    settings.probe.target = target.to_string();
    settings.probe.rate_hz = RATE_HZ;
    settings.probe.window_secs = 1;
    settings.probe.grace_secs = 0.2;
    settings.probe.timeout_secs = 0.2;
    settings.agent.state_dir = Some(dir.path().join("state"));
    settings.output.stdout = false;
    settings.output.file = Some(path.clone());

    let handle = assert_ok!(agent::start(&settings).await);

    let mut contents = String::new();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        contents = std::fs::read_to_string(&path).unwrap_or_default();
        if !contents.is_empty() {
            break;
        }
    }
    handle.stop().await;

    let first = contents.lines().next().expect("no record written");
    let record: AggregateRecord = assert_ok!(serde_json::from_str(first));

    let agent_id = std::fs::read_to_string(dir.path().join("state").join("id")).unwrap();
    assert_eq!(record.agent_id, agent_id.trim());
    assert!(record.time_label().ends_with('Z'));
    assert_eq!(record.lost, record.sent - record.received);
}
