//! Dispatch benchmark suite.
//!
//! Benchmarks frame handling through a running server on loopback:
//! - Echo round trip for a single client
//! - Device data fan-out to 1, 8 and 32 attached clients
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use serial_bridge::{MockBackend, RunningServer, SerialServer};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Clients = Arc<Mutex<Vec<Client>>>;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const CLIENT_COUNTS: &[usize] = &[1, 8, 32];

const PAYLOAD: &[u8] = b"sensor=512\r\n";

// ============================================================================
// Benchmark: Echo
// ============================================================================

fn bench_echo(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let (server, clients) = rt.block_on(setup(1, &MockBackend::new()));
    let frame = json!({ "method": "echo", "data": "ping" }).to_string();

    c.bench_function("echo_round_trip", |b| {
        b.to_async(&rt).iter(|| {
            let clients = Arc::clone(&clients);
            let frame = frame.clone();
            async move {
                let mut clients = clients.lock().await;
                let client = &mut clients[0];
                client
                    .send(Message::Text(frame.into()))
                    .await
                    .expect("send");
                next_text(client).await;
            }
        });
    });

    rt.block_on(server.stop());
}

// ============================================================================
// Benchmark: Broadcast
// ============================================================================

fn bench_broadcast(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("broadcast");
    group.measurement_time(Duration::from_secs(10));

    for &count in CLIENT_COUNTS {
        let backend = MockBackend::new();
        let (server, clients) = rt.block_on(setup(count, &backend));
        let device = Arc::new(Mutex::new(backend.take_device("BENCH").expect("device")));

        group.bench_with_input(BenchmarkId::new("clients", count), &count, |b, _| {
            b.to_async(&rt).iter(|| {
                let device = Arc::clone(&device);
                let clients = Arc::clone(&clients);
                async move {
                    device.lock().await.emit(PAYLOAD).await.expect("emit");
                    for client in clients.lock().await.iter_mut() {
                        next_text(client).await;
                    }
                }
            });
        });

        rt.block_on(server.stop());
    }

    group.finish();
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Starts a server and connects `count` clients, all attached to `BENCH`.
async fn setup(count: usize, backend: &MockBackend) -> (RunningServer, Clients) {
    let server = SerialServer::builder()
        .backend(backend.clone())
        .port(0)
        .build()
        .expect("config")
        .start()
        .await
        .expect("start");

    let open = json!({ "method": "openserial", "data": { "serialport": "BENCH" } }).to_string();

    let mut clients = Vec::with_capacity(count);
    for _ in 0..count {
        let (mut ws, _) = connect_async(server.ws_url()).await.expect("connect");
        ws.send(Message::Text(open.clone().into()))
            .await
            .expect("open");
        next_text(&mut ws).await;
        clients.push(ws);
    }

    (server, Arc::new(Mutex::new(clients)))
}

async fn next_text(client: &mut Client) {
    while let Some(message) = client.next().await {
        if matches!(message.expect("message"), Message::Text(_)) {
            return;
        }
    }
    panic!("connection closed");
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_echo, bench_broadcast);
criterion_main!(benches);
