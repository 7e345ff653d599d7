//! Integration tests for the TCP connection manager
//!
//! Each test binds a manager on an ephemeral port and drives it with plain
//! blocking sockets acting as sensor nodes.

mod common;

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sensorgate_connectors::manager::send_readings;
use sensorgate_connectors::wire::encode;
use sensorgate_core::Consumer;

use common::{readings, wait_until, RunningManager};

const LONG: Duration = Duration::from_secs(30);

#[test]
fn readings_reach_both_consumers_in_order() {
    let manager = RunningManager::start(LONG);
    let sent = readings(15, 5);
    let _client = send_readings(manager.addr, &sent).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        manager.pipeline.buffer().unread_count_for(Consumer::Store) == 5
    }));
    assert_eq!(manager.drain(Consumer::Aggregator), sent);
    assert_eq!(manager.drain(Consumer::Store), sent);

    let stats = manager.stop();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.records, 5);
    assert_eq!(stats.bytes_received, 5 * 18);
    assert_eq!(stats.closed_at_shutdown, 1);
}

#[test]
fn several_sensors_are_multiplexed() {
    let manager = RunningManager::start(LONG);
    let clients: Vec<TcpStream> = (1..=4)
        .map(|id| send_readings(manager.addr, &readings(id, 3)).unwrap())
        .collect();

    assert!(wait_until(Duration::from_secs(5), || {
        manager.pipeline.buffer().unread_count_for(Consumer::Aggregator) == 12
    }));

    // Per sensor, arrival order is preserved
    let received = manager.drain(Consumer::Aggregator);
    for id in 1..=4u16 {
        let own: Vec<_> = received.iter().filter(|r| r.sensor_id == id).copied().collect();
        assert_eq!(own, readings(id, 3));
    }

    drop(clients);
    let stats = manager.stop();
    assert_eq!(stats.accepted, 4);
    assert_eq!(stats.peak_connections, 4);
}

#[test]
fn manager_exits_when_no_sensor_connects() {
    let timeout = Duration::from_millis(200);
    let start = Instant::now();
    let manager = RunningManager::start(timeout);
    let pipeline = manager.pipeline.clone();

    let stats = manager.join();
    assert!(start.elapsed() >= timeout);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(stats.accepted, 0);
    assert!(pipeline.is_shutdown());
}

#[test]
fn silent_connection_is_closed_after_timeout() {
    let timeout = Duration::from_millis(300);
    let manager = RunningManager::start(timeout);
    let mut client = send_readings(manager.addr, &readings(7, 1)).unwrap();
    let sent_at = Instant::now();

    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut byte = [0u8; 1];
    let closed = matches!(client.read(&mut byte), Ok(0) | Err(_));
    assert!(closed);
    assert!(sent_at.elapsed() >= timeout - Duration::from_millis(50));

    // The listener is alone afterwards and stops after one more window
    let stats = manager.join();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.closed_at_shutdown, 0);
}

#[test]
fn active_connection_outlives_timeout() {
    let timeout = Duration::from_millis(300);
    let manager = RunningManager::start(timeout);
    let mut client = TcpStream::connect(manager.addr).unwrap();

    let sent = readings(21, 10);
    for reading in &sent {
        client.write_all(&encode(reading)).unwrap();
        thread::sleep(Duration::from_millis(100));
    }

    assert!(wait_until(Duration::from_secs(5), || {
        manager.pipeline.buffer().unread_count_for(Consumer::Store) == sent.len()
    }));
    drop(client);

    let stats = manager.join();
    assert_eq!(stats.records, 10);
    assert_eq!(stats.timed_out, 1);
}

#[test]
fn trailing_partial_record_is_dropped() {
    let manager = RunningManager::start(LONG);
    let mut client = send_readings(manager.addr, &readings(3, 2)).unwrap();
    client.write_all(&[1, 2, 3, 4, 5]).unwrap();
    client.shutdown(Shutdown::Write).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        manager.pipeline.buffer().unread_count_for(Consumer::Aggregator) == 2
    }));
    thread::sleep(Duration::from_millis(100));

    let stats = manager.stop();
    assert_eq!(stats.records, 2);
    assert_eq!(stats.partial_dropped, 1);
}

#[test]
fn shutdown_interrupts_readiness_wait() {
    let manager = RunningManager::start(LONG);
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    let stats = manager.stop();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(stats, Default::default());
}

#[test]
fn capture_file_mirrors_received_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensor_data_recv");
    let manager = RunningManager::start_with_capture(LONG, Some(path.clone()));

    let sent = vec![
        sensorgate_core::Reading::new(7, 21.5, 100),
        sensorgate_core::Reading::new(8, 19.25, 101),
    ];
    let _client = send_readings(manager.addr, &sent).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        manager.pipeline.buffer().unread_count_for(Consumer::Store) == 2
    }));
    manager.stop();

    let captured = std::fs::read_to_string(&path).unwrap();
    assert_eq!(captured, "7 21.5 100\n8 19.25 101\n");
}

#[test]
fn bind_failure_is_reported() {
    let first = RunningManager::start(LONG);
    let taken = first.addr;
    let err = sensorgate_connectors::ConnectionManager::bind(
        taken,
        sensorgate_core::Pipeline::new(),
        sensorgate_connectors::ManagerConfig {
            idle_timeout: LONG,
            capture_path: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, sensorgate_connectors::ConnectorError::Bind { .. }));
    first.stop();
}

#[test]
fn streaming_sensor_does_not_starve_the_others() {
    let manager = RunningManager::start(LONG);
    let stop = Arc::new(AtomicBool::new(false));

    let batch: Vec<u8> = readings(1, 512).iter().flat_map(encode).collect();
    let streamers: Vec<_> = (0..2)
        .map(|_| {
            let mut stream = TcpStream::connect(manager.addr).unwrap();
            let stop = Arc::clone(&stop);
            let batch = batch.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    if stream.write_all(&batch).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();

    // Let the streams saturate the manager before the quiet sensor speaks
    assert!(wait_until(Duration::from_secs(5), || {
        manager.pipeline.buffer().unread_count_for(Consumer::Store) > 0
    }));
    let _quiet = send_readings(manager.addr, &readings(2, 1)).unwrap();

    let mut seen = false;
    let delivered = wait_until(Duration::from_secs(5), || {
        seen |= manager
            .drain(Consumer::Aggregator)
            .iter()
            .any(|reading| reading.sensor_id == 2);
        manager.drain(Consumer::Store);
        seen
    });
    assert!(delivered, "quiet sensor starved by streaming sensors");

    // The loop still reaches its shutdown check while the streams run
    let stopping = Instant::now();
    let stats = manager.stop();
    assert!(stopping.elapsed() < Duration::from_secs(5));
    assert!(stats.records > 1);

    stop.store(true, Ordering::Relaxed);
    for streamer in streamers {
        streamer.join().unwrap();
    }
}
