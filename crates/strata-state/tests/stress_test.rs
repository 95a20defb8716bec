//! Concurrency stress for the two-tier locking discipline
//!
//! Run with: cargo test --package strata-state --test stress_test

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use strata_state::host_component::HostComponentState;
use strata_state::prelude::*;

fn cluster_with_two_datanodes() -> (Arc<Cluster>, Arc<ServiceComponentHost>, Arc<ServiceComponentHost>) {
    let clusters = Clusters::new(Arc::new(InMemoryPersistence::new()));
    let cluster = clusters.add_cluster("stress", "HDP-2.2".parse().unwrap()).unwrap();
    for host in ["h1", "h2"] {
        clusters.add_host(host).unwrap();
        clusters.map_host_to_cluster(host, "stress").unwrap();
    }
    cluster.add_service("HDFS").unwrap();
    cluster.add_component("HDFS", "DATANODE", ComponentCategory::Slave).unwrap();
    let a = cluster.add_host_component("HDFS", "DATANODE", "h1").unwrap();
    let b = cluster.add_host_component("HDFS", "DATANODE", "h2").unwrap();
    for sch in [&a, &b] {
        sch.handle_event(SchEvent::Install).unwrap();
        sch.handle_event(SchEvent::OpSucceeded).unwrap();
    }
    (cluster, a, b)
}

#[test]
fn stress_concurrent_writers_on_sibling_host_components() {
    let (cluster, a, b) = cluster_with_two_datanodes();
    let iterations = 2_000;
    let barrier = Arc::new(Barrier::new(3));
    let start = Instant::now();

    let writers: Vec<_> = [a.clone(), b.clone()]
        .into_iter()
        .map(|sch| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..iterations {
                    assert_eq!(sch.handle_event(SchEvent::Start).unwrap(), State::Starting);
                    assert_eq!(sch.handle_event(SchEvent::Started).unwrap(), State::Started);
                    assert_eq!(sch.handle_event(SchEvent::Stop).unwrap(), State::Stopping);
                    assert_eq!(sch.handle_event(SchEvent::Stopped).unwrap(), State::Installed);
                }
            })
        })
        .collect();

    // topology reader/writer running alongside the field writers
    let topology = {
        let cluster = cluster.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            for i in 0..200 {
                let name = format!("SVC_{i}");
                cluster.add_service(&name).unwrap();
                assert_eq!(cluster.host_components_for_host("h1").len(), 1);
                cluster.delete_service(&name).unwrap();
            }
        })
    };

    for handle in writers {
        handle.join().unwrap();
    }
    topology.join().unwrap();

    assert_eq!(a.state(), State::Installed);
    assert_eq!(b.state(), State::Installed);
    assert_eq!(cluster.services().len(), 1);
    assert!(
        start.elapsed() < Duration::from_secs(30),
        "stress test too slow: {:.2}s",
        start.elapsed().as_secs_f64()
    );
}

#[test]
fn stress_concurrent_first_persist_allows_one_winner() {
    let (cluster, _, _) = cluster_with_two_datanodes();
    cluster.add_component("HDFS", "JOURNALNODE", ComponentCategory::Slave).unwrap();

    let attempts = 8;
    let barrier = Arc::new(Barrier::new(attempts));
    let handles: Vec<_> = (0..attempts)
        .map(|_| {
            let cluster = cluster.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let sch = cluster.new_host_component("HDFS", "JOURNALNODE", "h1").unwrap();
                barrier.wait();
                cluster.persist_host_component(&sch).is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(cluster.host_components("HDFS", "JOURNALNODE").unwrap().len(), 1);
}

fn tagged(tag: &str) -> BTreeMap<String, HostConfig> {
    ["core-site", "hdfs-site"]
        .into_iter()
        .map(|config_type| (config_type.to_string(), HostConfig::with_default_tag(tag)))
        .collect()
}

/// A snapshot must reflect whole mutations only
fn assert_consistent(s: &HostComponentState) {
    match s.state {
        State::Starting | State::Stopping => {
            assert!(s.last_op_start.is_some(), "operation without a start: {s:?}");
            assert!(s.last_op_end.is_none(), "running operation already ended: {s:?}");
        }
        State::Installed | State::Started => {
            assert!(s.last_op_end.is_some(), "settled state without an end: {s:?}");
        }
        other => panic!("unexpected state {other}: {s:?}"),
    }
    let tags: BTreeSet<_> = s.actual_configs.values().filter_map(|c| c.default_tag.as_deref()).collect();
    assert!(s.actual_configs.is_empty() || s.actual_configs.len() == 2, "partial configs: {s:?}");
    assert!(tags.len() <= 1, "configs from two writes: {s:?}");
    assert_eq!(s.stack_id.as_ref(), Some(&s.desired_stack_id));
}

#[test]
fn stress_mixed_writers_and_readers_on_one_host_component() {
    let (_cluster, sch, _) = cluster_with_two_datanodes();
    let iterations = 1_000;
    let lifecycle_threads = 2;
    let config_threads = 2;
    let readers = 2;
    let barrier = Arc::new(Barrier::new(lifecycle_threads + config_threads + readers + 1));
    let done = Arc::new(AtomicBool::new(false));
    let transitions = Arc::new(AtomicUsize::new(0));

    let mut writers = Vec::new();
    for _ in 0..lifecycle_threads {
        let (sch, barrier, transitions) = (sch.clone(), barrier.clone(), transitions.clone());
        writers.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..iterations {
                for event in [SchEvent::Start, SchEvent::Started, SchEvent::Stop, SchEvent::Stopped] {
                    // the other lifecycle thread may have moved the state on
                    match sch.handle_event(event) {
                        Ok(_) => {
                            transitions.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => assert!(matches!(err, StateError::InvalidStateTransition { .. }), "{err}"),
                    }
                }
            }
        }));
    }
    for writer in 0..config_threads {
        let (sch, barrier) = (sch.clone(), barrier.clone());
        writers.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..iterations {
                sch.update_actual_configs(tagged(&format!("w{writer}-{i}"))).unwrap();
            }
        }));
    }
    {
        let (sch, barrier) = (sch.clone(), barrier.clone());
        writers.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..iterations {
                let desired = if i % 2 == 0 { State::Started } else { State::Installed };
                sch.set_desired_state(desired).unwrap();
            }
        }));
    }

    let readers: Vec<_> = (0..readers)
        .map(|_| {
            let (sch, barrier, done) = (sch.clone(), barrier.clone(), done.clone());
            thread::spawn(move || {
                barrier.wait();
                let mut seen = 0_usize;
                loop {
                    assert_consistent(&sch.snapshot());
                    seen += 1;
                    if done.load(Ordering::Acquire) {
                        break seen;
                    }
                }
            })
        })
        .collect();

    for handle in writers {
        handle.join().unwrap();
    }
    done.store(true, Ordering::Release);
    for handle in readers {
        assert!(handle.join().unwrap() > 0);
    }

    let last = sch.snapshot();
    assert_consistent(&last);
    assert!(transitions.load(Ordering::Relaxed) > 0);
    assert_eq!(last.desired_state, State::Installed);
    let tag = last.actual_configs["core-site"].default_tag.clone().unwrap();
    let finals: Vec<String> = (0..config_threads).map(|w| format!("w{w}-{}", iterations - 1)).collect();
    assert!(finals.contains(&tag), "last write lost: {tag}");

    // a single writer sees its own final write
    sch.update_actual_configs(tagged("final")).unwrap();
    assert_eq!(sch.snapshot().actual_configs, tagged("final"));
}
