// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::collections::VecDeque;
use std::rc::Rc;

use spatial_engine::instruction::MicroInstruction;
use spatial_engine::packet::{CreditBoard, Packet, PortQueues};
use spatial_engine::routing::{RoutingTable, RoutingTree};
use spatial_engine::scheduler::CoreScheduler;
use spatial_engine::tensor::{Tensor, TensorTable};
use spatial_engine::test_helpers::{latency_table, start_test, track};
use spatial_engine::types::ReadyMarker;
use spatial_engine::units::FunctionalUnit;
use spatial_engine::units::network_interface::{
    DeliveryMode, NetworkInterface, NetworkInterfaceConfig,
};
use spatial_track::entity::{Entity, toplevel};
use spatial_track::test_helpers::TestTracker;
use spatial_track::{Tracker, test_init};

fn build_core(
    top: &Rc<Entity>,
    tracks: Vec<VecDeque<MicroInstruction>>,
    seed: u64,
) -> (CoreScheduler, PortQueues) {
    let core = Rc::new(Entity::new(top, "core0"));
    let ports = PortQueues::new();
    let credits = CreditBoard::new(2);
    let routing = Rc::new(RoutingTable::new());
    let config = NetworkInterfaceConfig {
        node: 0,
        threshold: 2,
        channel_width: 16,
        delivery: DeliveryMode::Unicast,
    };
    let ni = NetworkInterface::new(&core, &config, ports.clone(), &credits, &routing).unwrap();
    let units = FunctionalUnit::standard_set(&core, &latency_table(), ni);

    let mut tensors = TensorTable::new();
    tensors.insert(Tensor::new(1, vec![4, 4]));
    (
        CoreScheduler::new(&core, 0, units, tracks, tensors, seed),
        ports,
    )
}

fn run_until_finished(core: &mut CoreScheduler, from: u64, limit: u64) -> u64 {
    for cycle in from..limit {
        core.tick(cycle).unwrap();
        if core.is_finished(cycle) {
            return cycle;
        }
    }
    panic!("core did not finish within {limit} cycles");
}

#[test]
fn single_track_timing() {
    let top = start_test(file!());
    let (mut core, _) = build_core(
        &top,
        vec![track(&["BUS.trans 1", "CPU.sleep 5"])],
        0,
    );

    core.tick(0).unwrap();
    assert_eq!(core.tracks()[0].marker(), ReadyMarker::At(1));
    core.tick(1).unwrap();
    assert_eq!(core.tracks()[0].len(), 1);
    assert_eq!(core.tracks()[0].marker(), ReadyMarker::At(6));
    for cycle in 2..6 {
        core.tick(cycle).unwrap();
        assert!(core.is_busy(cycle));
    }
    core.tick(6).unwrap();
    assert!(core.is_finished(6));
    assert_eq!(core.busy_cycles(), 6);
    assert_eq!(core.idle_cycles(), 0);

    core.tick(7).unwrap();
    assert_eq!(core.idle_cycles(), 1);
}

#[test]
fn empty_track_never_selected() {
    for seed in 0..16 {
        let top = start_test(file!());
        let (mut core, _) = build_core(
            &top,
            vec![VecDeque::new(), track(&["BUS.trans 1"]), VecDeque::new()],
            seed,
        );
        core.tick(0).unwrap();
        assert_eq!(core.tracks()[1].marker(), ReadyMarker::At(1));
    }
}

#[test]
fn receive_retries_until_packet_arrives() {
    let top = start_test(file!());
    let (mut core, ports) = build_core(&top, vec![track(&["NI.recv 9", "BUS.trans 9"])], 0);

    for cycle in 0..10 {
        core.tick(cycle).unwrap();
        assert_eq!(core.tracks()[0].marker(), ReadyMarker::Unset);
        assert_eq!(core.tracks()[0].len(), 2);
    }

    ports.inbound.borrow_mut().push_back(Packet {
        flow_id: 9,
        source: 1,
        size: 1,
        path: Rc::new(RoutingTree::direct(1, 0)),
        payload: Tensor::new(9, vec![3]),
    });
    core.tick(10).unwrap();
    assert_eq!(core.tracks()[0].marker(), ReadyMarker::At(11));
    assert_eq!(core.tensors().get(9).unwrap().dims, vec![3]);

    let finished_at = run_until_finished(&mut core, 11, 100);
    assert_eq!(finished_at, 12);
}

#[test]
fn send_reaches_outbound_queue() {
    let top = start_test(file!());
    let (mut core, ports) = build_core(
        &top,
        vec![track(&["BUFFER.read 1", "NI.send 1 1"])],
        0,
    );
    run_until_finished(&mut core, 0, 100);
    let outbound = ports.outbound.borrow();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].flow_id, 1);
}

#[test]
fn unknown_unit() {
    let top = start_test(file!());
    let (mut core, _) = build_core(&top, vec![track(&["GPU.run 1"])], 0);
    let err = core.tick(0).unwrap_err();
    assert!(err.0.contains("no functional unit"));
}

#[test]
fn unknown_opcode_is_fatal() {
    let top = start_test(file!());
    let (mut core, _) = build_core(&top, vec![track(&["BUS.fly 1"])], 0);
    let err = core.tick(0).unwrap_err();
    assert!(err.0.contains("cannot execute"));
}

fn issues_per_cycle(test_tracker: &TestTracker) -> Vec<usize> {
    let mut counts = Vec::new();
    for event in test_tracker.events() {
        if event.contains("set cycle to") {
            counts.push(0);
        } else if event.contains(": issue t") {
            *counts.last_mut().unwrap() += 1;
        }
    }
    counts
}

#[test]
fn one_issue_per_tick() {
    for seed in 0..8 {
        let (test_tracker, tracker): (Rc<TestTracker>, Tracker) = test_init!(1);
        let top = toplevel(&tracker, "top");
        let (mut core, _) = build_core(
            &top,
            vec![
                track(&["CPU.sleep 3", "BUS.trans 1", "CPU.poll"]),
                track(&["BUS.trans 1", "BUFFER.write 1"]),
                track(&["CPU.sleep 2"]),
            ],
            seed,
        );
        run_until_finished(&mut core, 0, 100);

        let counts = issues_per_cycle(&test_tracker);
        assert!(counts.iter().all(|c| *c <= 1));
        assert_eq!(counts.iter().sum::<usize>(), 6);
        assert!(core.tracks().iter().all(|t| t.is_empty()));
    }
}

#[test]
fn core_stalls_while_any_track_busy() {
    let top = start_test(file!());
    let (mut core, _) = build_core(
        &top,
        vec![track(&["CPU.sleep 10"]), track(&["CPU.sleep 10"])],
        3,
    );
    core.tick(0).unwrap();
    let issued: Vec<_> = core.tracks().iter().map(|t| t.marker()).collect();
    assert_eq!(issued.iter().filter(|m| m.is_set()).count(), 1);

    for cycle in 1..10 {
        core.tick(cycle).unwrap();
        let markers: Vec<_> = core.tracks().iter().map(|t| t.marker()).collect();
        assert_eq!(markers, issued);
    }
}

#[test]
fn stats_dump() {
    let top = start_test(file!());
    let (mut core, _) = build_core(&top, vec![track(&["CPU.sleep 4"])], 0);
    core.tick(0).unwrap();

    let mut out = Vec::new();
    core.write_stats(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("CORE 0 stats:"));
    assert!(text.contains("t0 (1 left, ready 4): CPU.sleep 4"));
    assert!(text.contains("NI: outbound 0 inbound 0 credit open"));

    run_until_finished(&mut core, 1, 100);
    assert!(core.is_finished(100));
    let mut out = Vec::new();
    core.write_stats(&mut out).unwrap();
    assert!(String::from_utf8(out).unwrap().contains("all instructions finished"));
}
