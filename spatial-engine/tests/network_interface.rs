// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use spatial_engine::instruction::MicroInstruction;
use spatial_engine::packet::{CreditBoard, Packet, PortQueues};
use spatial_engine::routing::{RoutingTable, RoutingTree};
use spatial_engine::tensor::{Tensor, TensorTable};
use spatial_engine::test_helpers::start_test;
use spatial_engine::types::NodeId;
use spatial_engine::units::network_interface::{
    DeliveryMode, NetworkInterface, NetworkInterfaceConfig,
};
use spatial_engine::units::{Outcome, Simulate};
use spatial_track::entity::{Entity, toplevel};
use spatial_track::test_helpers::TestTracker;
use spatial_track::{Tracker, test_init};

struct Fixture {
    ni: NetworkInterface,
    ports: PortQueues,
    credits: CreditBoard,
    tensors: TensorTable,
}

fn fixture(file: &str, board: &str, delivery: DeliveryMode) -> Fixture {
    fixture_under(&start_test(file), board, delivery)
}

fn fixture_under(top: &Rc<Entity>, board: &str, delivery: DeliveryMode) -> Fixture {
    let ports = PortQueues::new();
    let credits = CreditBoard::new(4);
    let routing = Rc::new(RoutingTable::from_string(board).unwrap());
    let config = NetworkInterfaceConfig {
        node: 0,
        threshold: 1,
        channel_width: 4,
        delivery,
    };
    let ni = NetworkInterface::new(top, &config, ports.clone(), &credits, &routing).unwrap();

    let mut tensors = TensorTable::new();
    tensors.insert(Tensor::new(7, vec![2, 5]));
    tensors.insert(Tensor::new(8, vec![]));
    Fixture {
        ni,
        ports,
        credits,
        tensors,
    }
}

fn send(tid: i64, dests: &[i64]) -> MicroInstruction {
    let mut operands = vec![tid];
    operands.extend_from_slice(dests);
    MicroInstruction::new("NI", "send", operands)
}

fn outbound(f: &Fixture) -> Vec<Packet> {
    f.ports.outbound.borrow().iter().cloned().collect()
}

fn dests_of(p: &Packet) -> Vec<NodeId> {
    p.destinations().iter().copied().collect()
}

#[test]
fn send_waits_for_credit() {
    let mut f = fixture(file!(), "", DeliveryMode::Unicast);
    f.credits.set(2, false).unwrap();

    let instr = send(7, &[1, 2]);
    for cycle in 0..5 {
        let outcome = f.ni.simulate(&instr, &mut f.tensors, cycle).unwrap();
        assert_eq!(outcome, Outcome::NotYet);
        assert!(f.ports.outbound.borrow().is_empty());
    }

    f.credits.set(2, true).unwrap();
    let outcome = f.ni.simulate(&instr, &mut f.tensors, 5).unwrap();
    assert_eq!(outcome, Outcome::Complete(6));
    assert_eq!(f.ports.outbound.borrow().len(), 2);
}

#[test]
fn unicast_packets() {
    let mut f = fixture(file!(), "", DeliveryMode::Unicast);
    let outcome = f.ni.simulate(&send(7, &[3, 1, 3]), &mut f.tensors, 0).unwrap();
    assert_eq!(outcome, Outcome::Complete(1));

    let packets = outbound(&f);
    assert_eq!(packets.len(), 2);
    assert_eq!(dests_of(&packets[0]), vec![3]);
    assert_eq!(dests_of(&packets[1]), vec![1]);
    for p in &packets {
        assert_eq!(p.flow_id, 7);
        assert_eq!(p.source, 0);
        // 10 elements over a channel of 4
        assert_eq!(p.size, 3);
        assert_eq!(p.path.root(), 0);
    }
}

#[test]
fn unicast_uses_single_destination_tree() {
    let mut f = fixture(file!(), "7 0 2\n0 1\n1 2\n", DeliveryMode::Unicast);
    f.ni.simulate(&send(7, &[2]), &mut f.tensors, 0).unwrap();
    let packets = outbound(&f);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].path.hops_to(2), Some(2));
}

#[test]
fn unicast_bypasses_multicast_tree() {
    let mut f = fixture(file!(), "7 0 1 2\n0 1\n1 2\n", DeliveryMode::Unicast);
    f.ni.simulate(&send(7, &[1, 2]), &mut f.tensors, 0).unwrap();
    let packets = outbound(&f);
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[1].path.hops_to(2), Some(1));
}

fn count_matching(tracker: &TestTracker, needle: &str) -> usize {
    tracker.events().iter().filter(|e| e.contains(needle)).count()
}

#[test]
fn stalled_send_warns_once() {
    let (test_tracker, tracker): (Rc<TestTracker>, Tracker) = test_init!(1);
    let top = toplevel(&tracker, "top");
    let mut f = fixture_under(&top, "7 0 1 2\n0 1\n1 2\n", DeliveryMode::Unicast);
    f.credits.set(2, false).unwrap();

    let instr = send(7, &[1, 2]);
    for cycle in 0..5 {
        let outcome = f.ni.simulate(&instr, &mut f.tensors, cycle).unwrap();
        assert_eq!(outcome, Outcome::NotYet);
    }
    assert_eq!(count_matching(&test_tracker, "ignoring the multicast tree"), 0);

    f.credits.set(2, true).unwrap();
    let outcome = f.ni.simulate(&instr, &mut f.tensors, 5).unwrap();
    assert_eq!(outcome, Outcome::Complete(6));
    assert_eq!(count_matching(&test_tracker, "ignoring the multicast tree"), 1);
    assert_eq!(outbound(&f).len(), 2);
}

#[test]
fn self_send_dropped() {
    let mut f = fixture(file!(), "", DeliveryMode::Unicast);
    let outcome = f.ni.simulate(&send(7, &[0]), &mut f.tensors, 9).unwrap();
    assert_eq!(outcome, Outcome::Complete(10));
    assert!(f.ports.outbound.borrow().is_empty());
}

#[test]
fn empty_tensor_padded() {
    let mut f = fixture(file!(), "", DeliveryMode::Unicast);
    f.ni.simulate(&send(8, &[1]), &mut f.tensors, 0).unwrap();
    let packets = outbound(&f);
    assert_eq!(packets[0].size, 1);
    assert_eq!(packets[0].payload.dims, vec![1]);
}

#[test]
fn multicast_single_packet() {
    let mut f = fixture(file!(), "7 0 1 2\n0 1\n1 2\n", DeliveryMode::Multicast);
    f.ni.simulate(&send(7, &[2, 1]), &mut f.tensors, 0).unwrap();
    let packets = outbound(&f);
    assert_eq!(packets.len(), 1);
    assert_eq!(dests_of(&packets[0]), vec![1, 2]);
}

#[test]
fn multicast_tree_mismatch() {
    let mut f = fixture(file!(), "7 0 1 2\n0 1\n1 2\n", DeliveryMode::Multicast);
    let err = f.ni.simulate(&send(7, &[1, 3]), &mut f.tensors, 0).unwrap_err();
    assert!(err.0.contains("routing tree for tensor 7"));
}

#[test]
fn multicast_without_tree() {
    let mut f = fixture(file!(), "", DeliveryMode::Multicast);
    let err = f.ni.simulate(&send(7, &[1, 3]), &mut f.tensors, 0).unwrap_err();
    assert!(err.0.contains("please specify the multicast tree for tensor 7"));

    let outcome = f.ni.simulate(&send(7, &[3]), &mut f.tensors, 0).unwrap();
    assert_eq!(outcome, Outcome::Complete(1));
    assert_eq!(dests_of(&outbound(&f)[0]), vec![3]);
}

fn packet_for(tid: i64, dims: Vec<usize>) -> Packet {
    Packet {
        flow_id: tid,
        source: 3,
        size: 1,
        path: Rc::new(RoutingTree::direct(3, 0)),
        payload: Tensor::new(tid, dims),
    }
}

#[test]
fn recv_out_of_order() {
    let mut f = fixture(file!(), "", DeliveryMode::Unicast);
    let recv = MicroInstruction::new("NI", "recv", vec![5]);

    assert_eq!(
        f.ni.simulate(&recv, &mut f.tensors, 0).unwrap(),
        Outcome::NotYet
    );

    {
        let mut inbound = f.ports.inbound.borrow_mut();
        inbound.push_back(packet_for(1, vec![1]));
        inbound.push_back(packet_for(5, vec![4, 4]));
        inbound.push_back(packet_for(2, vec![2]));
    }

    assert_eq!(
        f.ni.simulate(&recv, &mut f.tensors, 3).unwrap(),
        Outcome::Complete(4)
    );
    assert_eq!(f.tensors.get(5).unwrap().dims, vec![4, 4]);
    let remaining: Vec<i64> = f.ports.inbound.borrow().iter().map(|p| p.flow_id).collect();
    assert_eq!(remaining, vec![1, 2]);
}

#[test]
fn credit_follows_inbound_queue() {
    let mut f = fixture(file!(), "", DeliveryMode::Unicast);
    {
        let mut inbound = f.ports.inbound.borrow_mut();
        inbound.push_back(packet_for(1, vec![1]));
        inbound.push_back(packet_for(2, vec![1]));
    }
    f.ni.refresh_credit().unwrap();
    assert!(!f.credits.is_open(0).unwrap());

    let recv = MicroInstruction::new("NI", "recv", vec![1]);
    f.ni.simulate(&recv, &mut f.tensors, 0).unwrap();
    f.ni.refresh_credit().unwrap();
    assert!(f.credits.is_open(0).unwrap());
}

#[test]
fn unknown_opcode() {
    let mut f = fixture(file!(), "", DeliveryMode::Unicast);
    let instr = MicroInstruction::new("NI", "peek", vec![1]);
    let err = f.ni.simulate(&instr, &mut f.tensors, 0).unwrap_err();
    assert!(err.0.contains("NI cannot execute the instruction NI.peek 1"));
}

#[test]
fn delivery_mode_parse() {
    assert_eq!("Multicast".parse::<DeliveryMode>().unwrap(), DeliveryMode::Multicast);
    assert_eq!(DeliveryMode::default().to_string(), "unicast");
    assert!("broadcast".parse::<DeliveryMode>().is_err());
}
