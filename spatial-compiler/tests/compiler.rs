// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::io::Write;

use spatial_compiler::TaskCompiler;
use spatial_engine::test_helpers::start_test;

const TASK: &str = "\
// two tracks feeding tensor 5 and 6 to other cores
operators:
{
  compute # ij,jk->ik # 5 # 1, 2
}
{
  manipulate # 10 # 2 # 6
  assemble # CPU.reshape 6 4 4
}
data:
5 # 2, 3 # 4, 4
6 # 1 # 16
1 # 0 # 4, 8
";

fn instrs(task: &spatial_compiler::CompiledTask, track: usize) -> Vec<String> {
    task.tracks[track].iter().map(ToString::to_string).collect()
}

#[test]
fn compile_two_tracks() {
    let top = start_test(file!());
    let compiler = TaskCompiler::new(&top);
    let task = compiler.compile_str(TASK, "task0").unwrap();

    assert_eq!(task.tracks.len(), 2);
    assert_eq!(task.tracks[0].len(), 16);
    assert_eq!(
        instrs(&task, 1),
        vec![
            "NI.send 6 1",
            "CPU.sleep 10",
            "NI.send 6 1",
            "CPU.sleep 10",
            "CPU.reshape 6 4 4",
        ]
    );

    // Tensor 2 has no data line so it is allocated without a shape.
    assert_eq!(task.tensors.len(), 4);
    assert_eq!(task.tensors.get(1).unwrap().dims, vec![4, 8]);
    assert!(task.tensors.get(2).unwrap().dims.is_empty());
    assert_eq!(task.tensors.get(5).unwrap().dims, vec![4, 4]);
}

#[test]
fn compilation_is_deterministic() {
    let top = start_test(file!());
    let compiler = TaskCompiler::new(&top);
    let first = compiler.compile_str(TASK, "task0").unwrap();
    let second = compiler.compile_str(TASK, "task0").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn data_before_operators() {
    let top = start_test(file!());
    let compiler = TaskCompiler::new(&top);
    let task = compiler
        .compile_str("data:\n7 # 1\noperators:\nmanipulate # 1 # 1 # 7\n", "task")
        .unwrap();
    assert_eq!(task.tracks.len(), 1);
    assert_eq!(instrs(&task, 0), vec!["NI.send 7 1", "CPU.sleep 1"]);
    assert!(task.tensors.get(7).unwrap().dims.is_empty());
}

#[test]
fn marker_on_section_line() {
    let top = start_test(file!());
    let compiler = TaskCompiler::new(&top);
    let task = compiler
        .compile_str("operators: {\nmanipulate # 1 # 1 # 7\n}\ndata:\n7 # 1 # 2\n", "task")
        .unwrap();
    assert_eq!(task.tracks.len(), 1);
}

#[test]
fn output_without_destination() {
    let top = start_test(file!());
    let compiler = TaskCompiler::new(&top);

    let undeclared = compiler
        .compile_str("operators:\ncompute # # 5 # 1\ndata:\n1 # 0\n", "task3")
        .unwrap_err();
    assert_eq!(
        undeclared.0,
        "operator/data mismatch at tensor 5 in file task3"
    );

    let no_dests = compiler
        .compile_str("operators:\ncompute # # 5 # 1\ndata:\n5 # # 2\n", "task3")
        .unwrap_err();
    assert!(no_dests.0.contains("mismatch at tensor 5"));
}

#[test]
fn malformed_sections() {
    let top = start_test(file!());
    let compiler = TaskCompiler::new(&top);

    for source in [
        "compute # # 5 # 1\n",
        "operators:\n}\n",
        "operators:\n{\n{\n}\n",
        "operators:\n{\nmanipulate # 1 # 1 # 7\n",
        "operators:\n{\ndata:\n}\n",
    ] {
        let err = compiler.compile_str(source, "bad").unwrap_err();
        assert!(err.0.contains("malformed section marker"), "{source}: {err}");
    }
}

#[test]
fn bad_lines() {
    let top = start_test(file!());
    let compiler = TaskCompiler::new(&top);

    let err = compiler
        .compile_str("operators:\nreduce # 1 # 2\n", "bad")
        .unwrap_err();
    assert!(err.0.contains("operator type unspecified"));

    let err = compiler
        .compile_str("data:\n5 # 1 # 2\n5 # 2 # 2\n", "bad")
        .unwrap_err();
    assert!(err.0.contains("tensor 5 declared twice"));

    assert!(compiler.compile_str("data:\n5\n", "bad").is_err());
    assert!(compiler.compile_str("data:\nx # 1\n", "bad").is_err());
}

#[test]
fn compile_from_file() {
    let top = start_test(file!());
    let compiler = TaskCompiler::new(&top);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(TASK.as_bytes()).unwrap();
    let task = compiler.compile_file(file.path()).unwrap();
    assert_eq!(task.tracks.len(), 2);

    let missing = file.path().with_extension("missing");
    let err = compiler.compile_file(&missing).unwrap_err();
    assert_eq!(err.0, format!("task file {} not found", missing.display()));
}
