use pretty_assertions::assert_eq;

use tvm_rs::asm::{assemble_with, strip_comment};
use tvm_rs::isa::tvm2::Instruction;
use tvm_rs::{assemble, AsmConfig, AsmError};

const EXAMPLE: &str = "entry:\n    mov r0, 5\n    push r0\n    call foo\n    ret\nfoo:\n    pop r1\n    ret\n";

fn bytes(src: &str) -> Vec<u8> {
    assemble(src).unwrap().bytes
}

#[test]
fn call_is_linked_to_label_offset() {
    let out = assemble(EXAMPLE).unwrap();
    assert_eq!(
        out.bytes,
        vec![
            0x0d, 0x00, 0x05, 0x00, 0x00, 0x00, // mov r0, 5
            0x2c, 0x00, // push r0
            0x35, 0x0e, 0x00, 0x00, 0x00, // call foo
            0x38, // ret
            0x30, 0x10, // pop r1
            0x38, // ret
        ]
    );
    assert_eq!(out.starts, vec![0, 6, 8, 13, 14, 16]);
    assert_eq!(out.labels.to_string(), "00000000   entry\n0000000e   foo\n");
}

#[test]
fn memory_forms() {
    assert_eq!(bytes("store [r2], r3"), vec![0x0a, 0x23]);
    assert_eq!(bytes("load r1, [r2]"), vec![0x06, 0x12]);
    assert_eq!(bytes("load r1, [0x100]"), vec![0x05, 0x10, 0x00, 0x01, 0x00, 0x00]);
    assert_eq!(bytes("store [r2], 7"), vec![0x09, 0x20, 0x07, 0x00, 0x00, 0x00]);
    assert_eq!(bytes("data:\n load r1, [ data ]"), vec![0x05, 0x10, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn immediates_are_little_endian() {
    assert_eq!(bytes("mov r1, 0x12345678"), vec![0x0d, 0x10, 0x78, 0x56, 0x34, 0x12]);
    assert_eq!(bytes("add sp, 4294967295"), vec![0x11, 0xe0, 0xff, 0xff, 0xff, 0xff]);
    assert_eq!(bytes("invoke 0X10"), vec![0x61, 0x10, 0x00, 0x00, 0x00]);
}

#[test]
fn register_and_nullary_forms() {
    assert_eq!(bytes("MOV R0, SP"), vec![0x0c, 0x0e]);
    assert_eq!(bytes("not r4\npush pc\npop flags\nret"), vec![0x24, 0x40, 0x2c, 0xf0, 0x30, 0xd0, 0x38]);
    assert_eq!(bytes("cmp r1, r2\njmpeq 0"), vec![0x28, 0x12, 0x49, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn comments_and_blank_lines_are_skipped() {
    let src = "   ; header comment\n\n\tret   ; trailing\n   \n";
    assert_eq!(bytes(src), vec![0x38]);
    assert_eq!(strip_comment("  mov r0, 1 ; set  "), "mov r0, 1");
    assert_eq!(strip_comment("; all comment"), "");
}

#[test]
fn forward_and_backward_local_references() {
    let out = assemble("start:\n    jmp .end\n.end:\n    jmp start\n").unwrap();
    assert_eq!(out.bytes, vec![0x3d, 0x05, 0x00, 0x00, 0x00, 0x3d, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(out.labels.to_string(), "00000000   start\n00000005   .end\n");
}

#[test]
fn local_labels_are_scoped_by_top_level_label() {
    let src = "a:\n.loop:\n    jmp .loop\nb:\n.loop:\n    jmp .loop\n    jmp a.loop\n";
    let out = assemble(src).unwrap();
    assert_eq!(
        out.bytes,
        vec![
            0x3d, 0x00, 0x00, 0x00, 0x00, // a.loop
            0x3d, 0x05, 0x00, 0x00, 0x00, // b.loop
            0x3d, 0x00, 0x00, 0x00, 0x00, // qualified a.loop
        ]
    );
    assert_eq!(out.labels.to_string(), "00000000   a\n00000000   .loop\n00000005   b\n00000005   .loop\n");
}

#[test]
fn system_labels_resolve_without_declaration() {
    let out = assemble("    push r0\n    call $sys_enter\n").unwrap();
    assert_eq!(out.bytes, vec![0x2c, 0x00, 0x35, 0x00, 0x00, 0x00, 0x00]);
    assert!(out.labels.is_empty());
}

#[test]
fn system_label_may_be_declared_at_its_address() {
    let out = assemble("$sys_enter:\n    jmp $sys_enter\nmain:\n    ret\n").unwrap();
    assert_eq!(out.bytes, vec![0x3d, 0x00, 0x00, 0x00, 0x00, 0x38]);
    assert_eq!(out.labels.to_string(), "00000000   $sys_enter\n00000005   main\n");
}

#[test]
fn prelude_shifts_user_code_to_entry_address() {
    let out = assemble_with(AsmConfig { sys_prelude: true }, "main:\n    call main\n").unwrap();
    assert_eq!(out.bytes, vec![0x3d, 0x00, 0x00, 0x00, 0x00, 0x35, 0x05, 0x00, 0x00, 0x00]);
    assert_eq!(out.starts, vec![0, 5]);
    assert_eq!(out.labels.to_string(), "00000000   $sys_enter\n00000005   main\n");
}

#[test]
fn unknown_mnemonic() {
    assert_eq!(
        assemble("ret\n  nop\n").unwrap_err(),
        AsmError::UnknownMnemonic { line: 2, mnemonic: "nop".into() }
    );
}

#[test]
fn wrong_operand_count() {
    assert_eq!(
        assemble("ret r0").unwrap_err(),
        AsmError::WrongOperandCount { line: 1, instr: Instruction::Ret, expected: 0, found: 1 }
    );
    assert_eq!(
        assemble("mov r0").unwrap_err(),
        AsmError::WrongOperandCount { line: 1, instr: Instruction::Mov, expected: 2, found: 1 }
    );
}

#[test]
fn malformed_operands() {
    let reason = |src: &str| match assemble(src).unwrap_err() {
        AsmError::MalformedOperand { reason, .. } => reason,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(reason("push 5"), "expected a register");
    assert_eq!(reason("call r1"), "expected an immediate or label");
    assert_eq!(reason("mov r0, 0xZZ"), "bad numeric literal");
    assert_eq!(reason("mov r0, 4294967296"), "bad numeric literal");
    assert_eq!(reason("mov 5, r0"), "destination must be a register");
    assert_eq!(reason("load r1, r2"), "load source must be a [memory] operand");
    assert_eq!(reason("store r1, r2"), "store destination must be a [register] operand");
    assert_eq!(reason("store [4], r2"), "store destination must be a [register] operand");
    assert_eq!(reason("mov [r1], r2"), "memory operand only valid for load/store");
    assert_eq!(reason("jmp [r1]"), "memory operand only valid for load/store");
    assert_eq!(reason("load r0, [r1"), "unbalanced brackets");
    assert_eq!(reason("mov r0,"), "empty operand");
    assert_eq!(reason("mov r0, -1"), "negative literals are not supported");
    assert_eq!(reason("jmp -5"), "negative literals are not supported");
}

#[test]
fn ambiguous_operands() {
    assert_eq!(
        assemble("jmp foo-bar").unwrap_err(),
        AsmError::AmbiguousAddressingMode { line: 1, operand: "foo-bar".into() }
    );
    assert!(matches!(assemble("mov r0, #5"), Err(AsmError::AmbiguousAddressingMode { .. })));
}

#[test]
fn undefined_labels_report_first_reference() {
    let src = "main:\n    jmp .nowhere\n    call missing\n    jmp missing\n";
    assert_eq!(
        assemble(src).unwrap_err(),
        AsmError::UndefinedLabel { line: 2, name: "main.nowhere".into() }
    );
    assert_eq!(
        assemble("call missing\n").unwrap_err(),
        AsmError::UndefinedLabel { line: 1, name: "missing".into() }
    );
}

#[test]
fn label_declaration_errors() {
    assert_eq!(
        assemble("a:\n    ret\na:\n").unwrap_err(),
        AsmError::DuplicateLabel { line: 3, name: "a".into() }
    );
    assert_eq!(
        assemble("a:\n.x:\n.x:\n").unwrap_err(),
        AsmError::DuplicateLabel { line: 3, name: "a.x".into() }
    );
    assert_eq!(assemble("1abc:").unwrap_err(), AsmError::MalformedLabel { line: 1, name: "1abc".into() });
    assert_eq!(assemble("a.b:").unwrap_err(), AsmError::MalformedLabel { line: 1, name: "a.b".into() });
    assert_eq!(assemble("ret\nsp:\n").unwrap_err(), AsmError::MalformedLabel { line: 2, name: "sp".into() });
    assert_eq!(assemble("R1:").unwrap_err(), AsmError::MalformedLabel { line: 1, name: "R1".into() });
    assert_eq!(
        assemble("ret\n$sys_enter:\n").unwrap_err(),
        AsmError::BadSystemLabel { line: 2, name: "$sys_enter".into(), addr: 1 }
    );
    assert_eq!(
        assemble("$nope:\n").unwrap_err(),
        AsmError::BadSystemLabel { line: 1, name: "$nope".into(), addr: 0 }
    );
}

#[test]
fn errors_render_with_line_numbers() {
    let err = assemble("ret\nret\nfrob r1\n").unwrap_err();
    assert_eq!(err.to_string(), "line 3: unknown mnemonic \"frob\"");
}
