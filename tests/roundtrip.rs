use pretty_assertions::assert_eq;

use tvm_rs::asm::{assemble_with, strip_comment};
use tvm_rs::hex::{format_hex, parse_hex};
use tvm_rs::{assemble, disassemble, AsmConfig, HexLayout};

const PRELUDE: &str = "$sys_enter:\n    jmp $sys_enter\n";

const PROGRAM: &str = "\
main:
    mov r0, 5
    mov r1, r0
.loop:
    sub r0, 1
    cmp r0, 0
    jmpne .loop
    load r2, [r1]
    store [r2], r3
    load r3, [4096]
    store [sp], 42
    push r0
    call helper
    pop r1
    invoke 3
    not r4
    xor r5, r6
    and r7, 255
    or flags, pc
    add r12, r11
    jmpz .done
    jmpnz .done
    jmpeq .done
    jmpgt .done
    jmplt .done
    jmpge .done
    jmple .done
.done:
    push r0
    call $sys_enter
helper:
.loop:
    ret
";

fn with_prelude() -> AsmConfig {
    AsmConfig { sys_prelude: true }
}

#[test]
fn asm_disasm_round_trip_with_label_table() {
    let out = assemble_with(with_prelude(), PROGRAM).unwrap();
    let text = disassemble(&out.bytes, Some(&out.labels)).unwrap();
    assert_eq!(text, format!("{PRELUDE}{PROGRAM}"));
}

#[test]
fn round_trip_survives_the_text_formats() {
    let out = assemble_with(with_prelude(), PROGRAM).unwrap();
    for layout in [HexLayout::PerInstruction, HexLayout::Flat] {
        let bytes = parse_hex(&out.hex(layout)).unwrap();
        let labels = tvm_rs::LabelTable::parse(&out.labels.to_string()).unwrap();
        assert_eq!(disassemble(&bytes, Some(&labels)).unwrap(), format!("{PRELUDE}{PROGRAM}"));
    }
}

#[test]
fn round_trip_is_modulo_comments_and_whitespace() {
    let noisy = "; leading comment\n\
                 start:   ; entry\n\
                 \tMOV  r0,5\n\
                 \n\
                 .again:\n\
                 \t  sub r0 ,  1 ; count down\n\
                 jmpnz   .again\n\
                 \tret\n";
    let out = assemble(noisy).unwrap();
    let text = disassemble(&out.bytes, Some(&out.labels)).unwrap();
    assert_eq!(text, "start:\n    mov r0, 5\n.again:\n    sub r0, 1\n    jmpnz .again\n    ret\n");
}

#[test]
fn synthesized_listing_reassembles_to_same_bytes() {
    let out = assemble(PROGRAM).unwrap();
    let text = disassemble(&out.bytes, None).unwrap();
    assert_eq!(assemble(&text).unwrap().bytes, out.bytes);
}

#[test]
fn prelude_listing_reassembles_bare() {
    let out = assemble_with(with_prelude(), PROGRAM).unwrap();
    let text = disassemble(&out.bytes, Some(&out.labels)).unwrap();
    let again = assemble(&text).unwrap();
    assert_eq!(again.bytes, out.bytes);
    assert_eq!(again.labels, out.labels);
}

#[test]
fn hex_and_label_golden_format() {
    let src = "entry:\n    mov r0, 5\n    push r0\n    call foo\n    ret\nfoo:\n    pop r1\n    ret\n";
    let out = assemble_with(with_prelude(), src).unwrap();
    assert_eq!(
        out.hex(HexLayout::PerInstruction),
        "3d 00 00 00 00\n0d 00 05 00 00 00\n2c 00\n35 13 00 00 00\n38\n30 10\n38\n"
    );
    assert_eq!(
        out.hex(HexLayout::Flat),
        "3d 00 00 00 00 0d 00 05 00 00 00 2c 00 35 13 00 00 00 38 30 10 38\n"
    );
    assert_eq!(out.labels.to_string(), "00000000   $sys_enter\n00000005   entry\n00000013   foo\n");
    assert_eq!(format_hex(&out.bytes, &out.starts, HexLayout::default()), out.hex(HexLayout::PerInstruction));
}

#[test]
fn stripped_source_matches_listing_lines() {
    // Reference fixtures are prepared by stripping comments and right whitespace.
    let src = "main:   ; m\n    push r0 ; save\n    ret\n";
    let reference: String = src
        .lines()
        .map(|l| match l.find(';') { Some(p) => l[..p].trim_end(), None => l.trim_end() })
        .filter(|l| !l.is_empty())
        .map(|l| format!("{l}\n"))
        .collect();
    let out = assemble(src).unwrap();
    assert_eq!(disassemble(&out.bytes, Some(&out.labels)).unwrap(), reference);
    assert_eq!(strip_comment("main:   ; m"), "main:");
}

fn assert_round_trip(src: &str) {
    let out = assemble(src).unwrap();
    let text = disassemble(&out.bytes, Some(&out.labels)).unwrap();
    assert_eq!(text, src);
    assert_eq!(assemble(&text).unwrap().bytes, out.bytes);
}

#[test]
fn shared_address_picks_a_name_visible_from_the_reference() {
    // `.end` belongs to `a`; from inside `b` the same address is spelled `b`.
    assert_round_trip("a:\n    jmp .end\n.end:\nb:\n    jmp b\n");
}

#[test]
fn cross_scope_locals_render_qualified() {
    assert_round_trip("a:\n    ret\n.x:\n    ret\nb:\n    jmp a.x\n");
    assert_round_trip("a:\n    call b.y\n    ret\nb:\n    ret\n.y:\n    ret\n");
}
