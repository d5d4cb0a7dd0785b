use itertools::Itertools;

mod common;
use common::{expect_assembly, expect_assembly_error, ExpectedBytes};

#[test]
fn simple_rts() {
    expect_assembly(
        &["\
            .org $008000\n\
            .entry m8x8\n\
            RTS\n"],
        &[ExpectedBytes { location: 0x8000, bytes: vec![0x60] }],
    );
}

#[test]
fn missing_origin() {
    expect_assembly_error(
        &["\
            .entry m8x8\n\
            RTS\n"],
        "No address given for assembly",
    );
}

#[test]
fn cross_module_equ_in_dependency_order() {
    let f1 = ".module M1\nv1 .equ 1\n";
    let f2 = ".module M2\nv2 .equ M1::v1 + 1\n";
    let f3 = ".module M3\nv3 .equ M2::v2 + 1\nv4 .equ M1::v1 + 3\n";
    // A fourth module outputs the constants defined this way.
    let f4 = ".org $8000\n.db <M1::v1, <M2::v2, <M3::v3, <M3::v4\n";

    let files = [f1, f2, f3, f4];
    // These files must assemble no matter what order they appear in.
    for permutation in files.iter().permutations(files.len()) {
        let sources: Vec<&str> = permutation.into_iter().copied().collect();
        expect_assembly(
            &sources,
            &[ExpectedBytes { location: 0x8000, bytes: vec![0x01, 0x02, 0x03, 0x04] }],
        );
    }
}

#[test]
fn anonymous_modules_in_any_order() {
    let f1 = "v1 .equ 1\n";
    let f2 = "v2 .equ v1 + 1\n";
    let f3 = "v3 .equ v2 + 1\nv4 .equ v1 + 3\n";
    let f4 = ".org $8000\n.db <v1, <v2, <v3, <v4\n";

    let files = [f1, f2, f3, f4];
    for permutation in files.iter().permutations(files.len()) {
        let sources: Vec<&str> = permutation.into_iter().copied().collect();
        expect_assembly(
            &sources,
            &[ExpectedBytes { location: 0x8000, bytes: vec![0x01, 0x02, 0x03, 0x04] }],
        );
    }
}

#[test]
fn cyclic_equ_definitions() {
    expect_assembly_error(&["v1 .equ v2\n", "v2 .equ v1\n"], "Cyclic dependency");
}

#[test]
fn flex_immediate_widths() {
    expect_assembly(
        &[".org $008000\n.entry m8x8\nLDA #$12\n"],
        &[ExpectedBytes { location: 0x8000, bytes: vec![0xA9, 0x12] }],
    );
    expect_assembly(
        &[".org $008000\n.entry m16x8\nLDA #$1234\n"],
        &[ExpectedBytes { location: 0x8000, bytes: vec![0xA9, 0x34, 0x12] }],
    );
    // A 16-bit immediate with the accumulator known 8-bit names the flag.
    expect_assembly_error(&[".org $008000\n.entry m8x8\nLDA #$1234\n"], "`m`");
}

#[test]
fn relative_branch_out_of_range() {
    expect_assembly_error(
        &[".org $008000\n.entry m8x8\nBRA $8100\n"],
        "Relative branch too far",
    );
}

#[test]
fn pseudo_mnemonic_expansion() {
    expect_assembly(
        &[".org $008000\n.entry m8x8\nADD #$01\n"],
        &[ExpectedBytes { location: 0x8000, bytes: vec![0x18, 0x69, 0x01] }],
    );
    expect_assembly(
        &[".org $008000\n.entry m8x8\nSUB #$01\n"],
        &[ExpectedBytes { location: 0x8000, bytes: vec![0x38, 0xE9, 0x01] }],
    );
}

#[test]
fn overlapping_writes_between_modules() {
    // Both modules emit the same byte value, but the overlap is still
    // fatal; byte equality only matters to the ROM-identity sink.
    expect_assembly_error(
        &[
            ".module a\n.org $008000\n.mode m8x8\n.db $00\n",
            ".module b\n.org $008000\n.mode m8x8\n.db $00\n",
        ],
        "write",
    );
}

#[test]
fn branches_resolve_scoped_labels() {
    expect_assembly(
        &["\
            .org $008000\n\
            .entry m8x8\n\
            .begin\n\
            loop: dex\n\
            bne loop\n\
            .end\n\
            .begin\n\
            loop: dey\n\
            bne loop\n\
            .end\n\
            rts\n"],
        &[ExpectedBytes {
            location: 0x8000,
            bytes: vec![
                0xCA, 0xD0, 0xFD, // dex; bne -3
                0x88, 0xD0, 0xFD, // dey; bne -3
                0x60, // rts
            ],
        }],
    );
}

#[test]
fn data_directives_emit_all_widths() {
    expect_assembly(
        &["\
            .org $008000\n\
            .mode m8x8\n\
            .db $01, $02\n\
            .dw $1234\n\
            .dl $56789a\n"],
        &[ExpectedBytes {
            location: 0x8000,
            bytes: vec![0x01, 0x02, 0x34, 0x12, 0x9A, 0x78, 0x56],
        }],
    );
}

#[test]
fn expressions_in_operands() {
    expect_assembly(
        &["\
            base .equ $40\n\
            .org $008000\n\
            .entry m8x8\n\
            lda #base + 2\n\
            sta base * 2\n\
            rts\n"],
        &[ExpectedBytes {
            location: 0x8000,
            bytes: vec![0xA9, 0x42, 0x8D, 0x80, 0x00, 0x60],
        }],
    );
}

#[test]
fn suffixes_force_immediate_width() {
    // Under known flags, a matching suffix is just explicit.
    expect_assembly(
        &[".org $008000\n.entry m8x8\nlda.b #$12\nrts\n"],
        &[ExpectedBytes { location: 0x8000, bytes: vec![0xA9, 0x12, 0x60] }],
    );
    // A suffix contradicting the flag state is a consistency error.
    expect_assembly_error(&[".org $008000\n.entry m8x8\nlda.w #$1234\n"], "`m`");
}

#[test]
fn duplicate_module_names() {
    expect_assembly_error(
        &[".module m\n", ".module m\n"],
        "same module name",
    );
}

#[test]
fn division_by_zero_in_equ() {
    expect_assembly_error(
        &["v .equ 1 / 0\n.org $8000\n.db <v\n"],
        "division by zero",
    );
}

#[test]
fn unbound_identifier() {
    expect_assembly_error(
        &[".org $8000\n.db <nowhere\n"],
        "Unbound identifier",
    );
}

#[test]
fn xce_mode_switch_tracks_widths() {
    // The classic native-mode entry sequence: clc; xce leaves e off but
    // the size bits at their 8-bit values, so rep #$30 is needed before a
    // wide immediate.
    expect_assembly(
        &["\
            .org $008000\n\
            .entry emu\n\
            clc\n\
            xce\n\
            rep #$30\n\
            lda #$1234\n\
            rts\n"],
        &[ExpectedBytes {
            location: 0x8000,
            bytes: vec![0x18, 0xFB, 0xC2, 0x30, 0xA9, 0x34, 0x12, 0x60],
        }],
    );
}
