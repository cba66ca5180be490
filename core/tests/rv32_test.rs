use decgen_core::{build_recognizer, Decoder, EmitOptions, EncodingTable, Error, Section, Syntax};

mod common;

const RV32: &str = include_str!("../../tables/rv32-dec.toml");

fn decoder() -> Decoder {
    Decoder::build(&EncodingTable::parse(RV32).unwrap())
}

fn decode(word: u32) -> (String, Vec<(String, u64)>) {
    let m = decoder().decode(word as u64).unwrap();
    (m.operation, m.args)
}

fn arg(args: &[(String, u64)], name: &str) -> u64 {
    args.iter().find(|(n, _)| n == name).map(|(_, v)| *v).unwrap()
}

#[test]
fn test_reference_table_is_clean() {
    let decoder = decoder();
    assert!(decoder.diagnostics().is_empty(), "{:?}", decoder.diagnostics());
    assert!(decoder.ambiguities().is_empty(), "{:?}", decoder.ambiguities());
    let extensions: Vec<&str> = decoder.trees().keys().map(String::as_str).collect();
    assert_eq!(extensions, vec!["I", "M", "Zicsr"]);
    assert_eq!(decoder.trees()["I"].operations().len(), 40);
}

#[test]
fn test_register_ops() {
    // add x3, x1, x2
    let (name, args) = decode(0x0020_81B3);
    assert_eq!(name, "add");
    assert_eq!((arg(&args, "rd"), arg(&args, "rs1"), arg(&args, "rs2")), (3, 1, 2));

    // sub x5, x6, x7
    assert_eq!(decode(0x4073_02B3).0, "sub");
    // sra x1, x2, x3
    assert_eq!(decode(0x4031_50B3).0, "sra");
    // mul x10, x11, x12
    assert_eq!(decode(0x02C5_8533).0, "mul");
    // remu x10, x11, x12
    assert_eq!(decode(0x02C5_F533).0, "remu");
}

#[test]
fn test_immediates() {
    // addi x1, x2, -1
    let (name, args) = decode(0xFFF1_0093);
    assert_eq!(name, "addi");
    assert_eq!(arg(&args, "imm"), 0xFFF);

    // srai x1, x2, 3
    let (name, args) = decode(0x4031_5093);
    assert_eq!(name, "srai");
    assert_eq!(arg(&args, "shamt"), 3);

    // lui x5, 0x12345
    let (name, args) = decode(0x1234_52B7);
    assert_eq!(name, "lui");
    assert_eq!(arg(&args, "li_imm"), 0x1234_5000);

    // sw x2, 12(x1)
    let (name, args) = decode(0x0020_A623);
    assert_eq!(name, "sw");
    assert_eq!(arg(&args, "str_imm"), 12);

    // beq x1, x2, -4
    let (name, args) = decode(0xFE20_8EE3);
    assert_eq!(name, "beq");
    assert_eq!(arg(&args, "branch_imm"), 0x1FFC);

    // jal x1, 2048
    let (name, args) = decode(0x0010_00EF);
    assert_eq!(name, "jal");
    assert_eq!(arg(&args, "jal_imm"), 2048);
}

#[test]
fn test_system_ops() {
    assert_eq!(decode(0x0000_0073).0, "ecall");
    assert_eq!(decode(0x0010_0073).0, "ebreak");
    assert_eq!(decode(0x0FF0_000F).0, "fence");

    // csrrs x1, mstatus, x0
    let m = decoder().decode(0x3000_20F3).unwrap();
    assert_eq!((m.extension.as_str(), m.operation.as_str()), ("Zicsr", "csrrs"));
    assert_eq!(arg(&m.args, "csr"), 0x300);
}

#[test]
fn test_unknown_words() {
    let decoder = decoder();
    for word in [0x0000_0000u64, 0xFFFF_FFFF, 0x0000_3003, 0x0200_0013 | 1 << 12] {
        assert_eq!(decoder.decode(word), Err(Error::NoMatch { word }));
    }
}

#[test]
fn test_selected_extensions_only() {
    let table = EncodingTable::parse(RV32).unwrap().select_extensions(&["I"]);
    let decoder = Decoder::build(&table);
    assert_eq!(decoder.decode(0x0020_81B3).unwrap().operation, "add");
    assert!(decoder.decode(0x02C5_8533).is_err());
}

#[test]
fn test_generated_c_decoder() {
    let text = decoder().emit(&EmitOptions::default());
    assert!(text.contains(
        "uint32_t shamt = (inst & 0b00000001111100000000000000000000) >> 20;"
    ));
    assert!(text.contains("uint32_t jal_imm =\n"));
    assert!(text.contains("    ((inst & 0b10000000000000000000000000000000) >> 11);\n"));
    assert!(text.contains("bool is_ecall = (opcode == 0b1110011) && (funct3 == 0b000)"));
    assert!(text.contains("switch (opcode) {"));
    assert!(text.trim_end().ends_with("undef();"));
}

#[test]
fn test_generated_rust_body() {
    let options = EmitOptions {
        syntax: Syntax::Rust,
        sections: vec![Section::Body],
        ..EmitOptions::default()
    };
    let text = decoder().emit(&options);
    assert!(text.contains("match opcode {"));
    assert!(text.contains("0x33 => {"));
    assert!(text.contains("add(rd, rs1, rs2);"));
    assert!(!text.contains("uint32_t"));
}

#[test]
fn test_recognizers_accept_only_their_encoding() {
    let decoder = decoder();
    let ops: Vec<_> = decoder.trees().values().flat_map(|tree| tree.operations()).collect();
    for op in &ops {
        let word = op.pattern();
        let env = |name: &str| decoder.fields().get(name).map(|field| field.extract(word));
        for other in &ops {
            let expected = u64::from(other.id() == op.id());
            let found = build_recognizer(other).eval(&env);
            assert_eq!(found, Some(expected), "{} on {}", other.id(), op.id());
        }
    }
}

#[test]
fn test_generated_body_agrees_with_decode() {
    let decoder = decoder();
    let mut words: Vec<u64> = decoder
        .trees()
        .values()
        .flat_map(|tree| tree.operations())
        .flat_map(|op| [op.pattern(), op.pattern() | !op.mask() & 0xFFFF_FFFF])
        .collect();
    words.extend([0x0000_0000, 0xFFFF_FFFF, 0x0000_3003, 0x0020_81B3, 0xFE20_8EE3, 0x3000_20F3]);
    for word in words {
        assert_eq!(
            common::run_generated(&decoder, word),
            common::expected_call(&decoder, word),
            "word {word:#010x}"
        );
    }
}

#[test]
fn test_whole_table_renders_in_both_syntaxes() {
    let decoder = decoder();
    let cases = [
        (Syntax::C, "bool is_", "bool is_add = (opcode == ", "switch (opcode) {"),
        (Syntax::Rust, "let is_", "let is_add: bool = (opcode == ", "match opcode {"),
    ];
    for (syntax, flag, add, switch) in cases {
        let text = decoder.emit(&EmitOptions { syntax, ..EmitOptions::default() });
        assert_eq!(text.lines().filter(|line| line.starts_with(flag)).count(), 54, "{syntax}");
        assert!(text.contains(add), "{syntax}");
        assert!(text.contains(switch), "{syntax}");
    }
}
