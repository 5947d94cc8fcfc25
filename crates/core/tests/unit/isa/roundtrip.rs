//! Assembler / Disassembler Round Trips.
//!
//! For every opcode-family representative: assemble a canonical source line,
//! disassemble the word, re-assemble the text and require the same bit
//! pattern. This is the totality law of the one-line assembler over the
//! disassembler's output, modulo omitted default options.

use t64_core::isa::asm::assemble_line;
use t64_core::isa::disasm::format_instr;

/// Canonical representatives of every instruction family and form.
const REPRESENTATIVES: &[&str] = &[
    // ALU forms.
    "NOP",
    "ADD R1,R2,R3",
    "ADD R1,R2,5",
    "ADD R1,R2,-5",
    "SUB R4,R5,R6",
    "SUB R4,R5,100",
    "AND R1,R2,R3",
    "AND.C R1,R2,R3",
    "AND.N R1,R2,R3",
    "AND.C.N R1,R2,0x7F",
    "OR R7,R8,R9",
    "OR.N R7,R8,15",
    "XOR R1,R2,R3",
    "XOR.N R1,R2,-1",
    "CMP.EQ R1,R2,R3",
    "CMP.NE R1,R2,9",
    "CMP.LT R3,R4,R5",
    "CMP.GE R3,R4,-7",
    "CMP.EV R3,R4,R5",
    "CMP.OD R3,R4,0",
    // MEM forms of the dual ops.
    "ADD R1,8(R2)",
    "ADD.W R1,4(R2)",
    "SUB R1,R3(R2)",
    "AND.B R1,1(R2)",
    "OR R1,R3(R2)",
    "XOR.H R1,2(R2)",
    "CMP.EQ R1,8(R2)",
    "CMP.GT R1,R3(R2)",
    // Bit field ops.
    "EXTR R1,R2,4,8",
    "EXTR.S R1,R2,SAR,16",
    "DEP R1,R2,8,4",
    "DEP.Z R1,R2,SAR,6",
    "DEP R1,9,4,4",
    "DSR R1,R2,R3,12",
    "DSR R1,R2,R3,SAR",
    // Shift and add.
    "SHL1A R1,R2,R3",
    "SHL2A R1,R2,20",
    "SHL3A R1,R2,R3",
    "SHR1A R1,R2,R3",
    "SHR2A R1,R2,-4",
    "SHR3A R1,R2,R3",
    // Immediate group.
    "LDIL R1,0xABCDE",
    "LDIL.M R1,0x12345",
    "LDIL.U R1,0xFFF",
    "ADDIL R1,0x800",
    // Address generation.
    "LDO R1,64(R2)",
    "LDO.W R1,32(R2)",
    "LDO R1,R3(R2)",
    // Loads and stores.
    "LD R1,8(R2)",
    "LD.B R1,3(R2)",
    "LD.H R1,2(R2)",
    "LD.W R1,4(R2)",
    "LD.U R1,8(R2)",
    "LD R1,R3(R2)",
    "ST R1,8(R2)",
    "ST.W R1,4(R2)",
    "ST R1,R3(R2)",
    "LDR R1,8(R2)",
    "LDR.U R1,8(R2)",
    "STC R1,8(R2)",
    // Branches.
    "B 16",
    "B -16",
    "B.G 32",
    "B 8,R14",
    "BE (R3)",
    "BE 8(R3)",
    "BE 16(R3),R14",
    "BR R5",
    "BR.D R5",
    "BR R5,R14",
    "BV (R5)",
    "BV R3(R5)",
    "BV.Q (R5),R14",
    "BB.T R3,5,16",
    "BB.F R3,SAR,-8",
    "CBR.EQ R1,R2,8",
    "CBR.NE R1,R2,-12",
    "MBR.LT R1,R2,16",
    "MBR.OD R1,R2,4",
    "ABR.GT R1,R2,8",
    "ABR.EV R1,R2,-4",
    // System group.
    "MFCR R1,C4",
    "MFCR R1,SAR",
    "MTCR R2,C1",
    "MTCR R2,C1,R3",
    "MFIA R1",
    "MFIA.L R1",
    "MFIA.M R1",
    "MFIA.U R1",
    "LPA R1,(R2)",
    "LPA R1,R3(R2)",
    "PRB R1,R2,0",
    "PRB R1,R2,1",
    "PRB R1,R2,R3",
    "IITLB R1,R2,R3",
    "IDTLB R1,R2,R3",
    "PITLB R1,(R2)",
    "PDTLB R1,R3(R2)",
    "PICA R1,(R2)",
    "PDCA R1,R3(R2)",
    "FICA R1,(R2)",
    "FDCA R1,R3(R2)",
    "RSM R1,0x21",
    "SSM R1,0x80",
    "RFI",
    "DIAG R1,5,R2,R3",
    "TRAP 3,R2,R3",
];

#[test]
fn representatives_roundtrip_radix_16() {
    for line in REPRESENTATIVES {
        let word = assemble_line(line).unwrap_or_else(|e| panic!("asm {:?}: {}", line, e));
        let text = format_instr(word, 16);
        let again = assemble_line(&text)
            .unwrap_or_else(|e| panic!("reasm {:?} (from {:?}): {}", text, line, e));
        assert_eq!(
            again, word,
            "{:?} -> {:#010x} -> {:?} -> {:#010x}",
            line, word, text, again
        );
    }
}

#[test]
fn representatives_roundtrip_radix_10() {
    for line in REPRESENTATIVES {
        let word = assemble_line(line).unwrap_or_else(|e| panic!("asm {:?}: {}", line, e));
        let text = format_instr(word, 10);
        let again = assemble_line(&text)
            .unwrap_or_else(|e| panic!("reasm {:?} (from {:?}): {}", text, line, e));
        assert_eq!(again, word, "{:?} via {:?}", line, text);
    }
}

#[test]
fn roundtrip_is_stable() {
    // A second disassemble of the re-assembled word gives identical text.
    for line in REPRESENTATIVES {
        let word = assemble_line(line).unwrap();
        let text = format_instr(word, 16);
        let word2 = assemble_line(&text).unwrap();
        assert_eq!(format_instr(word2, 16), text, "canonical form of {:?}", line);
    }
}
