//! SPIR-V numeric constants and the low-level instruction writer. A
//! self-contained table rather than `spirv_headers`'s encoder-oriented
//! constants, mirroring the source's own `enum spirv_opcode` in
//! `examples/original_source/sources/backends/spirv.c`.

pub const MAGIC_NUMBER: u32 = 0x0723_0203;
pub const VERSION: u32 = 0x0001_0000;

pub mod op {
    pub const EXT_INST_IMPORT: u16 = 11;
    pub const MEMORY_MODEL: u16 = 14;
    pub const ENTRY_POINT: u16 = 15;
    pub const EXECUTION_MODE: u16 = 16;
    pub const CAPABILITY: u16 = 17;
    pub const TYPE_VOID: u16 = 19;
    pub const TYPE_BOOL: u16 = 20;
    pub const TYPE_INT: u16 = 21;
    pub const TYPE_FLOAT: u16 = 22;
    pub const TYPE_VECTOR: u16 = 23;
    pub const TYPE_MATRIX: u16 = 24;
    pub const TYPE_IMAGE: u16 = 25;
    pub const TYPE_SAMPLER: u16 = 26;
    pub const TYPE_SAMPLED_IMAGE: u16 = 27;
    pub const TYPE_ARRAY: u16 = 28;
    pub const TYPE_STRUCT: u16 = 30;
    pub const TYPE_POINTER: u16 = 32;
    pub const TYPE_FUNCTION: u16 = 33;
    pub const CONSTANT: u16 = 43;
    pub const CONSTANT_TRUE: u16 = 41;
    pub const CONSTANT_FALSE: u16 = 42;
    pub const FUNCTION: u16 = 54;
    pub const FUNCTION_PARAMETER: u16 = 55;
    pub const FUNCTION_END: u16 = 56;
    pub const FUNCTION_CALL: u16 = 57;
    pub const VARIABLE: u16 = 59;
    pub const LOAD: u16 = 61;
    pub const STORE: u16 = 62;
    pub const ACCESS_CHAIN: u16 = 65;
    pub const DECORATE: u16 = 71;
    pub const MEMBER_DECORATE: u16 = 72;
    pub const VECTOR_SHUFFLE: u16 = 79;
    pub const COMPOSITE_CONSTRUCT: u16 = 80;
    pub const COMPOSITE_EXTRACT: u16 = 81;
    pub const SAMPLED_IMAGE: u16 = 86;
    pub const IMAGE_SAMPLE_IMPLICIT_LOD: u16 = 87;
    pub const F_NEGATE: u16 = 127;
    pub const I_ADD: u16 = 128;
    pub const F_ADD: u16 = 129;
    pub const I_SUB: u16 = 130;
    pub const F_SUB: u16 = 131;
    pub const I_MUL: u16 = 132;
    pub const F_MUL: u16 = 133;
    pub const F_DIV: u16 = 136;
    pub const F_MOD: u16 = 141;
    pub const VECTOR_TIMES_SCALAR: u16 = 142;
    pub const MATRIX_TIMES_SCALAR: u16 = 143;
    pub const VECTOR_TIMES_MATRIX: u16 = 144;
    pub const MATRIX_TIMES_VECTOR: u16 = 145;
    pub const MATRIX_TIMES_MATRIX: u16 = 146;
    pub const LOGICAL_AND: u16 = 167;
    pub const LOGICAL_OR: u16 = 166;
    pub const LOGICAL_NOT: u16 = 168;
    pub const LOGICAL_EQUAL: u16 = 164;
    pub const LOGICAL_NOT_EQUAL: u16 = 165;
    pub const F_ORD_EQUAL: u16 = 180;
    pub const F_ORD_NOT_EQUAL: u16 = 182;
    pub const F_ORD_LESS_THAN: u16 = 184;
    pub const F_ORD_GREATER_THAN: u16 = 186;
    pub const F_ORD_LESS_THAN_EQUAL: u16 = 188;
    pub const F_ORD_GREATER_THAN_EQUAL: u16 = 190;
    pub const I_EQUAL: u16 = 170;
    pub const I_NOT_EQUAL: u16 = 171;
    pub const S_LESS_THAN: u16 = 177;
    pub const S_GREATER_THAN: u16 = 173;
    pub const BITWISE_OR: u16 = 197;
    pub const BITWISE_XOR: u16 = 198;
    pub const BITWISE_AND: u16 = 199;
    pub const SHIFT_LEFT_LOGICAL: u16 = 196;
    pub const SHIFT_RIGHT_ARITHMETIC: u16 = 195;
    pub const PHI: u16 = 245;
    pub const LOOP_MERGE: u16 = 246;
    pub const SELECTION_MERGE: u16 = 247;
    pub const LABEL: u16 = 248;
    pub const BRANCH: u16 = 249;
    pub const BRANCH_CONDITIONAL: u16 = 250;
    pub const RETURN: u16 = 253;
    pub const RETURN_VALUE: u16 = 254;
}

pub mod addressing_model {
    pub const LOGICAL: u32 = 0;
}
pub mod memory_model {
    pub const GLSL450: u32 = 1;
}
pub mod capability {
    pub const SHADER: u32 = 1;
}
pub mod execution_model {
    pub const VERTEX: u32 = 0;
    pub const FRAGMENT: u32 = 4;
}
pub mod execution_mode {
    pub const ORIGIN_UPPER_LEFT: u32 = 7;
}
pub mod decoration {
    pub const BLOCK: u32 = 2;
    pub const COL_MAJOR: u32 = 5;
    pub const MATRIX_STRIDE: u32 = 7;
    pub const BUILT_IN: u32 = 11;
    pub const LOCATION: u32 = 30;
    pub const BINDING: u32 = 33;
    pub const DESCRIPTOR_SET: u32 = 34;
    pub const OFFSET: u32 = 35;
}
pub mod built_in {
    pub const POSITION: u32 = 0;
}
pub mod storage_class {
    pub const UNIFORM_CONSTANT: u32 = 0;
    pub const INPUT: u32 = 1;
    pub const UNIFORM: u32 = 2;
    pub const OUTPUT: u32 = 3;
    pub const FUNCTION: u32 = 7;
}
pub mod selection_control {
    pub const NONE: u32 = 0;
}
pub mod loop_control {
    pub const NONE: u32 = 0;
}
pub mod function_control {
    pub const NONE: u32 = 0;
}
pub mod dim {
    pub const TWO_D: u32 = 1;
}
pub mod image_format {
    pub const UNKNOWN: u32 = 0;
}

/// Appends `[(word_count << 16) | opcode, operands...]` to `out`, the
/// standard SPIR-V physical-layout instruction header.
pub fn write_instruction(out: &mut Vec<u32>, opcode: u16, operands: &[u32]) {
    let word_count = (1 + operands.len()) as u16;
    out.push(((word_count as u32) << 16) | opcode as u32);
    out.extend_from_slice(operands);
}

/// Packs a `&str` into little-endian words with a NUL terminator, padding the
/// final word with zero bytes, per the SPIR-V literal-string encoding.
pub fn pack_string(s: &str) -> Vec<u32> {
    let bytes = s.as_bytes();
    let mut words = Vec::with_capacity(bytes.len() / 4 + 1);
    let mut chunk = [0u8; 4];
    let mut i = 0;
    loop {
        chunk = [0; 4];
        let mut filled = 0;
        while filled < 4 && i < bytes.len() {
            chunk[filled] = bytes[i];
            i += 1;
            filled += 1;
        }
        let terminated = filled < 4;
        words.push(u32::from_le_bytes(chunk));
        if terminated {
            break;
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_instruction_encodes_word_count_and_opcode() {
        let mut out = Vec::new();
        write_instruction(&mut out, op::RETURN, &[]);
        assert_eq!(out, vec![(1u32 << 16) | op::RETURN as u32]);
    }

    #[test]
    fn pack_string_nul_terminates_and_pads() {
        let words = pack_string("rgba");
        assert_eq!(words.len(), 2);
        assert_eq!(words[1], 0);
    }

    #[test]
    fn pack_string_short_name_fits_one_word() {
        let words = pack_string("ok");
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].to_le_bytes(), [b'o', b'k', 0, 0]);
    }
}
