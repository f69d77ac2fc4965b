//! Module header and instruction decoding.

use crate::ParseError;

/// The five-word header at the start of every module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub generator: u32,
    /// Every id in the module is below this bound.
    pub bound: u32,
}

impl Header {
    /// Number of words the header occupies.
    pub const WORDS: usize = 5;

    /// Oldest version the front-end reads: 1.0.
    const MIN_VERSION: u32 = 0x0001_0000;

    /// Validates and reads the header of `words`.
    pub fn read(words: &[u32]) -> Result<Self, ParseError> {
        let &[magic, version, generator, bound, schema, ..] = words else {
            return Err(ParseError::MissingHeader(words.len()));
        };
        if magic != spirv::MAGIC_NUMBER {
            return Err(ParseError::InvalidMagic(magic));
        }
        if version < Self::MIN_VERSION {
            return Err(ParseError::UnsupportedVersion(version));
        }
        if schema != 0 {
            return Err(ParseError::InvalidSchema(schema));
        }
        Ok(Self {
            version,
            generator,
            bound,
        })
    }
}

/// One decoded instruction.
///
/// Operands are addressed by their word position in the instruction. Word 0
/// holds the opcode and word count, so the first operand is word 1.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Instruction<'a> {
    pub op: spirv::Op,
    words: &'a [u32],
}

impl<'a> Instruction<'a> {
    /// Total number of words, including word 0.
    pub fn count(&self) -> usize {
        self.words.len()
    }

    /// Returns word `index`.
    pub fn word(&self, index: usize) -> Result<u32, ParseError> {
        self.words
            .get(index)
            .copied()
            .ok_or(ParseError::MissingOperand { op: self.op, index })
    }

    /// Returns the words from `index` to the end, empty if there are none.
    pub fn words_from(&self, index: usize) -> &'a [u32] {
        self.words.get(index..).unwrap_or(&[])
    }

    /// Fails unless the instruction has at least `count` words.
    pub fn expect_at_least(&self, count: usize) -> Result<(), ParseError> {
        if self.words.len() < count {
            return Err(ParseError::MissingOperand {
                op: self.op,
                index: count - 1,
            });
        }
        Ok(())
    }

    /// Decodes the nul-terminated literal string starting at word `index`,
    /// returning it with the number of words it occupies.
    pub fn string(&self, index: usize) -> Result<(String, usize), ParseError> {
        let mut bytes = Vec::new();
        for (i, word) in self.words_from(index).iter().enumerate() {
            for byte in word.to_le_bytes() {
                if byte == 0 {
                    return String::from_utf8(bytes)
                        .map(|s| (s, i + 1))
                        .map_err(|_| ParseError::InvalidString(self.op));
                }
                bytes.push(byte);
            }
        }
        Err(ParseError::InvalidString(self.op))
    }
}

/// Splits the words following the header into instructions, skipping
/// `OpNop`.
pub(crate) fn decode(words: &[u32]) -> Result<Vec<Instruction<'_>>, ParseError> {
    let mut instructions = Vec::new();
    let mut offset = 0;
    while offset < words.len() {
        let first = words[offset];
        let count = (first >> 16) as usize;
        let opcode = first & 0xffff;
        let position = offset + Header::WORDS;
        if count == 0 {
            return Err(ParseError::ZeroWordCount(position));
        }
        let inst_words = words
            .get(offset..offset + count)
            .ok_or(ParseError::TruncatedInstruction(position))?;
        let op = spirv::Op::from_u32(opcode).ok_or(ParseError::UnknownOpcode(opcode))?;
        if op != spirv::Op::Nop {
            instructions.push(Instruction {
                op,
                words: inst_words,
            });
        }
        offset += count;
    }
    log::trace!("decoded {} instructions", instructions.len());
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<u32> {
        vec![spirv::MAGIC_NUMBER, 0x0001_0000, 0, 10, 0]
    }

    #[test]
    fn reads_header() {
        let h = Header::read(&header()).unwrap();
        assert_eq!(h.bound, 10);
        assert_eq!(h.version, 0x0001_0000);
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(
            Header::read(&[spirv::MAGIC_NUMBER, 0x10000]),
            Err(ParseError::MissingHeader(2))
        ));
        let mut words = header();
        words[0] = 0xdead_beef;
        assert!(matches!(
            Header::read(&words),
            Err(ParseError::InvalidMagic(0xdead_beef))
        ));
        let mut words = header();
        words[1] = 0x0000_ff00;
        assert!(matches!(
            Header::read(&words),
            Err(ParseError::UnsupportedVersion(_))
        ));
        let mut words = header();
        words[4] = 1;
        assert!(matches!(
            Header::read(&words),
            Err(ParseError::InvalidSchema(1))
        ));
    }

    #[test]
    fn decodes_and_skips_nops() {
        // OpNop, OpCapability Shader, OpReturn
        let words = [1 << 16, (2 << 16) | 17, 1, (1 << 16) | 253];
        let insts = decode(&words).unwrap();
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0].op, spirv::Op::Capability);
        assert_eq!(insts[0].word(1).unwrap(), 1);
        assert!(insts[0].word(2).is_err());
        assert_eq!(insts[1].op, spirv::Op::Return);
    }

    #[test]
    fn rejects_zero_word_count() {
        assert!(matches!(
            decode(&[17]),
            Err(ParseError::ZeroWordCount(5))
        ));
    }

    #[test]
    fn rejects_truncated_instruction() {
        assert!(matches!(
            decode(&[(3 << 16) | 17, 1]),
            Err(ParseError::TruncatedInstruction(5))
        ));
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(matches!(
            decode(&[(1 << 16) | 0xfffe]),
            Err(ParseError::UnknownOpcode(0xfffe))
        ));
    }

    #[test]
    fn decodes_strings() {
        // OpExtInstImport %1 "GLSL.std.450"
        let name = b"GLSL.std.450\0\0\0\0";
        let mut words = vec![(6 << 16) | 11, 1];
        words.extend(
            name.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
        let insts = decode(&words).unwrap();
        let (s, len) = insts[0].string(2).unwrap();
        assert_eq!(s, "GLSL.std.450");
        assert_eq!(len, 4);
    }
}
