//! SPIR-V front-end for Tessera.
//!
//! Translates one entry point of a SPIR-V module into a
//! [`tessera_ir::Shader`]. The translation runs in phases over the decoded
//! instruction stream:
//!
//! 1. a preamble pass collecting capabilities, the entry point, names and
//!    decorations,
//! 2. the entry point's execution modes, applied to the shader metadata,
//! 3. a declarations pass building types, constants and module-scope
//!    variables,
//! 4. a control-flow pass discovering every function and block,
//! 5. per function, a body pass emitting SSA instructions followed by phi
//!    resolution.
//!
//! Malformed input and unsupported constructs abort the translation with a
//! [`ParseError`]; there is no partial result.

mod alu;
mod builder;
mod builtins;
mod cfg;
mod composite;
mod constant;
mod decoration;
mod formats;
mod glsl450;
mod image;
mod matrix;
mod phi;
mod reader;
mod ssa;
mod texture;
mod types;
mod value;
mod variable;

pub use reader::Header;
pub use value::ValueKind;

/// Translation options.
#[derive(Clone, Debug)]
pub struct Options {
    /// Reject capabilities and extensions the front-end does not know.
    /// When `false` they are only logged.
    pub strict_capabilities: bool,
    /// Route edges from multi-successor blocks into multi-predecessor blocks
    /// through a new block of their own.
    pub split_critical_edges: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            strict_capabilities: true,
            split_critical_edges: true,
        }
    }
}

/// Translates the entry point named `entry_point` of a SPIR-V module.
pub fn parse(
    words: &[u32],
    entry_point: &str,
    options: &Options,
) -> Result<tessera_ir::Shader, ParseError> {
    let header = Header::read(words)?;
    log::debug!(
        "SPIR-V {}.{} generated by {:#x}, id bound {}",
        header.version >> 16,
        (header.version >> 8) & 0xff,
        header.generator,
        header.bound
    );
    let instructions = reader::decode(&words[Header::WORDS..])?;
    builder::Builder::new(header, &instructions, entry_point, options)?.translate()
}

/// Translates a SPIR-V module given as bytes, in either byte order.
pub fn parse_bytes(
    bytes: &[u8],
    entry_point: &str,
    options: &Options,
) -> Result<tessera_ir::Shader, ParseError> {
    if bytes.len() % 4 != 0 {
        return Err(ParseError::InvalidLength(bytes.len()));
    }
    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if words.first() == Some(&spirv::MAGIC_NUMBER.swap_bytes()) {
        for word in &mut words {
            *word = word.swap_bytes();
        }
    }
    parse(&words, entry_point, options)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("module is {0} bytes long, which is not a whole number of words")]
    InvalidLength(usize),
    #[error("module is too short to hold a header ({0} words)")]
    MissingHeader(usize),
    #[error("invalid magic number {0:#010x}")]
    InvalidMagic(u32),
    #[error("unsupported SPIR-V version {0:#x}")]
    UnsupportedVersion(u32),
    #[error("reserved header word is {0}, expected 0")]
    InvalidSchema(u32),
    #[error("instruction at word {0} has a word count of zero")]
    ZeroWordCount(usize),
    #[error("instruction at word {0} runs past the end of the module")]
    TruncatedInstruction(usize),
    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),
    #[error("{op:?} has no operand word {index}")]
    MissingOperand { op: spirv::Op, index: usize },
    #[error("{0:?} has an unterminated or non-UTF-8 literal string")]
    InvalidString(spirv::Op),
    #[error("id {id} is out of bounds (bound {bound})")]
    IdOutOfBounds { id: u32, bound: u32 },
    #[error("id {0} is defined twice")]
    DuplicateDefinition(u32),
    #[error("id {0} is used before it is defined")]
    UndefinedValue(u32),
    #[error("id {id} is a {found}, expected a {expected}")]
    WrongValueKind {
        id: u32,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("decoration group {0} includes itself")]
    DecorationGroupCycle(u32),
    #[error("entry point `{0}` not found")]
    MissingEntryPoint(String),
    #[error("entry point `{0}` is declared more than once")]
    DuplicateEntryPoint(String),
    #[error("unsupported capability {0:?}")]
    UnsupportedCapability(spirv::Capability),
    #[error("unsupported extension `{0}`")]
    UnsupportedExtension(String),
    #[error("unsupported extended instruction set `{0}`")]
    UnsupportedExtInstSet(String),
    #[error("unknown image format {0}")]
    UnknownImageFormat(u32),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("malformed module: {0}")]
    Malformed(String),
}

pub(crate) fn unsupported(what: impl Into<String>) -> ParseError {
    ParseError::Unsupported(what.into())
}

pub(crate) fn malformed(what: impl Into<String>) -> ParseError {
    ParseError::Malformed(what.into())
}
