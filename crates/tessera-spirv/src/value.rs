//! The id-indexed value table.

use std::fmt;

use tessera_ir::{Deref, Handle, Instruction};

use crate::ParseError;
use crate::constant::Constant;
use crate::decoration::Decoration;
use crate::ssa::SsaValue;
use crate::types::SpvType;

/// Extended instruction sets the front-end can import.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExtendedSet {
    Glsl450,
}

/// An image and sampler used together by texture instructions.
///
/// `image` is `None` when the operand was a combined image-sampler
/// variable, in which case `sampler` refers to it.
#[derive(Clone, Debug)]
pub(crate) struct SampledImage {
    pub image: Option<Deref>,
    pub image_type: Option<Handle<SpvType>>,
    pub sampler: Deref,
}

/// A texel of a storage image, addressed for atomics.
#[derive(Clone, Debug)]
pub(crate) struct ImagePointer {
    pub image: Deref,
    pub coordinate: Handle<Instruction>,
    pub sample: Handle<Instruction>,
}

/// Everything an id can name.
#[derive(Clone, Debug)]
pub(crate) enum Value {
    Type(Handle<SpvType>),
    Constant {
        ty: Handle<SpvType>,
        constant: Handle<Constant>,
    },
    Ssa(Handle<SsaValue>),
    Deref {
        chain: Deref,
        ty: Handle<SpvType>,
    },
    Function(Handle<tessera_ir::Function>),
    Block(Handle<tessera_ir::Block>),
    String(String),
    ExtensionImport(ExtendedSet),
    DecorationGroup,
    SampledImage(SampledImage),
    ImagePointer(ImagePointer),
    Undef(Handle<SpvType>),
}

/// The kind of a [`Value`], reported by lookup errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Type,
    Constant,
    Ssa,
    Deref,
    Function,
    Block,
    String,
    ExtensionImport,
    DecorationGroup,
    SampledImage,
    ImagePointer,
    Undef,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Type => "type",
            Self::Constant => "constant",
            Self::Ssa => "SSA value",
            Self::Deref => "pointer",
            Self::Function => "function",
            Self::Block => "block",
            Self::String => "string",
            Self::ExtensionImport => "extended instruction set",
            Self::DecorationGroup => "decoration group",
            Self::SampledImage => "sampled image",
            Self::ImagePointer => "image pointer",
            Self::Undef => "undef",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Type(_) => ValueKind::Type,
            Self::Constant { .. } => ValueKind::Constant,
            Self::Ssa(_) => ValueKind::Ssa,
            Self::Deref { .. } => ValueKind::Deref,
            Self::Function(_) => ValueKind::Function,
            Self::Block(_) => ValueKind::Block,
            Self::String(_) => ValueKind::String,
            Self::ExtensionImport(_) => ValueKind::ExtensionImport,
            Self::DecorationGroup => ValueKind::DecorationGroup,
            Self::SampledImage(_) => ValueKind::SampledImage,
            Self::ImagePointer(_) => ValueKind::ImagePointer,
            Self::Undef(_) => ValueKind::Undef,
        }
    }
}

/// Per-id storage: the value plus debug names and decorations, which may
/// arrive before the value itself.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    pub value: Option<Value>,
    pub name: Option<String>,
    pub member_names: Vec<(u32, String)>,
    pub decorations: Vec<Decoration>,
}

#[derive(Debug)]
pub(crate) struct ValueTable {
    bound: u32,
    /// Grown on demand up to `bound`.
    slots: Vec<Slot>,
}

/// Largest id bound accepted.
const MAX_BOUND: u32 = 1 << 22;

impl ValueTable {
    pub fn new(bound: u32) -> Result<Self, ParseError> {
        if bound > MAX_BOUND {
            return Err(crate::unsupported(format!(
                "id bound {bound} exceeds {MAX_BOUND}"
            )));
        }
        Ok(Self {
            bound,
            slots: Vec::new(),
        })
    }

    fn check(&self, id: u32) -> Result<(), ParseError> {
        if id >= self.bound {
            return Err(ParseError::IdOutOfBounds {
                id,
                bound: self.bound,
            });
        }
        Ok(())
    }

    /// Returns the slot of `id`, or `None` if nothing was recorded for it.
    pub fn slot(&self, id: u32) -> Result<Option<&Slot>, ParseError> {
        self.check(id)?;
        Ok(self.slots.get(id as usize))
    }

    pub fn slot_mut(&mut self, id: u32) -> Result<&mut Slot, ParseError> {
        self.check(id)?;
        let index = id as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, Slot::default);
        }
        Ok(&mut self.slots[index])
    }

    /// Defines `id`; an id can only be defined once.
    pub fn push(&mut self, id: u32, value: Value) -> Result<(), ParseError> {
        let slot = self.slot_mut(id)?;
        if slot.value.is_some() {
            return Err(ParseError::DuplicateDefinition(id));
        }
        slot.value = Some(value);
        Ok(())
    }

    pub fn get_untyped(&self, id: u32) -> Result<&Value, ParseError> {
        self.slot(id)?
            .and_then(|slot| slot.value.as_ref())
            .ok_or(ParseError::UndefinedValue(id))
    }

    pub fn name(&self, id: u32) -> Option<String> {
        self.slots.get(id as usize).and_then(|s| s.name.clone())
    }

    fn mismatch(&self, id: u32, expected: ValueKind) -> ParseError {
        match self.get_untyped(id) {
            Ok(value) => ParseError::WrongValueKind {
                id,
                expected,
                found: value.kind(),
            },
            Err(err) => err,
        }
    }

    pub fn ty(&self, id: u32) -> Result<Handle<SpvType>, ParseError> {
        match *self.get_untyped(id)? {
            Value::Type(ty) => Ok(ty),
            _ => Err(self.mismatch(id, ValueKind::Type)),
        }
    }

    pub fn constant(&self, id: u32) -> Result<(Handle<SpvType>, Handle<Constant>), ParseError> {
        match *self.get_untyped(id)? {
            Value::Constant { ty, constant } => Ok((ty, constant)),
            _ => Err(self.mismatch(id, ValueKind::Constant)),
        }
    }

    pub fn deref(&self, id: u32) -> Result<(&Deref, Handle<SpvType>), ParseError> {
        match *self.get_untyped(id)? {
            Value::Deref { ref chain, ty } => Ok((chain, ty)),
            _ => Err(self.mismatch(id, ValueKind::Deref)),
        }
    }

    pub fn function(&self, id: u32) -> Result<Handle<tessera_ir::Function>, ParseError> {
        match *self.get_untyped(id)? {
            Value::Function(f) => Ok(f),
            _ => Err(self.mismatch(id, ValueKind::Function)),
        }
    }

    pub fn block(&self, id: u32) -> Result<Handle<tessera_ir::Block>, ParseError> {
        match *self.get_untyped(id)? {
            Value::Block(b) => Ok(b),
            _ => Err(self.mismatch(id, ValueKind::Block)),
        }
    }

    pub fn extended_set(&self, id: u32) -> Result<ExtendedSet, ParseError> {
        match *self.get_untyped(id)? {
            Value::ExtensionImport(set) => Ok(set),
            _ => Err(self.mismatch(id, ValueKind::ExtensionImport)),
        }
    }

    pub fn image_pointer(&self, id: u32) -> Result<&ImagePointer, ParseError> {
        match *self.get_untyped(id)? {
            Value::ImagePointer(ref ptr) => Ok(ptr),
            _ => Err(self.mismatch(id, ValueKind::ImagePointer)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_rejects_redefinition() {
        let mut table = ValueTable::new(4).unwrap();
        table.push(1, Value::DecorationGroup).unwrap();
        assert!(matches!(
            table.push(1, Value::String("x".into())),
            Err(ParseError::DuplicateDefinition(1))
        ));
    }

    #[test]
    fn lookups_check_bounds_and_kind() {
        let mut table = ValueTable::new(4).unwrap();
        table.push(2, Value::String("main.frag".into())).unwrap();
        assert!(matches!(
            table.get_untyped(7),
            Err(ParseError::IdOutOfBounds { id: 7, bound: 4 })
        ));
        assert!(matches!(
            table.get_untyped(3),
            Err(ParseError::UndefinedValue(3))
        ));
        assert!(matches!(
            table.ty(2),
            Err(ParseError::WrongValueKind {
                id: 2,
                expected: ValueKind::Type,
                found: ValueKind::String
            })
        ));
    }

    #[test]
    fn names_may_precede_definitions() {
        let mut table = ValueTable::new(3).unwrap();
        table.slot_mut(1).unwrap().name = Some("color".into());
        assert_eq!(table.name(1).as_deref(), Some("color"));
        table.push(1, Value::DecorationGroup).unwrap();
        assert_eq!(table.get_untyped(1).unwrap().kind(), ValueKind::DecorationGroup);
    }
}
