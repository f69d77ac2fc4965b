//! Type declarations and block layout.

use spirv::{BuiltIn, Decoration, Dim, Op};
use tessera_ir::{
    ArraySize, Handle, ImageDimension, Scalar, ScalarKind, StorageFormat, StructMember, Type,
    TypeInner, VectorSize,
};

use crate::ParseError;
use crate::builder::Builder;
use crate::reader::Instruction;
use crate::value::Value;

/// A declared type: the IR type plus the layout and builtin information the
/// front-end needs to address it.
#[derive(Clone, Debug)]
pub(crate) struct SpvType {
    pub ty: Handle<Type>,
    /// Array element, matrix column or vector component.
    pub element: Option<Handle<SpvType>>,
    pub members: Vec<Handle<SpvType>>,
    /// Byte offset of each member within a block.
    pub offsets: Vec<u32>,
    /// Array stride, or matrix stride for matrices.
    pub stride: u32,
    pub row_major: bool,
    pub builtin: Option<BuiltIn>,
    /// Set on structs with at least one builtin member.
    pub builtin_block: bool,
    pub block: bool,
    pub buffer_block: bool,
    pub signature: Option<Signature>,
}

#[derive(Clone, Debug)]
pub(crate) struct Signature {
    pub result: Handle<SpvType>,
    pub params: Vec<Handle<SpvType>>,
}

impl SpvType {
    pub fn new(ty: Handle<Type>) -> Self {
        Self {
            ty,
            element: None,
            members: Vec::new(),
            offsets: Vec::new(),
            stride: 0,
            row_major: false,
            builtin: None,
            builtin_block: false,
            block: false,
            buffer_block: false,
            signature: None,
        }
    }

    /// Whether variables of this type are bound to external resources.
    pub fn is_interface(&self, inner: &TypeInner) -> bool {
        self.block || self.buffer_block || inner.is_opaque()
    }
}

impl Builder<'_> {
    pub(crate) fn handle_type(&mut self, inst: &Instruction<'_>) -> Result<(), ParseError> {
        let id = inst.word(1)?;

        let ty = match inst.op {
            Op::TypeVoid => SpvType::new(self.module.insert_type(TypeInner::Void)),
            Op::TypeBool => SpvType::new(self.scalar_type(Scalar::BOOL)),
            Op::TypeInt => {
                let width = inst.word(2)?;
                if width != 32 {
                    return Err(crate::unsupported(format!("{width}-bit integers")));
                }
                let scalar = if inst.word(3)? != 0 {
                    Scalar::I32
                } else {
                    Scalar::U32
                };
                SpvType::new(self.scalar_type(scalar))
            }
            Op::TypeFloat => {
                let width = inst.word(2)?;
                if width != 32 {
                    return Err(crate::unsupported(format!("{width}-bit floats")));
                }
                SpvType::new(self.scalar_type(Scalar::F32))
            }
            Op::TypeVector => {
                let component = self.values.ty(inst.word(2)?)?;
                let count = inst.word(3)?;
                let TypeInner::Scalar(scalar) = self.module.types[self.types[component].ty].inner
                else {
                    return Err(crate::malformed(format!("vector {id} of non-scalar components")));
                };
                let size = VectorSize::new(count)
                    .ok_or_else(|| crate::malformed(format!("vector {id} of {count} components")))?;
                let mut ty =
                    SpvType::new(self.module.insert_type(TypeInner::Vector { size, scalar }));
                ty.element = Some(component);
                ty
            }
            Op::TypeMatrix => {
                let column = self.values.ty(inst.word(2)?)?;
                let count = inst.word(3)?;
                let TypeInner::Vector { size: rows, scalar } =
                    self.module.types[self.types[column].ty].inner
                else {
                    return Err(crate::malformed(format!("matrix {id} of non-vector columns")));
                };
                if scalar.kind != ScalarKind::Float {
                    return Err(crate::malformed(format!("matrix {id} of non-float columns")));
                }
                let columns = VectorSize::new(count)
                    .ok_or_else(|| crate::malformed(format!("matrix {id} of {count} columns")))?;
                let mut ty = SpvType::new(self.module.insert_type(TypeInner::Matrix {
                    columns,
                    rows,
                    scalar,
                }));
                ty.element = Some(column);
                ty
            }
            Op::TypeArray | Op::TypeRuntimeArray => {
                let element = self.values.ty(inst.word(2)?)?;
                let size = if inst.op == Op::TypeArray {
                    let (_, length) = self.values.constant(inst.word(3)?)?;
                    match self.constants[length].values[..] {
                        [len] if len > 0 => ArraySize::Constant(len),
                        _ => {
                            return Err(crate::malformed(format!(
                                "array {id} has an invalid length"
                            )));
                        }
                    }
                } else {
                    ArraySize::Dynamic
                };
                let base = self.types[element].ty;
                let mut ty = SpvType::new(self.module.insert_type(TypeInner::Array { base, size }));
                ty.element = Some(element);
                ty
            }
            Op::TypeStruct => self.struct_type(id, inst.words_from(2))?,
            Op::TypeFunction => {
                let result = self.values.ty(inst.word(2)?)?;
                let params = inst
                    .words_from(3)
                    .iter()
                    .map(|&p| self.values.ty(p))
                    .collect::<Result<Vec<_>, _>>()?;
                let inner = TypeInner::Function {
                    result: self.types[result].ty,
                    parameters: params.iter().map(|&p| self.types[p].ty).collect(),
                };
                let mut ty = SpvType::new(self.module.insert_type(inner));
                ty.signature = Some(Signature { result, params });
                ty
            }
            Op::TypePointer => {
                // Pointers are represented by the type they point to.
                let pointee = self.values.ty(inst.word(3)?)?;
                return self.values.push(id, Value::Type(pointee));
            }
            Op::TypeSampledImage => {
                let image = self.values.ty(inst.word(2)?)?;
                return self.values.push(id, Value::Type(image));
            }
            Op::TypeImage => self.image_type(id, inst)?,
            Op::TypeSampler => SpvType::new(self.module.insert_type(TypeInner::Sampler)),
            other => return Err(crate::unsupported(format!("{other:?}"))),
        };

        let handle = self.types.append(ty);
        self.values.push(id, Value::Type(handle))?;
        self.apply_type_decorations(id, handle)
    }

    fn image_type(&mut self, id: u32, inst: &Instruction<'_>) -> Result<SpvType, ParseError> {
        inst.expect_at_least(9)?;
        let sampled = self.values.ty(inst.word(2)?)?;
        let kind = match self.module.types[self.types[sampled].ty].inner {
            TypeInner::Scalar(scalar) | TypeInner::Vector { scalar, .. } => scalar.kind,
            _ => {
                return Err(crate::malformed(format!(
                    "image {id} has a non-numeric sampled type"
                )));
            }
        };
        let dim = match Dim::from_u32(inst.word(3)?) {
            Some(Dim::Dim1D) => ImageDimension::D1,
            Some(Dim::Dim2D) => ImageDimension::D2,
            Some(Dim::Dim3D) => ImageDimension::D3,
            Some(Dim::DimCube) => ImageDimension::Cube,
            Some(Dim::DimRect) => ImageDimension::Rect,
            Some(Dim::DimBuffer) => ImageDimension::Buffer,
            other => return Err(crate::unsupported(format!("image dimension {other:?}"))),
        };
        let shadow = inst.word(4)? == 1;
        let arrayed = inst.word(5)? != 0;
        if inst.word(6)? != 0 {
            return Err(crate::unsupported("multisampled images"));
        }
        let format = crate::formats::storage_format(inst.word(8)?)?;
        let inner = match inst.word(7)? {
            1 => TypeInner::SampledImage {
                dim,
                arrayed,
                shadow,
                kind,
            },
            2 => {
                if format == StorageFormat::Unknown {
                    return Err(crate::malformed(format!("storage image {id} has no format")));
                }
                if shadow {
                    return Err(crate::malformed(format!("storage image {id} is a depth image")));
                }
                TypeInner::StorageImage {
                    dim,
                    arrayed,
                    kind,
                    format,
                }
            }
            _ => return Err(crate::unsupported("images not known to be sampled or storage")),
        };
        Ok(SpvType::new(self.module.insert_type(inner)))
    }

    fn struct_type(&mut self, id: u32, member_ids: &[u32]) -> Result<SpvType, ParseError> {
        let mut members = member_ids
            .iter()
            .map(|&m| self.values.ty(m))
            .collect::<Result<Vec<_>, _>>()?;
        let mut offsets = vec![0; members.len()];
        let mut copied = vec![false; members.len()];
        let mut builtin_block = false;

        for dec in self.values.decorations(id)? {
            let Some(member) = dec.member else { continue };
            let index = member as usize;
            if index >= members.len() {
                return Err(crate::malformed(format!(
                    "decoration of member {member} of struct {id} with {} members",
                    members.len()
                )));
            }
            match dec.decoration {
                Decoration::Offset => offsets[index] = dec.literal(0)?,
                Decoration::BuiltIn => {
                    let word = dec.literal(0)?;
                    let builtin = BuiltIn::from_u32(word)
                        .ok_or_else(|| crate::malformed(format!("unknown builtin {word}")))?;
                    let ty = self.member_for_update(&mut members, &mut copied, index);
                    self.types[ty].builtin = Some(builtin);
                    builtin_block = true;
                }
                Decoration::MatrixStride | Decoration::RowMajor | Decoration::ColMajor => {
                    let ty = self.member_for_update(&mut members, &mut copied, index);
                    let matrix = self.innermost_element(ty);
                    match dec.decoration {
                        Decoration::MatrixStride => self.types[matrix].stride = dec.literal(0)?,
                        Decoration::RowMajor => self.types[matrix].row_major = true,
                        _ => self.types[matrix].row_major = false,
                    }
                }
                Decoration::Location
                | Decoration::NoPerspective
                | Decoration::Flat
                | Decoration::Centroid
                | Decoration::Sample
                | Decoration::RelaxedPrecision
                | Decoration::Invariant
                | Decoration::NonWritable
                | Decoration::NonReadable
                | Decoration::Coherent
                | Decoration::Volatile
                | Decoration::Restrict => {}
                other => {
                    return Err(crate::unsupported(format!("member decoration {other:?}")));
                }
            }
        }

        let member_names = self
            .values
            .slot(id)?
            .map(|slot| slot.member_names.clone())
            .unwrap_or_default();
        let ir_members = members
            .iter()
            .zip(&offsets)
            .enumerate()
            .map(|(i, (&member, &offset))| {
                let name = member_names
                    .iter()
                    .find(|(m, _)| *m as usize == i)
                    .map(|(_, name)| name.clone())
                    .unwrap_or_else(|| format!("field{i}"));
                StructMember {
                    name: Some(name),
                    ty: self.types[member].ty,
                    offset,
                }
            })
            .collect();
        let ty = self.module.types.insert(Type {
            name: self.values.name(id),
            inner: TypeInner::Struct {
                members: ir_members,
            },
        });

        let mut spv = SpvType::new(ty);
        spv.members = members;
        spv.offsets = offsets;
        spv.builtin_block = builtin_block;
        Ok(spv)
    }

    /// Gives struct member `index` a private copy of its type, down through
    /// any arrays, the first time one of its decorations changes it.
    fn member_for_update(
        &mut self,
        members: &mut [Handle<SpvType>],
        copied: &mut [bool],
        index: usize,
    ) -> Handle<SpvType> {
        if !copied[index] {
            members[index] = self.copy_through_arrays(members[index]);
            copied[index] = true;
        }
        members[index]
    }

    fn copy_through_arrays(&mut self, ty: Handle<SpvType>) -> Handle<SpvType> {
        let mut copy = self.types[ty].clone();
        if let TypeInner::Array { .. } = self.module.types[copy.ty].inner {
            if let Some(element) = copy.element {
                copy.element = Some(self.copy_through_arrays(element));
            }
        }
        self.types.append(copy)
    }

    /// Follows array elements down to the first non-array type.
    pub(crate) fn innermost_element(&self, mut ty: Handle<SpvType>) -> Handle<SpvType> {
        while let (TypeInner::Array { .. }, Some(element)) =
            (&self.module.types[self.types[ty].ty].inner, self.types[ty].element)
        {
            ty = element;
        }
        ty
    }

    fn apply_type_decorations(&mut self, id: u32, ty: Handle<SpvType>) -> Result<(), ParseError> {
        for dec in self.values.decorations(id)? {
            if dec.member.is_some() {
                continue;
            }
            match dec.decoration {
                Decoration::ArrayStride => self.types[ty].stride = dec.literal(0)?,
                Decoration::Block => self.types[ty].block = true,
                Decoration::BufferBlock => self.types[ty].buffer_block = true,
                Decoration::GLSLShared | Decoration::GLSLPacked => {}
                Decoration::Stream => {
                    if dec.literal(0)? != 0 {
                        return Err(crate::unsupported("geometry streams other than 0"));
                    }
                }
                other => return Err(crate::unsupported(format!("type decoration {other:?}"))),
            }
        }
        Ok(())
    }

    /// Size in bytes of `ty` inside an external block.
    pub(crate) fn block_size(&self, ty: Handle<SpvType>) -> Result<u32, ParseError> {
        let overflow = || crate::malformed("block size overflows u32");
        let spv = &self.types[ty];
        match self.module.types[spv.ty].inner {
            TypeInner::Scalar(_) | TypeInner::Vector { .. } | TypeInner::Matrix { .. } => {
                let (components, columns) = match self.module.types[spv.ty].inner {
                    TypeInner::Vector { size, .. } => (size as u32, 1),
                    TypeInner::Matrix { columns, rows, .. } => (rows as u32, columns as u32),
                    _ => (1, 1),
                };
                let cols = if spv.row_major { components } else { columns };
                if cols > 1 {
                    if spv.stride == 0 {
                        return Err(crate::malformed("matrix in a block without a stride"));
                    }
                    spv.stride.checked_mul(cols).ok_or_else(overflow)
                } else {
                    Ok(components * 4)
                }
            }
            TypeInner::Struct { .. } => spv
                .members
                .iter()
                .zip(&spv.offsets)
                .try_fold(0u32, |size, (&member, &offset)| {
                    let end = offset
                        .checked_add(self.block_size(member)?)
                        .ok_or_else(overflow)?;
                    Ok(size.max(end))
                }),
            TypeInner::Array {
                size: ArraySize::Constant(len),
                ..
            } if spv.stride > 0 => spv.stride.checked_mul(len).ok_or_else(overflow),
            TypeInner::Array { .. } => Err(crate::malformed(
                "array in a block without a stride or length",
            )),
            _ => Err(crate::malformed("type cannot be stored in a block")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Options;
    use crate::reader::Header;

    fn builder(options: &Options) -> Builder<'_> {
        let header = Header {
            version: 0x10000,
            generator: 0,
            bound: 64,
        };
        Builder::new(header, &[], "main", options).unwrap()
    }

    fn declare(b: &mut Builder<'_>, words: &[u32]) -> Handle<SpvType> {
        let insts = crate::reader::decode(words).unwrap();
        let id = insts[0].word(1).unwrap();
        b.handle_type(&insts[0]).unwrap();
        b.values.ty(id).unwrap()
    }

    fn op(op: Op, operands: &[u32]) -> Vec<u32> {
        let mut words = vec![((operands.len() as u32 + 1) << 16) | op as u32];
        words.extend_from_slice(operands);
        words
    }

    #[test]
    fn vec4_array_block_size() {
        let options = Options::default();
        let mut b = builder(&options);
        let int = declare(&mut b, &op(Op::TypeInt, &[1, 32, 1]));
        let vec4 = declare(&mut b, &op(Op::TypeVector, &[2, 1, 4]));
        let words = op(Op::Constant, &[1, 3, 10]);
        let insts = crate::reader::decode(&words).unwrap();
        b.handle_constant(&insts[0]).unwrap();
        b.values
            .add_decoration(
                4,
                crate::decoration::Decoration::new(
                    crate::decoration::Scope::Value,
                    Decoration::ArrayStride as u32,
                    &[16],
                ),
            )
            .unwrap();
        let array = declare(&mut b, &op(Op::TypeArray, &[4, 2, 3]));
        assert_eq!(b.block_size(int).unwrap(), 4);
        assert_eq!(b.block_size(vec4).unwrap(), 16);
        assert_eq!(b.block_size(array).unwrap(), 160);
    }

    #[test]
    fn oversized_block_is_an_error() {
        let options = Options::default();
        let mut b = builder(&options);
        declare(&mut b, &op(Op::TypeInt, &[1, 32, 1]));
        let words = op(Op::Constant, &[1, 2, 0x2000_0000]);
        let insts = crate::reader::decode(&words).unwrap();
        b.handle_constant(&insts[0]).unwrap();
        b.values
            .add_decoration(
                3,
                crate::decoration::Decoration::new(
                    crate::decoration::Scope::Value,
                    Decoration::ArrayStride as u32,
                    &[16],
                ),
            )
            .unwrap();
        let array = declare(&mut b, &op(Op::TypeArray, &[3, 1, 2]));
        assert!(matches!(b.block_size(array), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn member_decorations_copy_shared_types() {
        let options = Options::default();
        let mut b = builder(&options);
        declare(&mut b, &op(Op::TypeFloat, &[1, 32]));
        declare(&mut b, &op(Op::TypeVector, &[2, 1, 4]));
        let mat = declare(&mut b, &op(Op::TypeMatrix, &[3, 2, 4]));
        for (scope, kind, lits) in [
            (crate::decoration::Scope::Member(0), Decoration::Offset, vec![0]),
            (crate::decoration::Scope::Member(0), Decoration::MatrixStride, vec![16]),
            (crate::decoration::Scope::Member(0), Decoration::RowMajor, vec![]),
            (crate::decoration::Scope::Member(1), Decoration::Offset, vec![64]),
            (crate::decoration::Scope::Member(1), Decoration::MatrixStride, vec![16]),
        ] {
            b.values
                .add_decoration(
                    4,
                    crate::decoration::Decoration::new(scope, kind as u32, &lits),
                )
                .unwrap();
        }
        let st = declare(&mut b, &op(Op::TypeStruct, &[4, 3, 3]));

        let members = b.types[st].members.clone();
        assert_ne!(members[0], mat);
        assert_ne!(members[1], mat);
        assert_ne!(members[0], members[1]);
        assert!(b.types[members[0]].row_major);
        assert!(!b.types[members[1]].row_major);
        assert_eq!(b.types[mat].stride, 0);
        assert_eq!(b.block_size(st).unwrap(), 128);
    }

    #[test]
    fn builtin_members_mark_the_block() {
        let options = Options::default();
        let mut b = builder(&options);
        let float = declare(&mut b, &op(Op::TypeFloat, &[1, 32]));
        let vec4 = declare(&mut b, &op(Op::TypeVector, &[2, 1, 4]));
        b.values
            .add_decoration(
                3,
                crate::decoration::Decoration::new(
                    crate::decoration::Scope::Member(0),
                    Decoration::BuiltIn as u32,
                    &[BuiltIn::Position as u32],
                ),
            )
            .unwrap();
        let st = declare(&mut b, &op(Op::TypeStruct, &[3, 2, 1]));
        let spv = &b.types[st];
        assert!(spv.builtin_block);
        assert_eq!(b.types[spv.members[0]].builtin, Some(BuiltIn::Position));
        assert_eq!(b.types[spv.members[1]].builtin, None);
        assert_eq!(spv.members[1], float);
        assert_eq!(b.types[vec4].builtin, None);
    }

    #[test]
    fn rejects_wide_scalars() {
        let options = Options::default();
        let mut b = builder(&options);
        let words = op(Op::TypeFloat, &[1, 64]);
        let insts = crate::reader::decode(&words).unwrap();
        assert!(matches!(
            b.handle_type(&insts[0]),
            Err(ParseError::Unsupported(_))
        ));
    }

    #[test]
    fn member_names_fall_back_to_field_index() {
        let options = Options::default();
        let mut b = builder(&options);
        declare(&mut b, &op(Op::TypeFloat, &[1, 32]));
        b.values
            .slot_mut(2)
            .unwrap()
            .member_names
            .push((1, "weight".into()));
        let st = declare(&mut b, &op(Op::TypeStruct, &[2, 1, 1]));
        let TypeInner::Struct { ref members } = b.module.types[b.types[st].ty].inner else {
            panic!("not a struct");
        };
        assert_eq!(members[0].name.as_deref(), Some("field0"));
        assert_eq!(members[1].name.as_deref(), Some("weight"));
    }
}
