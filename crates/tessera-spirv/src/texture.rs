//! Sampling, fetches and texture queries.

use spirv::{ImageOperands, Op};
use tessera_ir::{
    BinaryOp, Handle, Instruction, Lane, Operation, ScalarKind, TextureOp, TextureQuery,
    TextureSource, TextureSourceKind, TypeInner,
};

use crate::ParseError;
use crate::builder::Builder;
use crate::reader::Instruction as SpvInstruction;
use crate::ssa::SsaValue;
use crate::value::{SampledImage, Value};

/// Operand layout of a texture opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Layout {
    op: TextureOp,
    coordinate: bool,
    depth_reference: bool,
    projective: bool,
    /// A gather component operand follows the coordinate.
    component: bool,
    /// A level-of-detail operand follows the image.
    lod: bool,
}

fn layout(op: Op) -> Result<Layout, ParseError> {
    let base = Layout {
        op: TextureOp::Sample,
        coordinate: true,
        depth_reference: false,
        projective: false,
        component: false,
        lod: false,
    };
    Ok(match op {
        Op::ImageSampleImplicitLod => base,
        Op::ImageSampleExplicitLod => Layout {
            op: TextureOp::SampleLod,
            ..base
        },
        Op::ImageSampleDrefImplicitLod => Layout {
            depth_reference: true,
            ..base
        },
        Op::ImageSampleDrefExplicitLod => Layout {
            op: TextureOp::SampleLod,
            depth_reference: true,
            ..base
        },
        Op::ImageSampleProjImplicitLod => Layout {
            projective: true,
            ..base
        },
        Op::ImageSampleProjExplicitLod => Layout {
            op: TextureOp::SampleLod,
            projective: true,
            ..base
        },
        Op::ImageSampleProjDrefImplicitLod => Layout {
            depth_reference: true,
            projective: true,
            ..base
        },
        Op::ImageSampleProjDrefExplicitLod => Layout {
            op: TextureOp::SampleLod,
            depth_reference: true,
            projective: true,
            ..base
        },
        Op::ImageFetch => Layout {
            op: TextureOp::Fetch,
            ..base
        },
        Op::ImageGather => Layout {
            op: TextureOp::Gather,
            component: true,
            ..base
        },
        Op::ImageDrefGather => Layout {
            op: TextureOp::Gather,
            depth_reference: true,
            ..base
        },
        Op::ImageQueryLod => Layout {
            op: TextureOp::QueryLod,
            ..base
        },
        Op::ImageQuerySizeLod => Layout {
            op: TextureOp::QuerySize,
            coordinate: false,
            lod: true,
            ..base
        },
        Op::ImageQuerySize => Layout {
            op: TextureOp::QuerySize,
            coordinate: false,
            ..base
        },
        Op::ImageQueryLevels => Layout {
            op: TextureOp::QueryLevels,
            coordinate: false,
            ..base
        },
        Op::ImageQuerySamples => return Err(crate::unsupported("OpImageQuerySamples")),
        other => return Err(crate::malformed(format!("{other:?} is not a texture instruction"))),
    })
}

impl Builder<'_> {
    pub(crate) fn handle_texture(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let id = inst.word(2)?;
        if inst.op == Op::SampledImage {
            let (image, image_type) = self.values.deref(inst.word(3)?)?;
            let (image, image_type) = (image.clone(), image_type);
            let (sampler, _) = self.values.deref(inst.word(4)?)?;
            let sampler = sampler.clone();
            return self.values.push(
                id,
                Value::SampledImage(SampledImage {
                    image: Some(image),
                    image_type: Some(image_type),
                    sampler,
                }),
            );
        }

        let layout = layout(inst.op)?;
        let (_, ty) = self.result_type(inst)?;
        let sampled = self.sampled_image(inst.word(3)?)?;
        let image_ty = self
            .module
            .deref_type(sampled.image.as_ref().unwrap_or(&sampled.sampler));
        let TypeInner::SampledImage {
            dim,
            arrayed,
            shadow,
            kind,
        } = self.module.types[image_ty].inner
        else {
            return Err(crate::malformed(format!(
                "texture instruction {id} on a non-sampled image"
            )));
        };

        let mut sources = Vec::new();
        let mut next = 4;
        let mut coordinate_components = 0;
        if layout.coordinate {
            let mut coordinate = self.ssa_leaf(inst.word(next)?)?;
            next += 1;
            if layout.projective {
                coordinate = self.project(coordinate)?;
            }
            coordinate_components = self.def_components(coordinate)?;
            sources.push(TextureSource {
                kind: TextureSourceKind::Coordinate,
                value: coordinate,
            });
        }
        if layout.depth_reference {
            let value = self.ssa_leaf(inst.word(next)?)?;
            next += 1;
            sources.push(TextureSource {
                kind: TextureSourceKind::DepthReference,
                value,
            });
        }
        let mut component = 0;
        if layout.component {
            let (_, constant) = self.values.constant(inst.word(next)?)?;
            next += 1;
            let selected = self.scalar_constant(constant)?;
            if selected > 3 {
                return Err(crate::malformed(format!("gather of component {selected}")));
            }
            component = selected as u8;
        }
        if layout.lod {
            let value = self.ssa_leaf(inst.word(next)?)?;
            next += 1;
            sources.push(TextureSource {
                kind: TextureSourceKind::Lod,
                value,
            });
        }

        let mut op = layout.op;
        if next < inst.count() {
            let mask = inst.word(next)?;
            next += 1;
            let operands = ImageOperands::from_bits(mask)
                .ok_or_else(|| crate::malformed(format!("unknown image operands {mask:#x}")))?;
            if operands.intersects(ImageOperands::CONST_OFFSETS | ImageOperands::MIN_LOD) {
                return Err(crate::unsupported(format!("image operands {operands:?}")));
            }

            let mut source = |b: &mut Self, kind| -> Result<(), ParseError> {
                let value = b.ssa_leaf(inst.word(next)?)?;
                next += 1;
                sources.push(TextureSource { kind, value });
                Ok(())
            };
            if operands.contains(ImageOperands::BIAS) {
                if op != TextureOp::Sample {
                    return Err(crate::malformed("Bias operand on a non-implicit sample"));
                }
                op = TextureOp::SampleBias;
                source(self, TextureSourceKind::Bias)?;
            }
            if operands.contains(ImageOperands::LOD) {
                if !matches!(op, TextureOp::SampleLod | TextureOp::Fetch | TextureOp::QuerySize) {
                    return Err(crate::malformed(format!("Lod operand on {:?}", inst.op)));
                }
                source(self, TextureSourceKind::Lod)?;
            }
            if operands.contains(ImageOperands::GRAD) {
                if !matches!(op, TextureOp::Sample | TextureOp::SampleLod) {
                    return Err(crate::malformed(format!("Grad operand on {:?}", inst.op)));
                }
                op = TextureOp::SampleGrad;
                source(self, TextureSourceKind::Ddx)?;
                source(self, TextureSourceKind::Ddy)?;
            }
            if operands.intersects(ImageOperands::OFFSET | ImageOperands::CONST_OFFSET) {
                source(self, TextureSourceKind::Offset)?;
            }
            if operands.contains(ImageOperands::SAMPLE) {
                if op != TextureOp::Fetch {
                    return Err(crate::malformed("Sample operand on a non-fetch"));
                }
                op = TextureOp::FetchMultisample;
                source(self, TextureSourceKind::SampleIndex)?;
            }
        }
        if next != inst.count() {
            return Err(crate::malformed(format!("{:?} {id} has trailing operands", inst.op)));
        }

        let query = TextureQuery {
            op,
            texture: sampled.image,
            sampler: sampled.sampler,
            sources,
            dim,
            arrayed,
            shadow,
            coordinate_components,
            component,
            result_kind: kind,
        };
        log::trace!("texture {op:?} with {} sources", query.sources.len());
        let def = self.emit(Operation::Texture(Box::new(query)), ty)?;
        let value = self.new_ssa(SsaValue::leaf(ty, def))?;
        self.push_ssa(id, value)
    }

    /// The image and sampler of a texture operand: either an explicit pair
    /// or a combined image-sampler.
    fn sampled_image(&self, id: u32) -> Result<SampledImage, ParseError> {
        match *self.values.get_untyped(id)? {
            Value::SampledImage(ref sampled) => Ok(sampled.clone()),
            Value::Deref { ref chain, .. } => Ok(SampledImage {
                image: None,
                image_type: None,
                sampler: chain.clone(),
            }),
            ref other => Err(ParseError::WrongValueKind {
                id,
                expected: crate::ValueKind::SampledImage,
                found: other.kind(),
            }),
        }
    }

    /// Divides all but the last coordinate component by the last one.
    fn project(
        &mut self,
        coordinate: Handle<Instruction>,
    ) -> Result<Handle<Instruction>, ParseError> {
        let components = self.def_components(coordinate)?;
        if components < 2 {
            return Err(crate::malformed("projective coordinate with one component"));
        }
        let scalar = self.def_scalar(coordinate)?;
        let ty = self.vector_type(scalar, components - 1);
        let pattern = (0..components - 1).collect();
        let head = self.emit(Operation::Swizzle { vector: coordinate, pattern }, ty)?;
        let last = Lane::new(coordinate, components - 1);
        let divisor = self.emit(Operation::Compose(vec![last; usize::from(components - 1)]), ty)?;
        self.emit(
            Operation::Binary {
                op: BinaryOp::Divide,
                kind: ScalarKind::Float,
                left: head,
                right: divisor,
            },
            ty,
        )
    }
}
