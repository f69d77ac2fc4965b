//! Vector lanes and composite trees.

use spirv::Op;
use tessera_ir::{BinaryOp, Handle, Instruction, Lane, Operation, Scalar};

use crate::ParseError;
use crate::builder::{Builder, InsertPoint};
use crate::reader::Instruction as SpvInstruction;
use crate::ssa::{SsaKind, SsaValue};

/// Lane index meaning "undefined" in `OpVectorShuffle`.
const UNDEFINED_LANE: u32 = 0xFFFF_FFFF;

impl Builder<'_> {
    pub(crate) fn handle_composite(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let (_, ty) = self.result_type(inst)?;
        let id = inst.word(2)?;

        let value = match inst.op {
            Op::VectorExtractDynamic => {
                let vector = self.ssa_leaf(inst.word(3)?)?;
                let index = self.ssa_leaf(inst.word(4)?)?;
                let def = self.vector_extract_dynamic(vector, index)?;
                self.new_ssa(SsaValue::leaf(ty, def))?
            }
            Op::VectorInsertDynamic => {
                let vector = self.ssa_leaf(inst.word(3)?)?;
                let component = self.ssa_leaf(inst.word(4)?)?;
                let index = self.ssa_leaf(inst.word(5)?)?;
                let def = self.vector_insert_dynamic(vector, component, index)?;
                self.new_ssa(SsaValue::leaf(ty, def))?
            }
            Op::VectorShuffle => {
                let first = self.ssa_leaf(inst.word(3)?)?;
                let second = self.ssa_leaf(inst.word(4)?)?;
                let def = self.vector_shuffle(ty, first, second, inst.words_from(5))?;
                self.new_ssa(SsaValue::leaf(ty, def))?
            }
            Op::CompositeConstruct => {
                let operands = inst.words_from(3);
                if self.module.types[ty].inner.is_vector_or_scalar() {
                    let mut lanes = Vec::new();
                    for &operand in operands {
                        let def = self.ssa_leaf(operand)?;
                        for lane in 0..self.def_components(def)? {
                            lanes.push(Lane::new(def, lane));
                        }
                    }
                    let expected = self.module.types[ty].inner.components().unwrap_or(1);
                    if lanes.len() != expected as usize {
                        return Err(crate::malformed(format!(
                            "OpCompositeConstruct {id} builds {} components, \
                             its type has {expected}",
                            lanes.len()
                        )));
                    }
                    let def = self.emit(Operation::Compose(lanes), ty)?;
                    self.new_ssa(SsaValue::leaf(ty, def))?
                } else {
                    let children = operands
                        .iter()
                        .map(|&operand| self.ssa_value(operand))
                        .collect::<Result<Vec<_>, _>>()?;
                    if children.len() != self.child_types(ty)?.len() {
                        return Err(crate::malformed(format!(
                            "OpCompositeConstruct {id} has the wrong number of constituents"
                        )));
                    }
                    self.new_ssa(SsaValue::composite(ty, children))?
                }
            }
            Op::CompositeExtract => {
                let composite = self.ssa_value(inst.word(3)?)?;
                self.composite_extract(composite, inst.words_from(4))?
            }
            Op::CompositeInsert => {
                let object = self.ssa_value(inst.word(3)?)?;
                let composite = self.ssa_value(inst.word(4)?)?;
                self.composite_insert(composite, object, inst.words_from(5))?
            }
            Op::CopyObject => {
                let value = self.ssa_value(inst.word(3)?)?;
                crate::ssa::deep_copy(&mut self.fx()?.ssa, value)
            }
            other => {
                return Err(crate::malformed(format!(
                    "{other:?} is not a composite instruction"
                )));
            }
        };
        self.push_ssa(id, value)
    }

    /// Component `index` of `vector`.
    pub(crate) fn vector_extract(
        &mut self,
        vector: Handle<Instruction>,
        index: u32,
    ) -> Result<Handle<Instruction>, ParseError> {
        let components = self.def_components(vector)?;
        if index >= u32::from(components) {
            return Err(crate::malformed(format!(
                "component {index} of a {components}-component vector"
            )));
        }
        let scalar = self.def_scalar(vector)?;
        let ty = self.scalar_type(scalar);
        self.emit(
            Operation::Swizzle {
                vector,
                pattern: vec![index as u8],
            },
            ty,
        )
    }

    /// `vector` with component `index` replaced by `value`.
    pub(crate) fn vector_insert(
        &mut self,
        vector: Handle<Instruction>,
        value: Handle<Instruction>,
        index: u32,
    ) -> Result<Handle<Instruction>, ParseError> {
        let components = self.def_components(vector)?;
        if index >= u32::from(components) {
            return Err(crate::malformed(format!(
                "component {index} of a {components}-component vector"
            )));
        }
        let lanes = (0..components)
            .map(|i| {
                if u32::from(i) == index {
                    Lane::new(value, 0)
                } else {
                    Lane::new(vector, i)
                }
            })
            .collect();
        let ty = self.def_type(vector)?;
        self.emit(Operation::Compose(lanes), ty)
    }

    /// `index == i` for a dynamic index and a literal lane.
    fn lane_is(
        &mut self,
        index: Handle<Instruction>,
        lane: u32,
    ) -> Result<Handle<Instruction>, ParseError> {
        let index_ty = self.def_type(index)?;
        let kind = self.def_scalar(index)?.kind;
        let lane = self.insert(
            InsertPoint::Preamble,
            Operation::Constant(vec![lane]),
            Some(index_ty),
        )?;
        let boolean = self.scalar_type(Scalar::BOOL);
        self.emit(
            Operation::Binary {
                op: BinaryOp::Equal,
                kind,
                left: index,
                right: lane,
            },
            boolean,
        )
    }

    pub(crate) fn vector_extract_dynamic(
        &mut self,
        vector: Handle<Instruction>,
        index: Handle<Instruction>,
    ) -> Result<Handle<Instruction>, ParseError> {
        let mut result = self.vector_extract(vector, 0)?;
        for lane in 1..u32::from(self.def_components(vector)?) {
            let condition = self.lane_is(index, lane)?;
            let accept = self.vector_extract(vector, lane)?;
            let ty = self.def_type(accept)?;
            result = self.emit(
                Operation::Select {
                    condition,
                    accept,
                    reject: result,
                },
                ty,
            )?;
        }
        Ok(result)
    }

    pub(crate) fn vector_insert_dynamic(
        &mut self,
        vector: Handle<Instruction>,
        value: Handle<Instruction>,
        index: Handle<Instruction>,
    ) -> Result<Handle<Instruction>, ParseError> {
        let mut result = self.vector_insert(vector, value, 0)?;
        for lane in 1..u32::from(self.def_components(vector)?) {
            let condition = self.lane_is(index, lane)?;
            let accept = self.vector_insert(vector, value, lane)?;
            let ty = self.def_type(accept)?;
            let components = self.def_components(accept)?;
            let condition = self.splat(condition, components)?;
            result = self.emit(
                Operation::Select {
                    condition,
                    accept,
                    reject: result,
                },
                ty,
            )?;
        }
        Ok(result)
    }

    /// A vector of `components` copies of the scalar `value`.
    pub(crate) fn splat(
        &mut self,
        value: Handle<Instruction>,
        components: u8,
    ) -> Result<Handle<Instruction>, ParseError> {
        if components <= 1 {
            return Ok(value);
        }
        let scalar = self.def_scalar(value)?;
        let ty = self.vector_type(scalar, components);
        let lanes = (0..components).map(|_| Lane::new(value, 0)).collect();
        self.emit(Operation::Compose(lanes), ty)
    }

    fn vector_shuffle(
        &mut self,
        ty: Handle<tessera_ir::Type>,
        first: Handle<Instruction>,
        second: Handle<Instruction>,
        selectors: &[u32],
    ) -> Result<Handle<Instruction>, ParseError> {
        let first_len = u32::from(self.def_components(first)?);
        let second_len = u32::from(self.def_components(second)?);
        if selectors.len() != self.module.types[ty].inner.components().unwrap_or(1) as usize {
            return Err(crate::malformed("OpVectorShuffle selects the wrong number of lanes"));
        }

        let mut undefined = None;
        let mut lanes = Vec::with_capacity(selectors.len());
        for &selector in selectors {
            let lane = if selector == UNDEFINED_LANE {
                let undef = match undefined {
                    Some(undef) => undef,
                    None => {
                        let scalar = self.def_scalar(first)?;
                        let scalar_ty = self.scalar_type(scalar);
                        let undef = self.insert(
                            InsertPoint::Preamble,
                            Operation::Undef,
                            Some(scalar_ty),
                        )?;
                        *undefined.insert(undef)
                    }
                };
                Lane::new(undef, 0)
            } else if selector < first_len {
                Lane::new(first, selector as u8)
            } else if selector < first_len + second_len {
                Lane::new(second, (selector - first_len) as u8)
            } else {
                return Err(crate::malformed(format!("OpVectorShuffle selects lane {selector}")));
            };
            lanes.push(lane);
        }
        self.emit(Operation::Compose(lanes), ty)
    }

    fn composite_extract(
        &mut self,
        composite: Handle<SsaValue>,
        indices: &[u32],
    ) -> Result<Handle<SsaValue>, ParseError> {
        let mut current = composite;
        for (position, &index) in indices.iter().enumerate() {
            match self.ssa_node(current)?.kind {
                SsaKind::Leaf(vector) => {
                    if position + 1 != indices.len() {
                        return Err(crate::malformed(
                            "OpCompositeExtract continues past a component",
                        ));
                    }
                    let def = self.vector_extract(vector, index)?;
                    let ty = self.def_type(def)?;
                    return self.new_ssa(SsaValue::leaf(ty, def));
                }
                SsaKind::Composite(ref children) => {
                    current = *children.get(index as usize).ok_or_else(|| {
                        crate::malformed(format!("OpCompositeExtract index {index} out of range"))
                    })?;
                }
            }
        }
        Ok(current)
    }

    fn composite_insert(
        &mut self,
        composite: Handle<SsaValue>,
        object: Handle<SsaValue>,
        indices: &[u32],
    ) -> Result<Handle<SsaValue>, ParseError> {
        let Some((&last, path)) = indices.split_last() else {
            return Err(crate::malformed("OpCompositeInsert without indices"));
        };
        let copy = crate::ssa::deep_copy(&mut self.fx()?.ssa, composite);

        let mut current = copy;
        for &index in path {
            current = *self
                .ssa_node(current)?
                .children()
                .get(index as usize)
                .ok_or_else(|| {
                    crate::malformed(format!("OpCompositeInsert index {index} out of range"))
                })?;
        }

        let component = self.ssa_node(object)?.as_leaf();
        let ctx = self.fx()?;
        let vector = match ctx.ssa[current].kind {
            SsaKind::Leaf(vector) => vector,
            SsaKind::Composite(ref mut children) => {
                let slot = children.get_mut(last as usize).ok_or_else(|| {
                    crate::malformed(format!("OpCompositeInsert index {last} out of range"))
                })?;
                *slot = object;
                return Ok(copy);
            }
        };
        let component =
            component.ok_or_else(|| crate::malformed("inserted component is not a scalar"))?;
        let def = self.vector_insert(vector, component, last)?;
        self.fx()?.ssa[current].kind = SsaKind::Leaf(def);
        Ok(copy)
    }
}
