//! Constant declarations and their materialization.

use spirv::Op;
use tessera_ir::{ArraySize, ConstantValue, FALSE, Handle, Operation, TRUE, Type, TypeInner};

use crate::ParseError;
use crate::builder::{Builder, InsertPoint};
use crate::reader::Instruction;
use crate::ssa::SsaValue;
use crate::value::Value;

/// A constant of any type.
///
/// Scalars and vectors keep one word per component in `values`; matrices
/// keep every component in `values`, column after column. Arrays and
/// structs keep their children in `elements`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Constant {
    pub values: Vec<u32>,
    pub elements: Vec<Handle<Constant>>,
}

impl Builder<'_> {
    pub(crate) fn handle_constant(&mut self, inst: &Instruction<'_>) -> Result<(), ParseError> {
        let ty = self.values.ty(inst.word(1)?)?;
        let id = inst.word(2)?;
        let ir_ty = self.types[ty].ty;

        let constant = match inst.op {
            Op::ConstantTrue | Op::ConstantFalse | Op::SpecConstantTrue | Op::SpecConstantFalse => {
                if self.module.types[ir_ty].inner != TypeInner::Scalar(tessera_ir::Scalar::BOOL) {
                    return Err(crate::malformed(format!(
                        "boolean constant {id} of non-boolean type"
                    )));
                }
                let value = if matches!(inst.op, Op::ConstantTrue | Op::SpecConstantTrue) {
                    TRUE
                } else {
                    FALSE
                };
                Constant {
                    values: vec![value],
                    elements: Vec::new(),
                }
            }
            Op::Constant | Op::SpecConstant => {
                if !matches!(self.module.types[ir_ty].inner, TypeInner::Scalar(_)) {
                    return Err(crate::malformed(format!("scalar constant {id} of composite type")));
                }
                Constant {
                    values: vec![inst.word(3)?],
                    elements: Vec::new(),
                }
            }
            Op::ConstantComposite | Op::SpecConstantComposite => {
                let elements = inst
                    .words_from(3)
                    .iter()
                    .map(|&elem| self.values.constant(elem).map(|(_, c)| c))
                    .collect::<Result<Vec<_>, _>>()?;
                self.composite_constant(ir_ty, elements)?
            }
            Op::ConstantNull => {
                self.check_tree_size(ir_ty)?;
                self.null_constant(ir_ty)?
            }
            Op::ConstantSampler => return Err(crate::unsupported("OpConstantSampler")),
            _ => return Err(crate::unsupported(format!("{:?}", inst.op))),
        };

        let constant = self.constants.append(constant);
        self.values.push(id, Value::Constant { ty, constant })
    }

    fn composite_constant(
        &mut self,
        ty: Handle<Type>,
        elements: Vec<Handle<Constant>>,
    ) -> Result<Constant, ParseError> {
        match self.module.types[ty].inner {
            TypeInner::Vector { size, .. } => {
                if elements.len() != size as usize {
                    return Err(crate::malformed("vector constant with the wrong element count"));
                }
                let values = elements
                    .iter()
                    .map(|&e| self.scalar_word(e))
                    .collect::<Result<_, _>>()?;
                Ok(Constant {
                    values,
                    elements: Vec::new(),
                })
            }
            TypeInner::Matrix { columns, rows, .. } => {
                if elements.len() != columns as usize {
                    return Err(crate::malformed("matrix constant with the wrong column count"));
                }
                let rows = rows as usize;
                let mut values = vec![0; rows * elements.len()];
                for (i, &column) in elements.iter().enumerate() {
                    let column = &self.constants[column].values;
                    if column.len() != rows {
                        return Err(crate::malformed("matrix constant column of the wrong size"));
                    }
                    values[rows * i..rows * (i + 1)].copy_from_slice(column);
                }
                Ok(Constant {
                    values,
                    elements: Vec::new(),
                })
            }
            TypeInner::Array { .. } | TypeInner::Struct { .. } => Ok(Constant {
                values: Vec::new(),
                elements,
            }),
            _ => Err(crate::malformed("composite constant of a non-composite type")),
        }
    }

    fn scalar_word(&self, constant: Handle<Constant>) -> Result<u32, ParseError> {
        match self.constants[constant].values[..] {
            [word] => Ok(word),
            _ => Err(crate::malformed("vector constant element is not a scalar")),
        }
    }

    /// The zero value of `ty`.
    fn null_constant(&mut self, ty: Handle<Type>) -> Result<Constant, ParseError> {
        let inner = self.module.types[ty].inner.clone();
        let constant = match inner {
            TypeInner::Scalar(_) => Constant {
                values: vec![0],
                elements: Vec::new(),
            },
            TypeInner::Vector { size, .. } => Constant {
                values: vec![0; size as usize],
                elements: Vec::new(),
            },
            TypeInner::Matrix { columns, rows, .. } => Constant {
                values: vec![0; columns as usize * rows as usize],
                elements: Vec::new(),
            },
            TypeInner::Array {
                base,
                size: ArraySize::Constant(len),
            } => {
                let element = self.null_constant(base)?;
                let element = self.constants.append(element);
                Constant {
                    values: Vec::new(),
                    elements: vec![element; len as usize],
                }
            }
            TypeInner::Struct { members } => {
                let mut elements = Vec::with_capacity(members.len());
                for member in members {
                    let element = self.null_constant(member.ty)?;
                    elements.push(self.constants.append(element));
                }
                Constant {
                    values: Vec::new(),
                    elements,
                }
            }
            _ => return Err(crate::unsupported("null constant of this type")),
        };
        Ok(constant)
    }

    /// Converts a constant to the IR form used by variable initializers.
    pub(crate) fn constant_value(&self, constant: Handle<Constant>) -> ConstantValue {
        let c = &self.constants[constant];
        ConstantValue {
            values: c.values.clone(),
            elements: c.elements.iter().map(|&e| self.constant_value(e)).collect(),
        }
    }

    /// The SSA value of `constant` in the current function, emitted at the
    /// top of the entry block on first use.
    pub(crate) fn const_ssa_value(
        &mut self,
        constant: Handle<Constant>,
        ty: Handle<Type>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        if let Some(&value) = self.fx()?.const_table.get(&constant) {
            return Ok(value);
        }
        let value = match self.module.types[ty].inner {
            TypeInner::Scalar(_) | TypeInner::Vector { .. } => {
                let values = self.constants[constant].values.clone();
                let def =
                    self.insert(InsertPoint::Preamble, Operation::Constant(values), Some(ty))?;
                self.new_ssa(SsaValue::leaf(ty, def))?
            }
            TypeInner::Matrix { rows, .. } => {
                let column_ty = self.child_types(ty)?[0];
                let values = self.constants[constant].values.clone();
                let mut columns = Vec::new();
                for column in values.chunks(rows as usize) {
                    let def = self.insert(
                        InsertPoint::Preamble,
                        Operation::Constant(column.to_vec()),
                        Some(column_ty),
                    )?;
                    columns.push(self.new_ssa(SsaValue::leaf(column_ty, def))?);
                }
                self.new_ssa(SsaValue::composite(ty, columns))?
            }
            TypeInner::Array { .. } | TypeInner::Struct { .. } => {
                let child_types = self.child_types(ty)?;
                let elements = self.constants[constant].elements.clone();
                if child_types.len() != elements.len() {
                    return Err(crate::malformed("constant does not match its type"));
                }
                let mut children = Vec::with_capacity(elements.len());
                for (element, child_ty) in elements.into_iter().zip(child_types) {
                    children.push(self.const_ssa_value(element, child_ty)?);
                }
                self.new_ssa(SsaValue::composite(ty, children))?
            }
            _ => return Err(crate::unsupported("constants of opaque types")),
        };
        self.fx()?.const_table.insert(constant, value);
        Ok(value)
    }
}
