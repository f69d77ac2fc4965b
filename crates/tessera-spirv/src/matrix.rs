//! Matrix arithmetic, lowered to column vector operations.

use spirv::Op;
use tessera_ir::{BinaryOp, Handle, Instruction, Lane, MathFunction, Operation, ScalarKind, Type};

use crate::ParseError;
use crate::builder::Builder;
use crate::reader::Instruction as SpvInstruction;
use crate::ssa::{SsaKind, SsaValue};

/// One side of a product: its columns, plus its rows when a transpose of
/// it has already been built.
struct Factor {
    columns: Vec<Handle<Instruction>>,
    rows: Option<Vec<Handle<Instruction>>>,
}

impl Builder<'_> {
    pub(crate) fn handle_matrix(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let (_, ty) = self.result_type(inst)?;
        let id = inst.word(2)?;

        let value = match inst.op {
            Op::Transpose => {
                let matrix = self.ssa_value(inst.word(3)?)?;
                self.transpose(matrix)?
            }
            Op::MatrixTimesScalar => {
                let matrix = self.ssa_value(inst.word(3)?)?;
                let scalar = self.ssa_leaf(inst.word(4)?)?;
                self.matrix_times_scalar(matrix, scalar)?
            }
            Op::MatrixTimesVector | Op::MatrixTimesMatrix => {
                let left = self.ssa_value(inst.word(3)?)?;
                let right = self.ssa_value(inst.word(4)?)?;
                let left = self.factor(left)?;
                let right = self.factor(right)?;
                self.product(ty, left, right)?
            }
            Op::VectorTimesMatrix => {
                // v * M == transpose(M) * v
                let vector = self.ssa_value(inst.word(3)?)?;
                let matrix = self.ssa_value(inst.word(4)?)?;
                let transposed = self.transpose(matrix)?;
                let left = self.factor(transposed)?;
                let right = self.factor(vector)?;
                self.product(ty, left, right)?
            }
            Op::OuterProduct => {
                let left = self.ssa_leaf(inst.word(3)?)?;
                let right = self.ssa_leaf(inst.word(4)?)?;
                let rows = self.def_components(left)?;
                let mut columns = Vec::new();
                for i in 0..u32::from(self.def_components(right)?) {
                    let element = self.vector_extract(right, i)?;
                    let element = self.splat(element, rows)?;
                    columns.push(self.float_binary(BinaryOp::Multiply, left, element)?);
                }
                self.matrix_from_columns(ty, columns)?
            }
            other => return Err(crate::malformed(format!("{other:?} is not a matrix instruction"))),
        };
        self.push_ssa(id, value)
    }

    /// The transpose of a matrix value. The result is cached on the value and
    /// linked back, so transposing twice yields the original.
    pub(crate) fn transpose(
        &mut self,
        value: Handle<SsaValue>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let node = self.ssa_node(value)?;
        if let Some(transposed) = node.transposed {
            return Ok(transposed);
        }
        let ty = node.ty;
        let columns = self.column_defs(value)?;
        let transposed_ty = tessera_ir::transposed_type(&mut self.module.types, ty)
            .ok_or_else(|| crate::malformed("transpose of a non-matrix value"))?;
        let rows = self.transposed_columns(&columns)?;
        let transposed = self.matrix_from_columns(transposed_ty, rows)?;

        let ssa = &mut self.fx()?.ssa;
        ssa[value].transposed = Some(transposed);
        ssa[transposed].transposed = Some(value);
        Ok(transposed)
    }

    /// Rows of the matrix whose columns are `columns`.
    fn transposed_columns(
        &mut self,
        columns: &[Handle<Instruction>],
    ) -> Result<Vec<Handle<Instruction>>, ParseError> {
        let first = *columns
            .first()
            .ok_or_else(|| crate::malformed("matrix without columns"))?;
        let scalar = self.def_scalar(first)?;
        let row_ty = self.vector_type(scalar, columns.len() as u8);
        (0..self.def_components(first)?)
            .map(|row| {
                let lanes = columns.iter().map(|&column| Lane::new(column, row)).collect();
                self.emit(Operation::Compose(lanes), row_ty)
            })
            .collect()
    }

    fn column_defs(&self, value: Handle<SsaValue>) -> Result<Vec<Handle<Instruction>>, ParseError> {
        match self.ssa_node(value)?.kind {
            SsaKind::Leaf(def) => Ok(vec![def]),
            SsaKind::Composite(ref children) => children
                .iter()
                .map(|&column| {
                    self.ssa_node(column)?
                        .as_leaf()
                        .ok_or_else(|| crate::malformed("matrix column is not a vector"))
                })
                .collect(),
        }
    }

    fn factor(&self, value: Handle<SsaValue>) -> Result<Factor, ParseError> {
        let rows = match self.ssa_node(value)?.transposed {
            Some(transposed) => Some(self.column_defs(transposed)?),
            None => None,
        };
        Ok(Factor {
            columns: self.column_defs(value)?,
            rows,
        })
    }

    /// Wraps columns as a value of type `ty`: a leaf for a vector result,
    /// a tree of columns otherwise.
    fn matrix_from_columns(
        &mut self,
        ty: Handle<Type>,
        columns: Vec<Handle<Instruction>>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        if self.module.types[ty].inner.is_vector_or_scalar() {
            let [column] = columns[..] else {
                return Err(crate::malformed("vector result with several columns"));
            };
            return self.new_ssa(SsaValue::leaf(ty, column));
        }
        let children = columns
            .into_iter()
            .map(|column| {
                let column_ty = self.def_type(column)?;
                self.new_ssa(SsaValue::leaf(column_ty, column))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.new_ssa(SsaValue::composite(ty, children))
    }

    fn float_binary(
        &mut self,
        op: BinaryOp,
        left: Handle<Instruction>,
        right: Handle<Instruction>,
    ) -> Result<Handle<Instruction>, ParseError> {
        let ty = self.def_type(left)?;
        self.emit(
            Operation::Binary {
                op,
                kind: ScalarKind::Float,
                left,
                right,
            },
            ty,
        )
    }

    /// `left * right` with a result of type `ty`.
    fn product(
        &mut self,
        ty: Handle<Type>,
        left: Factor,
        right: Factor,
    ) -> Result<Handle<SsaValue>, ParseError> {
        if let (Some(left_rows), Some(right_rows)) = (&left.rows, &right.rows) {
            // (A * B)^T == B^T * A^T, where both transposes already exist.
            let transposed_ty = tessera_ir::transposed_type(&mut self.module.types, ty)
                .ok_or_else(|| crate::malformed("matrix product with a vector result"))?;
            let transposed = self.product(
                transposed_ty,
                Factor {
                    columns: right_rows.clone(),
                    rows: None,
                },
                Factor {
                    columns: left_rows.clone(),
                    rows: None,
                },
            )?;
            return self.transpose(transposed);
        }

        let first = *left
            .columns
            .first()
            .ok_or_else(|| crate::malformed("matrix without columns"))?;
        let scalar = self.def_scalar(first)?;
        let rows = self.def_components(first)?;
        for &column in &right.columns {
            if usize::from(self.def_components(column)?) != left.columns.len() {
                return Err(crate::malformed("matrix product of mismatched sizes"));
            }
        }

        let mut result = Vec::with_capacity(right.columns.len());
        match left.rows {
            Some(left_rows) if scalar.kind == ScalarKind::Float => {
                let scalar_ty = self.scalar_type(scalar);
                let column_ty = self.vector_type(scalar, rows);
                for &column in &right.columns {
                    let mut lanes = Vec::with_capacity(left_rows.len());
                    for &row in &left_rows {
                        let dot = self.emit(
                            Operation::Math {
                                fun: MathFunction::Dot,
                                kind: ScalarKind::Float,
                                args: vec![row, column],
                            },
                            scalar_ty,
                        )?;
                        lanes.push(Lane::new(dot, 0));
                    }
                    result.push(self.emit(Operation::Compose(lanes), column_ty)?);
                }
            }
            _ => {
                for &column in &right.columns {
                    let mut sum = None;
                    for (j, &left_column) in left.columns.iter().enumerate() {
                        let element = self.vector_extract(column, j as u32)?;
                        let element = self.splat(element, rows)?;
                        let term = self.float_binary(BinaryOp::Multiply, left_column, element)?;
                        sum = Some(match sum {
                            Some(sum) => self.float_binary(BinaryOp::Add, sum, term)?,
                            None => term,
                        });
                    }
                    result.push(sum.ok_or_else(|| crate::malformed("matrix without columns"))?);
                }
            }
        }
        self.matrix_from_columns(ty, result)
    }

    fn matrix_times_scalar(
        &mut self,
        matrix: Handle<SsaValue>,
        scalar: Handle<Instruction>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        // Scale the cached transpose instead, so the result keeps one.
        if let Some(transposed) = self.ssa_node(matrix)?.transposed {
            let scaled = self.matrix_times_scalar_plain(transposed, scalar)?;
            return self.transpose(scaled);
        }
        self.matrix_times_scalar_plain(matrix, scalar)
    }

    fn matrix_times_scalar_plain(
        &mut self,
        matrix: Handle<SsaValue>,
        scalar: Handle<Instruction>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let ty = self.ssa_node(matrix)?.ty;
        let mut columns = Vec::new();
        for column in self.column_defs(matrix)? {
            let rows = self.def_components(column)?;
            let factor = self.splat(scalar, rows)?;
            columns.push(self.float_binary(BinaryOp::Multiply, column, factor)?);
        }
        self.matrix_from_columns(ty, columns)
    }
}
