//! Type system for the Tessera IR.

use crate::arena::{Handle, UniqueArena};

/// Width of a scalar type in bytes.
pub type Bytes = u8;

/// The kind of a scalar type.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ScalarKind {
    /// Boolean, stored as [`TRUE`](crate::TRUE) / [`FALSE`](crate::FALSE).
    Bool,
    /// Signed integer.
    Sint,
    /// Unsigned integer.
    Uint,
    /// Floating point.
    Float,
}

/// A scalar type: kind + byte width.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Scalar {
    pub kind: ScalarKind,
    pub width: Bytes,
}

impl Scalar {
    pub const BOOL: Self = Self {
        kind: ScalarKind::Bool,
        width: 4,
    };
    pub const I32: Self = Self {
        kind: ScalarKind::Sint,
        width: 4,
    };
    pub const U32: Self = Self {
        kind: ScalarKind::Uint,
        width: 4,
    };
    pub const F32: Self = Self {
        kind: ScalarKind::Float,
        width: 4,
    };
}

/// Number of components in a vector, or of rows/columns in a matrix.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum VectorSize {
    /// 2 components.
    Bi = 2,
    /// 3 components.
    Tri = 3,
    /// 4 components.
    Quad = 4,
}

impl VectorSize {
    /// Returns the size for `count` components, if it is 2, 3 or 4.
    pub fn new(count: u32) -> Option<Self> {
        match count {
            2 => Some(Self::Bi),
            3 => Some(Self::Tri),
            4 => Some(Self::Quad),
            _ => None,
        }
    }
}

/// Size of an array.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ArraySize {
    /// Fixed-size array.
    Constant(u32),
    /// Runtime-sized array; only valid as the last member of a buffer block.
    Dynamic,
}

/// Dimensionality of an image.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ImageDimension {
    D1,
    D2,
    D3,
    Cube,
    Rect,
    Buffer,
}

impl ImageDimension {
    /// Number of coordinate components needed to address a texel, without
    /// the array layer.
    pub fn coordinates(self) -> u8 {
        match self {
            Self::D1 | Self::Buffer => 1,
            Self::D2 | Self::Rect => 2,
            Self::D3 | Self::Cube => 3,
        }
    }
}

/// Pixel format of a storage image.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum StorageFormat {
    /// Format left to the API; only allowed for images that are never read.
    Unknown,
    Rgba32Float,
    Rgba16Float,
    R32Float,
    Rgba8Unorm,
    Rgba8Snorm,
    Rg32Float,
    Rg16Float,
    R11G11B10Float,
    R16Float,
    Rgba16Unorm,
    Rgb10A2Unorm,
    Rg16Unorm,
    Rg8Unorm,
    R16Unorm,
    R8Unorm,
    Rgba16Snorm,
    Rg16Snorm,
    Rg8Snorm,
    R16Snorm,
    R8Snorm,
    Rgba32Sint,
    Rgba16Sint,
    Rgba8Sint,
    R32Sint,
    Rg32Sint,
    Rg16Sint,
    Rg8Sint,
    R16Sint,
    R8Sint,
    Rgba32Uint,
    Rgba16Uint,
    Rgba8Uint,
    R32Uint,
    Rgb10A2Uint,
    Rg32Uint,
    Rg16Uint,
    Rg8Uint,
    R16Uint,
    R8Uint,
}

/// A member of a struct type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct StructMember {
    pub name: Option<String>,
    pub ty: Handle<Type>,
    /// Byte offset inside a block, `0` when the struct is not laid out.
    pub offset: u32,
}

/// A named type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Type {
    pub name: Option<String>,
    pub inner: TypeInner,
}

/// The concrete shape of a type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum TypeInner {
    /// No value; the result type of functions that return nothing.
    Void,
    /// A single scalar value.
    Scalar(Scalar),
    /// A vector of scalars.
    Vector { size: VectorSize, scalar: Scalar },
    /// A matrix of column vectors.
    Matrix {
        columns: VectorSize,
        rows: VectorSize,
        scalar: Scalar,
    },
    /// A fixed-size or runtime-sized array.
    Array { base: Handle<Type>, size: ArraySize },
    /// A composite struct type.
    Struct { members: Vec<StructMember> },
    /// A function signature.
    Function {
        result: Handle<Type>,
        parameters: Vec<Handle<Type>>,
    },
    /// A combined image and sampler, read through texture instructions.
    SampledImage {
        dim: ImageDimension,
        arrayed: bool,
        shadow: bool,
        kind: ScalarKind,
    },
    /// An image read and written through image instructions.
    StorageImage {
        dim: ImageDimension,
        arrayed: bool,
        kind: ScalarKind,
        format: StorageFormat,
    },
    /// A sampler object without an image.
    Sampler,
}

impl TypeInner {
    /// Returns `true` for scalars and vectors, the types an SSA value can
    /// hold directly.
    pub fn is_vector_or_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Vector { .. })
    }

    /// Number of components of a scalar or vector type.
    pub fn components(&self) -> Option<u8> {
        match *self {
            Self::Scalar(_) => Some(1),
            Self::Vector { size, .. } => Some(size as u8),
            _ => None,
        }
    }

    /// The scalar type at the leaves of a scalar, vector or matrix type.
    pub fn scalar(&self) -> Option<Scalar> {
        match *self {
            Self::Scalar(scalar)
            | Self::Vector { scalar, .. }
            | Self::Matrix { scalar, .. } => Some(scalar),
            _ => None,
        }
    }

    /// Returns `true` for image, sampled-image and sampler types.
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            Self::SampledImage { .. } | Self::StorageImage { .. } | Self::Sampler
        )
    }

    /// Number of direct children of a composite: matrix columns, array
    /// elements or struct members. Runtime arrays report zero.
    pub fn length(&self) -> u32 {
        match *self {
            Self::Matrix { columns, .. } => columns as u32,
            Self::Array {
                size: ArraySize::Constant(n),
                ..
            } => n,
            Self::Struct { ref members } => members.len() as u32,
            _ => 0,
        }
    }
}

/// Returns the scalar or vector type with `components` components.
pub fn vector_type(types: &mut UniqueArena<Type>, scalar: Scalar, components: u8) -> Handle<Type> {
    let inner = match VectorSize::new(u32::from(components)) {
        Some(size) => TypeInner::Vector { size, scalar },
        None => TypeInner::Scalar(scalar),
    };
    types.insert(Type { name: None, inner })
}

/// Returns the type of column `index` of a matrix, element of an array, or
/// member of a struct.
pub fn child_type(
    types: &mut UniqueArena<Type>,
    ty: Handle<Type>,
    index: u32,
) -> Option<Handle<Type>> {
    match types[ty].inner {
        TypeInner::Matrix { rows, scalar, .. } => Some(vector_type(types, scalar, rows as u8)),
        TypeInner::Vector { scalar, .. } => Some(vector_type(types, scalar, 1)),
        TypeInner::Array { base, .. } => Some(base),
        TypeInner::Struct { ref members } => members.get(index as usize).map(|m| m.ty),
        _ => None,
    }
}

/// Returns the transpose of a matrix type.
pub fn transposed_type(types: &mut UniqueArena<Type>, ty: Handle<Type>) -> Option<Handle<Type>> {
    match types[ty].inner {
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => Some(types.insert(Type {
            name: None,
            inner: TypeInner::Matrix {
                columns: rows,
                rows: columns,
                scalar,
            },
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(types: &mut UniqueArena<Type>, s: Scalar) -> Handle<Type> {
        types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(s),
        })
    }

    #[test]
    fn vector_type_of_one_component_is_scalar() {
        let mut types = UniqueArena::new();
        let f = scalar(&mut types, Scalar::F32);
        assert_eq!(vector_type(&mut types, Scalar::F32, 1), f);
        let v3 = vector_type(&mut types, Scalar::F32, 3);
        assert_eq!(types[v3].inner.components(), Some(3));
    }

    #[test]
    fn matrix_children_are_columns() {
        let mut types = UniqueArena::new();
        let m = types.insert(Type {
            name: None,
            inner: TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Bi,
                scalar: Scalar::F32,
            },
        });
        let column = child_type(&mut types, m, 3).unwrap();
        assert_eq!(
            types[column].inner,
            TypeInner::Vector {
                size: VectorSize::Bi,
                scalar: Scalar::F32
            }
        );
        assert_eq!(types[m].inner.length(), 4);
    }

    #[test]
    fn transpose_swaps_rows_and_columns() {
        let mut types = UniqueArena::new();
        let m = types.insert(Type {
            name: None,
            inner: TypeInner::Matrix {
                columns: VectorSize::Tri,
                rows: VectorSize::Bi,
                scalar: Scalar::F32,
            },
        });
        let t = transposed_type(&mut types, m).unwrap();
        assert_eq!(
            types[t].inner,
            TypeInner::Matrix {
                columns: VectorSize::Bi,
                rows: VectorSize::Tri,
                scalar: Scalar::F32
            }
        );
        assert_eq!(transposed_type(&mut types, t), Some(m));
    }

    #[test]
    fn image_coordinates() {
        assert_eq!(ImageDimension::Buffer.coordinates(), 1);
        assert_eq!(ImageDimension::Rect.coordinates(), 2);
        assert_eq!(ImageDimension::Cube.coordinates(), 3);
    }

    #[test]
    fn vector_size_from_count() {
        assert_eq!(VectorSize::new(4), Some(VectorSize::Quad));
        assert_eq!(VectorSize::new(1), None);
        assert_eq!(VectorSize::new(5), None);
    }
}
