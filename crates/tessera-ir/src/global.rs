//! Variables and their storage.

use crate::arena::Handle;
use crate::types::{StorageFormat, Type};

/// Where a variable lives and who can see it.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum VariableMode {
    /// Stage input.
    ShaderIn,
    /// Stage output.
    ShaderOut,
    /// Value provided by the hardware rather than a previous stage.
    SystemValue,
    /// Read-only external resource: uniform block, image or sampler.
    Uniform,
    /// Read-write buffer block.
    ShaderStorage,
    /// Private to one invocation, visible to every function.
    Global,
    /// Private to one function.
    Local,
    /// Function parameter or return slot.
    Parameter,
}

/// Interpolation qualifier of a stage input or output.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Interpolation {
    Smooth,
    Flat,
    NoPerspective,
}

/// Binding and layout data of a variable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariableData {
    /// Slot number: a varying, fragment result, vertex attribute or system
    /// value slot from [`slots`](crate::slots).
    pub location: u32,
    /// `true` when `location` is a final slot rather than relative to the
    /// stage's location base.
    pub explicit_location: bool,
    /// First component inside `location`.
    pub component: u32,
    /// Dual-source blend index.
    pub index: u32,
    pub binding: Option<u32>,
    pub descriptor_set: Option<u32>,
    pub interpolation: Option<Interpolation>,
    pub centroid: bool,
    pub sample: bool,
    pub invariant: bool,
    pub read_only: bool,
    /// Fragment coordinate convention of `FragCoord` and `SamplePosition`.
    pub origin_upper_left: bool,
    pub format: Option<StorageFormat>,
}

/// A constant initializer: scalar and vector components packed into
/// `values`, or one child per element of a struct or array.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstantValue {
    pub values: Vec<u32>,
    pub elements: Vec<ConstantValue>,
}

/// A variable of any mode.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub name: Option<String>,
    pub ty: Handle<Type>,
    pub mode: VariableMode,
    /// Block struct, image or sampler type this variable binds, when it is
    /// an interface variable.
    pub interface_type: Option<Handle<Type>>,
    pub data: VariableData,
    pub initializer: Option<ConstantValue>,
}

impl Variable {
    pub fn new(name: Option<String>, ty: Handle<Type>, mode: VariableMode) -> Self {
        Self {
            name,
            ty,
            mode,
            interface_type: None,
            data: VariableData::default(),
            initializer: None,
        }
    }
}
