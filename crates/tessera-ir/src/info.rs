//! Per-shader metadata.

/// Pipeline stage a module is translated for.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
    Compute,
}

/// Primitive type emitted by a geometry shader.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum OutputPrimitive {
    Points,
    LineStrip,
    TriangleStrip,
}

/// Constraint a fragment shader places on the depth it writes.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub enum DepthLayout {
    #[default]
    None,
    Any,
    Greater,
    Less,
    Unchanged,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeometryInfo {
    /// Vertices per input primitive.
    pub vertices_in: u32,
    /// Maximum number of vertices emitted.
    pub vertices_out: u32,
    pub invocations: u32,
    pub output_primitive: Option<OutputPrimitive>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FragmentInfo {
    pub early_fragment_tests: bool,
    pub depth_layout: DepthLayout,
    pub origin_upper_left: bool,
}

/// Execution modes and resource usage of a translated shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderInfo {
    pub stage: ShaderStage,
    pub name: Option<String>,
    pub num_textures: u32,
    pub num_images: u32,
    pub num_ubos: u32,
    pub num_ssbos: u32,
    /// Size in bytes of the push constant block, if any.
    pub push_constant_size: Option<u32>,
    /// Compute work group size.
    pub local_size: [u32; 3],
    pub geometry: GeometryInfo,
    pub fragment: FragmentInfo,
}

impl ShaderInfo {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            name: None,
            num_textures: 0,
            num_images: 0,
            num_ubos: 0,
            num_ssbos: 0,
            push_constant_size: None,
            local_size: [1, 1, 1],
            geometry: GeometryInfo::default(),
            fragment: FragmentInfo::default(),
        }
    }
}
