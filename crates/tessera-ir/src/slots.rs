//! Slot numbers shared with the rest of the driver.
//!
//! A variable's [`location`](crate::VariableData::location) is interpreted
//! according to its mode and stage: varyings use [`varying`], fragment
//! outputs [`frag_result`], vertex inputs [`vert_attrib`] and system values
//! [`system_value`].

/// Varying slots, shared by all stage inputs and outputs except vertex
/// inputs and fragment outputs.
pub mod varying {
    pub const POS: u32 = 0;
    pub const COL0: u32 = 1;
    pub const COL1: u32 = 2;
    pub const FOGC: u32 = 3;
    pub const TEX0: u32 = 4;
    pub const PSIZ: u32 = 12;
    pub const BFC0: u32 = 13;
    pub const BFC1: u32 = 14;
    pub const EDGE: u32 = 15;
    pub const CLIP_VERTEX: u32 = 16;
    pub const CLIP_DIST0: u32 = 17;
    pub const CLIP_DIST1: u32 = 18;
    pub const PRIMITIVE_ID: u32 = 19;
    pub const LAYER: u32 = 20;
    pub const VIEWPORT: u32 = 21;
    pub const FACE: u32 = 22;
    pub const PNTC: u32 = 23;
    /// First generic varying; user varyings are numbered from here.
    pub const VAR0: u32 = 32;
}

/// Fragment shader outputs.
pub mod frag_result {
    pub const DEPTH: u32 = 0;
    pub const STENCIL: u32 = 1;
    pub const COLOR: u32 = 2;
    pub const SAMPLE_MASK: u32 = 3;
    /// First generic color output.
    pub const DATA0: u32 = 4;
}

/// Vertex shader inputs.
pub mod vert_attrib {
    pub const POS: u32 = 0;
    /// First generic attribute; user attributes are numbered from here.
    pub const GENERIC0: u32 = 16;
}

/// Values supplied by the hardware.
pub mod system_value {
    pub const FRONT_FACE: u32 = 0;
    pub const VERTEX_ID: u32 = 1;
    pub const VERTEX_ID_ZERO_BASE: u32 = 2;
    pub const BASE_VERTEX: u32 = 3;
    pub const INSTANCE_ID: u32 = 4;
    pub const INVOCATION_ID: u32 = 5;
    pub const SAMPLE_ID: u32 = 6;
    pub const SAMPLE_POS: u32 = 7;
    pub const SAMPLE_MASK_IN: u32 = 8;
    pub const LOCAL_INVOCATION_ID: u32 = 9;
    pub const LOCAL_INVOCATION_INDEX: u32 = 10;
    pub const GLOBAL_INVOCATION_ID: u32 = 11;
    pub const WORK_GROUP_ID: u32 = 12;
    pub const NUM_WORK_GROUPS: u32 = 13;
}
