//! Storage image formats.

use spirv::ImageFormat;
use tessera_ir::StorageFormat;

use crate::ParseError;

/// Maps a SPIR-V image format operand to the IR storage format.
pub(crate) fn storage_format(word: u32) -> Result<StorageFormat, ParseError> {
    let format = ImageFormat::from_u32(word).ok_or(ParseError::UnknownImageFormat(word))?;
    Ok(match format {
        ImageFormat::Unknown => StorageFormat::Unknown,
        ImageFormat::Rgba32f => StorageFormat::Rgba32Float,
        ImageFormat::Rgba16f => StorageFormat::Rgba16Float,
        ImageFormat::R32f => StorageFormat::R32Float,
        ImageFormat::Rgba8 => StorageFormat::Rgba8Unorm,
        ImageFormat::Rgba8Snorm => StorageFormat::Rgba8Snorm,
        ImageFormat::Rg32f => StorageFormat::Rg32Float,
        ImageFormat::Rg16f => StorageFormat::Rg16Float,
        ImageFormat::R11fG11fB10f => StorageFormat::R11G11B10Float,
        ImageFormat::R16f => StorageFormat::R16Float,
        ImageFormat::Rgba16 => StorageFormat::Rgba16Unorm,
        ImageFormat::Rgb10A2 => StorageFormat::Rgb10A2Unorm,
        ImageFormat::Rg16 => StorageFormat::Rg16Unorm,
        ImageFormat::Rg8 => StorageFormat::Rg8Unorm,
        ImageFormat::R16 => StorageFormat::R16Unorm,
        ImageFormat::R8 => StorageFormat::R8Unorm,
        ImageFormat::Rgba16Snorm => StorageFormat::Rgba16Snorm,
        ImageFormat::Rg16Snorm => StorageFormat::Rg16Snorm,
        ImageFormat::Rg8Snorm => StorageFormat::Rg8Snorm,
        ImageFormat::R16Snorm => StorageFormat::R16Snorm,
        ImageFormat::R8Snorm => StorageFormat::R8Snorm,
        ImageFormat::Rgba32i => StorageFormat::Rgba32Sint,
        ImageFormat::Rgba16i => StorageFormat::Rgba16Sint,
        ImageFormat::Rgba8i => StorageFormat::Rgba8Sint,
        ImageFormat::R32i => StorageFormat::R32Sint,
        ImageFormat::Rg32i => StorageFormat::Rg32Sint,
        ImageFormat::Rg16i => StorageFormat::Rg16Sint,
        ImageFormat::Rg8i => StorageFormat::Rg8Sint,
        ImageFormat::R16i => StorageFormat::R16Sint,
        ImageFormat::R8i => StorageFormat::R8Sint,
        ImageFormat::Rgba32ui => StorageFormat::Rgba32Uint,
        ImageFormat::Rgba16ui => StorageFormat::Rgba16Uint,
        ImageFormat::Rgba8ui => StorageFormat::Rgba8Uint,
        ImageFormat::R32ui => StorageFormat::R32Uint,
        ImageFormat::Rgb10a2ui => StorageFormat::Rgb10A2Uint,
        ImageFormat::Rg32ui => StorageFormat::Rg32Uint,
        ImageFormat::Rg16ui => StorageFormat::Rg16Uint,
        ImageFormat::Rg8ui => StorageFormat::Rg8Uint,
        ImageFormat::R16ui => StorageFormat::R16Uint,
        ImageFormat::R8ui => StorageFormat::R8Uint,
        other => return Err(crate::unsupported(format!("image format {other:?}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_formats() {
        assert_eq!(
            storage_format(ImageFormat::Rgba8 as u32).unwrap(),
            StorageFormat::Rgba8Unorm
        );
        assert_eq!(
            storage_format(ImageFormat::R16ui as u32).unwrap(),
            StorageFormat::R16Uint
        );
        assert_eq!(
            storage_format(ImageFormat::Rg16ui as u32).unwrap(),
            StorageFormat::Rg16Uint
        );
        assert_eq!(storage_format(0).unwrap(), StorageFormat::Unknown);
    }

    #[test]
    fn rejects_unknown_formats() {
        assert!(matches!(
            storage_format(0xffff),
            Err(ParseError::UnknownImageFormat(0xffff))
        ));
    }
}
