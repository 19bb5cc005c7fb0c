/// Texture trait, texture descriptor, and texture info

use bitflags::bitflags;

/// Texture and vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    // Color formats
    R8_UNORM,
    R8G8B8A8_SRGB,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
    B8G8R8A8_UNORM,
    R16G16_SFLOAT,
    R16G16B16A16_SFLOAT,
    R32_SFLOAT,
    R32G32B32A32_SFLOAT,

    // Depth formats
    D32_FLOAT,
    D24_UNORM_S8_UINT,

    // Vertex attribute formats
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
}

impl TextureFormat {
    /// True for depth (and depth/stencil) formats
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::D32_FLOAT | TextureFormat::D24_UNORM_S8_UINT)
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::D24_UNORM_S8_UINT)
    }

    /// Size of one texel (or one vertex attribute) in bytes
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8_UNORM => 1,
            TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::R16G16_SFLOAT
            | TextureFormat::R32_SFLOAT
            | TextureFormat::D32_FLOAT
            | TextureFormat::D24_UNORM_S8_UINT => 4,
            TextureFormat::R16G16B16A16_SFLOAT | TextureFormat::R32G32_SFLOAT => 8,
            TextureFormat::R32G32B32_SFLOAT => 12,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }
}

bitflags! {
    /// How a texture may be used by the GPU
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Sampled in shaders
        const SAMPLED = 1 << 0;
        /// Color attachment of a render pass
        const COLOR_ATTACHMENT = 1 << 1;
        /// Depth/stencil attachment of a render pass
        const DEPTH_STENCIL_ATTACHMENT = 1 << 2;
        /// Read by a later subpass of the same render pass
        const INPUT_ATTACHMENT = 1 << 3;
        /// Written by compute or ray tracing shaders
        const STORAGE = 1 << 4;
        const TRANSFER_SRC = 1 << 5;
        const TRANSFER_DST = 1 << 6;
    }
}

impl TextureUsage {
    /// True if the texture can back a render target view
    pub fn is_attachment(&self) -> bool {
        self.intersects(TextureUsage::COLOR_ATTACHMENT | TextureUsage::DEPTH_STENCIL_ATTACHMENT)
    }
}

/// Dimensionality of the default view of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    /// Single 2D image
    Tex2D,
    /// 2D array (one layer per cascade, for example)
    Array2D,
    /// Cube map, exactly 6 layers
    Cube,
}

/// Width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (minimized window)
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ===== TEXTURE DESC =====

/// Descriptor for creating a texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Debug name
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub texture_type: TextureType,
    /// Number of array layers (6 for cubes)
    pub array_layers: u32,
    pub mip_levels: u32,
    /// Optional initial data, all layers tightly packed
    pub data: Option<Vec<u8>>,
}

impl TextureDesc {
    /// Single-layer, single-mip 2D texture without initial data
    pub fn new_2d(label: &'static str, width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label,
            width,
            height,
            format,
            usage,
            texture_type: TextureType::Tex2D,
            array_layers: 1,
            mip_levels: 1,
            data: None,
        }
    }
}

// ===== TEXTURE INFO =====

/// Read-only properties of a created texture
#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub texture_type: TextureType,
    pub array_layers: u32,
    pub mip_levels: u32,
}

impl TextureInfo {
    pub fn from_desc(desc: &TextureDesc) -> Self {
        Self {
            label: desc.label,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
            texture_type: desc.texture_type,
            array_layers: desc.array_layers,
            mip_levels: desc.mip_levels,
        }
    }

    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }
}

// ===== TEXTURE TRAIT =====

/// Texture resource trait
///
/// Implemented by backend-specific texture types. The texture (image,
/// memory and default view) is destroyed when dropped.
pub trait Texture: Send + Sync {
    /// Get the read-only properties of this texture
    fn info(&self) -> &TextureInfo;
}

/// Render target trait
///
/// A view on one layer/mip of a texture, or on a swapchain image, that can
/// be attached to a framebuffer.
pub trait RenderTarget: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn format(&self) -> TextureFormat;
}

/// Check a texture descriptor before handing it to a backend
pub fn validate_texture_desc(desc: &TextureDesc) -> crate::error::Result<()> {
    use crate::error::Error;

    if desc.width == 0 || desc.height == 0 {
        return Err(Error::InvalidResource(format!(
            "texture '{}' has zero extent {}x{}",
            desc.label, desc.width, desc.height
        )));
    }
    if desc.array_layers == 0 || desc.mip_levels == 0 {
        return Err(Error::InvalidResource(format!(
            "texture '{}' needs at least one layer and one mip",
            desc.label
        )));
    }
    match desc.texture_type {
        TextureType::Tex2D if desc.array_layers != 1 => Err(Error::InvalidResource(format!(
            "texture '{}' is Tex2D but has {} layers",
            desc.label, desc.array_layers
        ))),
        TextureType::Cube if desc.array_layers != 6 || desc.width != desc.height => {
            Err(Error::InvalidResource(format!(
                "cube texture '{}' must be square with 6 layers",
                desc.label
            )))
        }
        _ => {
            if desc.format.is_depth() && desc.usage.contains(TextureUsage::COLOR_ATTACHMENT) {
                return Err(Error::InvalidResource(format!(
                    "depth texture '{}' cannot be a color attachment",
                    desc.label
                )));
            }
            if let Some(data) = &desc.data {
                let expected = desc.width as usize
                    * desc.height as usize
                    * desc.array_layers as usize
                    * desc.format.bytes_per_pixel() as usize;
                if data.len() != expected {
                    return Err(Error::InvalidResource(format!(
                        "texture '{}' data is {} bytes, expected {}",
                        desc.label,
                        data.len(),
                        expected
                    )));
                }
            }
            Ok(())
        }
    }
}
