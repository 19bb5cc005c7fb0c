/// RenderPass trait and render pass descriptor (attachments, subpasses, dependencies)

use bitflags::bitflags;
use crate::device::TextureFormat;

/// Subpass index standing for work outside the render pass
pub const SUBPASS_EXTERNAL: u32 = u32::MAX;

/// Load operation for an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

/// Store operation for an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Image layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    Undefined,
    /// Storage image access
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

/// Descriptor for a single attachment in a render pass
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentDesc {
    pub format: TextureFormat,
    /// Number of samples (1 = no MSAA)
    pub samples: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

impl AttachmentDesc {
    /// Color attachment starting from an undefined layout
    pub fn color(format: TextureFormat, load_op: LoadOp, store_op: StoreOp, final_layout: ImageLayout) -> Self {
        Self {
            format,
            samples: 1,
            load_op,
            store_op,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
            initial_layout: ImageLayout::Undefined,
            final_layout,
        }
    }

    /// Depth attachment starting from an undefined layout
    pub fn depth(format: TextureFormat, load_op: LoadOp, store_op: StoreOp, final_layout: ImageLayout) -> Self {
        Self {
            format,
            samples: 1,
            load_op,
            store_op,
            stencil_load_op: if format.has_stencil() { load_op } else { LoadOp::DontCare },
            stencil_store_op: StoreOp::DontCare,
            initial_layout: ImageLayout::Undefined,
            final_layout,
        }
    }
}

/// Reference from a subpass to one render pass attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentReference {
    /// Index into `RenderPassDesc::attachments`
    pub attachment: u32,
    /// Layout the attachment is in during the subpass
    pub layout: ImageLayout,
}

/// One subpass of a render pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubpassDesc {
    pub input_attachments: Vec<AttachmentReference>,
    pub color_attachments: Vec<AttachmentReference>,
    pub depth_stencil_attachment: Option<AttachmentReference>,
    /// Attachments not used by this subpass whose contents later subpasses read
    pub preserve_attachments: Vec<u32>,
}

bitflags! {
    /// Pipeline stages for dependency scopes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_SHADER = 1 << 1;
        const FRAGMENT_SHADER = 1 << 2;
        const EARLY_FRAGMENT_TESTS = 1 << 3;
        const LATE_FRAGMENT_TESTS = 1 << 4;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 5;
        const COMPUTE_SHADER = 1 << 6;
        const TRANSFER = 1 << 7;
        const RAY_TRACING_SHADER = 1 << 8;
        const BOTTOM_OF_PIPE = 1 << 9;
        const ALL_COMMANDS = 1 << 10;
    }
}

bitflags! {
    /// Memory access types for dependency scopes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const INPUT_ATTACHMENT_READ = 1 << 0;
        const UNIFORM_READ = 1 << 1;
        const SHADER_READ = 1 << 2;
        const SHADER_WRITE = 1 << 3;
        const COLOR_ATTACHMENT_READ = 1 << 4;
        const COLOR_ATTACHMENT_WRITE = 1 << 5;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 6;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 7;
        const TRANSFER_READ = 1 << 8;
        const TRANSFER_WRITE = 1 << 9;
        const MEMORY_READ = 1 << 10;
        const MEMORY_WRITE = 1 << 11;
    }
}

/// Execution and memory dependency between two subpasses
///
/// Either side may be `SUBPASS_EXTERNAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    /// Framebuffer-local dependency (pixel only depends on the same pixel)
    pub by_region: bool,
}

/// Descriptor for creating a render pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassDesc {
    pub attachments: Vec<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<SubpassDependency>,
}

impl RenderPassDesc {
    /// One subpass writing `colors` then an optional `depth` attachment
    ///
    /// External dependencies order the writes after earlier sampling of the
    /// same images and make the results visible to later fragment shaders.
    pub fn single_subpass(colors: Vec<AttachmentDesc>, depth: Option<AttachmentDesc>) -> Self {
        let color_refs: Vec<AttachmentReference> = (0..colors.len() as u32)
            .map(|attachment| AttachmentReference {
                attachment,
                layout: ImageLayout::ColorAttachment,
            })
            .collect();
        let depth_ref = depth.as_ref().map(|_| AttachmentReference {
            attachment: colors.len() as u32,
            layout: ImageLayout::DepthStencilAttachment,
        });

        let write_stages = PipelineStages::COLOR_ATTACHMENT_OUTPUT
            | PipelineStages::EARLY_FRAGMENT_TESTS
            | PipelineStages::LATE_FRAGMENT_TESTS;
        let write_access = AccessFlags::COLOR_ATTACHMENT_WRITE | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

        let mut attachments = colors;
        attachments.extend(depth);

        Self {
            attachments,
            subpasses: vec![SubpassDesc {
                color_attachments: color_refs,
                depth_stencil_attachment: depth_ref,
                ..Default::default()
            }],
            dependencies: vec![
                SubpassDependency {
                    src_subpass: SUBPASS_EXTERNAL,
                    dst_subpass: 0,
                    src_stages: PipelineStages::FRAGMENT_SHADER,
                    dst_stages: write_stages,
                    src_access: AccessFlags::SHADER_READ,
                    dst_access: write_access,
                    by_region: false,
                },
                SubpassDependency {
                    src_subpass: 0,
                    dst_subpass: SUBPASS_EXTERNAL,
                    src_stages: write_stages,
                    dst_stages: PipelineStages::FRAGMENT_SHADER,
                    src_access: write_access,
                    dst_access: AccessFlags::SHADER_READ,
                    by_region: false,
                },
            ],
        }
    }
}

/// Render pass trait
pub trait RenderPass: Send + Sync {
    fn attachment_count(&self) -> u32;

    fn subpass_count(&self) -> u32;
}
