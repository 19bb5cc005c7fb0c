//! Static declaration of the main render pass
//!
//! `GraphLayout` lists the subpasses of the deferred pipeline with the
//! attachments each one reads (input attachments) and writes (color and
//! depth), plus the dependency edges between them. It is declared once,
//! checked against the attachment store before anything is recorded, and
//! lowered into a `RenderPassDesc` for the device.

use std::sync::Arc;

use crate::attachment::{AttachmentSlot, AttachmentStore};
use crate::config::PipelineVariant;
use crate::device::{
    AccessFlags, AttachmentDesc, AttachmentReference, ClearValue, ImageLayout, LoadOp,
    PipelineStages, RenderPassDesc, RenderTarget, StoreOp, SubpassDependency, SubpassDesc,
    TextureFormat, SUBPASS_EXTERNAL,
};
use crate::error::{Error, Result};

/// Subpasses of the main render pass, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubpassId {
    GBuffer = 0,
    Ssao = 1,
    Lighting = 2,
    Shading = 3,
    UiOverlay = 4,
}

impl SubpassId {
    pub const ALL: [SubpassId; 5] = [
        SubpassId::GBuffer,
        SubpassId::Ssao,
        SubpassId::Lighting,
        SubpassId::Shading,
        SubpassId::UiOverlay,
    ];

    /// Subpass index inside the render pass
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Image referenced by a subpass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentBinding {
    Store(AttachmentSlot),
    /// The swapchain image acquired for the current frame
    SwapchainImage,
}

/// Attachments read and written by one subpass
#[derive(Debug, Clone, PartialEq)]
pub struct SubpassDeclaration {
    pub id: SubpassId,
    pub inputs: Vec<AttachmentBinding>,
    pub colors: Vec<AttachmentBinding>,
    pub depth: Option<AttachmentBinding>,
}

impl SubpassDeclaration {
    /// True if this subpass writes `binding`
    pub fn writes(&self, binding: AttachmentBinding) -> bool {
        self.colors.contains(&binding) || self.depth == Some(binding)
    }

    /// True if this subpass references `binding` in any way
    pub fn uses(&self, binding: AttachmentBinding) -> bool {
        self.writes(binding) || self.inputs.contains(&binding)
    }

    fn bindings(&self) -> impl Iterator<Item = AttachmentBinding> + '_ {
        self.colors.iter().chain(self.depth.iter()).chain(self.inputs.iter()).copied()
    }
}

/// One end of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeEnd {
    /// Work recorded outside the render pass (before or after it)
    External,
    Subpass(SubpassId),
}

impl EdgeEnd {
    fn index(self) -> u32 {
        match self {
            EdgeEnd::External => SUBPASS_EXTERNAL,
            EdgeEnd::Subpass(id) => id.index(),
        }
    }
}

/// Execution and memory dependency between two subpasses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    pub src: EdgeEnd,
    pub dst: EdgeEnd,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub by_region: bool,
}

impl DependencyEdge {
    /// Color output of `src` read as input attachment by `dst`, pixel-local
    fn input_read(src: SubpassId, dst: SubpassId) -> Self {
        Self {
            src: EdgeEnd::Subpass(src),
            dst: EdgeEnd::Subpass(dst),
            src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            dst_stages: PipelineStages::FRAGMENT_SHADER,
            src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access: AccessFlags::INPUT_ATTACHMENT_READ,
            by_region: true,
        }
    }

    pub fn to_subpass_dependency(&self) -> SubpassDependency {
        SubpassDependency {
            src_subpass: self.src.index(),
            dst_subpass: self.dst.index(),
            src_stages: self.src_stages,
            dst_stages: self.dst_stages,
            src_access: self.src_access,
            dst_access: self.dst_access,
            by_region: self.by_region,
        }
    }
}

/// Edge a subpass needs but the layout does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingDependency {
    pub src: EdgeEnd,
    pub dst: SubpassId,
    pub binding: AttachmentBinding,
}

/// Subpasses and dependency edges of the main render pass
#[derive(Debug, Clone, PartialEq)]
pub struct GraphLayout {
    subpasses: Vec<SubpassDeclaration>,
    edges: Vec<DependencyEdge>,
}

impl GraphLayout {
    pub fn new(subpasses: Vec<SubpassDeclaration>, edges: Vec<DependencyEdge>) -> Self {
        Self { subpasses, edges }
    }

    /// G-buffer, SSAO, lighting, shading and UI over the attachment store
    ///
    /// `variant` only changes who writes the shadow term consumed by the
    /// lighting subpass (a depth render pass or a ray tracing dispatch).
    pub fn deferred(variant: PipelineVariant) -> Self {
        use AttachmentBinding::{Store, SwapchainImage};
        use AttachmentSlot::*;

        let subpasses = vec![
            SubpassDeclaration {
                id: SubpassId::GBuffer,
                inputs: vec![],
                colors: vec![
                    Store(GBufferNormal),
                    Store(GBufferAlbedo),
                    Store(GBufferMaterial),
                    Store(GBufferPosition),
                ],
                depth: Some(Store(Depth)),
            },
            SubpassDeclaration {
                id: SubpassId::Ssao,
                inputs: vec![Store(GBufferNormal), Store(GBufferPosition)],
                colors: vec![Store(AmbientOcclusion)],
                depth: None,
            },
            SubpassDeclaration {
                id: SubpassId::Lighting,
                inputs: vec![
                    Store(GBufferAlbedo),
                    Store(GBufferNormal),
                    Store(GBufferMaterial),
                    Store(GBufferPosition),
                    Store(AmbientOcclusion),
                ],
                colors: vec![Store(Lighting)],
                depth: None,
            },
            SubpassDeclaration {
                id: SubpassId::Shading,
                inputs: vec![Store(Lighting)],
                colors: vec![SwapchainImage],
                depth: None,
            },
            SubpassDeclaration {
                id: SubpassId::UiOverlay,
                inputs: vec![],
                colors: vec![SwapchainImage],
                depth: None,
            },
        ];

        let attachment_write_stages = PipelineStages::COLOR_ATTACHMENT_OUTPUT
            | PipelineStages::EARLY_FRAGMENT_TESTS
            | PipelineStages::LATE_FRAGMENT_TESTS;
        let attachment_write_access =
            AccessFlags::COLOR_ATTACHMENT_WRITE | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

        // Shadow term plus the IBL cube and LUT, all produced before the render pass
        let (shadow_stages, shadow_access) = match variant {
            PipelineVariant::Deferred => (
                PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS,
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            PipelineVariant::RayTraced => (PipelineStages::RAY_TRACING_SHADER, AccessFlags::SHADER_WRITE),
        };

        let edges = vec![
            // Previous frame's attachment writes
            DependencyEdge {
                src: EdgeEnd::External,
                dst: EdgeEnd::Subpass(SubpassId::GBuffer),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT | PipelineStages::LATE_FRAGMENT_TESTS,
                dst_stages: attachment_write_stages,
                src_access: attachment_write_access,
                dst_access: attachment_write_access | AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                by_region: false,
            },
            DependencyEdge {
                src: EdgeEnd::External,
                dst: EdgeEnd::Subpass(SubpassId::Lighting),
                src_stages: shadow_stages | PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::FRAGMENT_SHADER,
                src_access: shadow_access | AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::SHADER_READ,
                by_region: false,
            },
            // Swapchain image layout transition waits for the acquire semaphore
            DependencyEdge {
                src: EdgeEnd::External,
                dst: EdgeEnd::Subpass(SubpassId::Shading),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                src_access: AccessFlags::empty(),
                dst_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                by_region: false,
            },
            DependencyEdge::input_read(SubpassId::GBuffer, SubpassId::Ssao),
            DependencyEdge::input_read(SubpassId::GBuffer, SubpassId::Lighting),
            DependencyEdge::input_read(SubpassId::Ssao, SubpassId::Lighting),
            DependencyEdge::input_read(SubpassId::Lighting, SubpassId::Shading),
            // UI blends over the shaded image
            DependencyEdge {
                src: EdgeEnd::Subpass(SubpassId::Shading),
                dst: EdgeEnd::Subpass(SubpassId::UiOverlay),
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
                by_region: true,
            },
            DependencyEdge {
                src: EdgeEnd::Subpass(SubpassId::UiOverlay),
                dst: EdgeEnd::External,
                src_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::BOTTOM_OF_PIPE,
                src_access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access: AccessFlags::MEMORY_READ,
                by_region: false,
            },
        ];

        Self { subpasses, edges }
    }

    pub fn subpasses(&self) -> &[SubpassDeclaration] {
        &self.subpasses
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn subpass_count(&self) -> u32 {
        self.subpasses.len() as u32
    }

    pub fn subpass(&self, id: SubpassId) -> Option<&SubpassDeclaration> {
        self.subpasses.iter().find(|s| s.id == id)
    }

    /// Render pass attachments, in order of first use
    pub fn attachment_order(&self) -> Vec<AttachmentBinding> {
        let mut order = Vec::new();
        for binding in self.subpasses.iter().flat_map(|s| s.bindings()) {
            if !order.contains(&binding) {
                order.push(binding);
            }
        }
        order
    }

    pub fn attachment_index(&self, binding: AttachmentBinding) -> Option<u32> {
        self.attachment_order().iter().position(|b| *b == binding).map(|i| i as u32)
    }

    fn has_edge(&self, src: EdgeEnd, dst: SubpassId) -> bool {
        self.edges.iter().any(|e| e.src == src && e.dst == EdgeEnd::Subpass(dst))
    }

    /// Edges required by the declared reads and writes but not declared
    ///
    /// Every subpass touching an attachment written by an earlier subpass
    /// needs a direct edge from that writer; the first user of the swapchain
    /// image needs an edge from outside the render pass.
    pub fn missing_dependencies(&self) -> Vec<MissingDependency> {
        let mut missing = Vec::new();
        let mut push = |dep: MissingDependency| {
            if !missing.contains(&dep) {
                missing.push(dep);
            }
        };

        for (position, subpass) in self.subpasses.iter().enumerate() {
            for binding in subpass.bindings() {
                for writer in self.subpasses[..position].iter().filter(|s| s.writes(binding)) {
                    let src = EdgeEnd::Subpass(writer.id);
                    if !self.has_edge(src, subpass.id) {
                        push(MissingDependency { src, dst: subpass.id, binding });
                    }
                }
            }
        }

        let first_swapchain_user = self
            .subpasses
            .iter()
            .find(|s| s.uses(AttachmentBinding::SwapchainImage));
        if let Some(subpass) = first_swapchain_user {
            if !self.has_edge(EdgeEnd::External, subpass.id) {
                push(MissingDependency {
                    src: EdgeEnd::External,
                    dst: subpass.id,
                    binding: AttachmentBinding::SwapchainImage,
                });
            }
        }

        missing
    }

    /// Check the declaration against itself and the allocated attachments
    pub fn validate(&self, store: &AttachmentStore) -> Result<()> {
        for (position, subpass) in self.subpasses.iter().enumerate() {
            if subpass.id.index() as usize != position {
                return Err(Error::GraphDeclaration(format!(
                    "subpass {:?} declared at position {}",
                    subpass.id, position
                )));
            }

            for binding in subpass.bindings() {
                if let AttachmentBinding::Store(slot) = binding {
                    if !store.contains(slot) {
                        return Err(Error::GraphDeclaration(format!(
                            "subpass {:?} references unallocated attachment {:?}",
                            subpass.id, slot
                        )));
                    }
                }
            }

            for &binding in &subpass.colors {
                if matches!(binding, AttachmentBinding::Store(slot) if slot.format().is_depth()) {
                    return Err(Error::GraphDeclaration(format!(
                        "subpass {:?} writes depth attachment {:?} as color",
                        subpass.id, binding
                    )));
                }
            }
            if let Some(binding) = subpass.depth {
                if !matches!(binding, AttachmentBinding::Store(slot) if slot.format().is_depth()) {
                    return Err(Error::GraphDeclaration(format!(
                        "subpass {:?} uses {:?} as depth attachment",
                        subpass.id, binding
                    )));
                }
            }

            for &input in &subpass.inputs {
                if !self.subpasses[..position].iter().any(|s| s.writes(input)) {
                    return Err(Error::GraphDeclaration(format!(
                        "subpass {:?} reads {:?} before any subpass writes it",
                        subpass.id, input
                    )));
                }
            }
        }

        for edge in &self.edges {
            let in_range = |end: EdgeEnd| match end {
                EdgeEnd::External => true,
                EdgeEnd::Subpass(id) => (id.index() as usize) < self.subpasses.len(),
            };
            let ordered = match (edge.src, edge.dst) {
                (EdgeEnd::External, EdgeEnd::External) => false,
                (EdgeEnd::Subpass(src), EdgeEnd::Subpass(dst)) => src < dst,
                _ => true,
            };
            if !in_range(edge.src) || !in_range(edge.dst) || !ordered {
                return Err(Error::GraphDeclaration(format!(
                    "invalid dependency edge {:?} -> {:?}",
                    edge.src, edge.dst
                )));
            }
        }

        if let Some(dep) = self.missing_dependencies().first() {
            return Err(Error::GraphDeclaration(format!(
                "subpass {:?} uses {:?} without a dependency on {:?}",
                dep.dst, dep.binding, dep.src
            )));
        }

        Ok(())
    }

    fn attachment_format(binding: AttachmentBinding, store: &AttachmentStore, swapchain_format: TextureFormat) -> Result<TextureFormat> {
        match binding {
            AttachmentBinding::Store(slot) => Ok(store.texture(slot)?.info().format),
            AttachmentBinding::SwapchainImage => Ok(swapchain_format),
        }
    }

    /// Lower the layout into a render pass description
    ///
    /// Intermediate attachments live only inside the render pass (cleared,
    /// not stored); the swapchain image is stored for presentation.
    /// Attachments carried across a subpass that does not touch them are
    /// listed as preserved.
    pub fn render_pass_desc(&self, store: &AttachmentStore, swapchain_format: TextureFormat) -> Result<RenderPassDesc> {
        let order = self.attachment_order();

        let mut attachments = Vec::with_capacity(order.len());
        for &binding in &order {
            let format = Self::attachment_format(binding, store, swapchain_format)?;
            let desc = match binding {
                AttachmentBinding::SwapchainImage => {
                    AttachmentDesc::color(format, LoadOp::Clear, StoreOp::Store, ImageLayout::PresentSrc)
                }
                _ if format.is_depth() => {
                    AttachmentDesc::depth(format, LoadOp::Clear, StoreOp::DontCare, ImageLayout::DepthStencilAttachment)
                }
                _ => AttachmentDesc::color(format, LoadOp::Clear, StoreOp::DontCare, ImageLayout::ShaderReadOnly),
            };
            attachments.push(desc);
        }

        let index_of = |binding: &AttachmentBinding| order.iter().position(|b| b == binding).unwrap_or(0) as u32;
        let reference = |binding: &AttachmentBinding, layout: ImageLayout| AttachmentReference {
            attachment: index_of(binding),
            layout,
        };

        let subpasses = self
            .subpasses
            .iter()
            .enumerate()
            .map(|(position, subpass)| {
                let preserve_attachments = order
                    .iter()
                    .filter(|&&binding| {
                        !subpass.uses(binding)
                            && self.subpasses[..position].iter().any(|s| s.writes(binding))
                            && self.subpasses[position + 1..].iter().any(|s| s.uses(binding))
                    })
                    .map(index_of)
                    .collect();
                SubpassDesc {
                    input_attachments: subpass
                        .inputs
                        .iter()
                        .map(|b| reference(b, ImageLayout::ShaderReadOnly))
                        .collect(),
                    color_attachments: subpass
                        .colors
                        .iter()
                        .map(|b| reference(b, ImageLayout::ColorAttachment))
                        .collect(),
                    depth_stencil_attachment: subpass
                        .depth
                        .as_ref()
                        .map(|b| reference(b, ImageLayout::DepthStencilAttachment)),
                    preserve_attachments,
                }
            })
            .collect();

        Ok(RenderPassDesc {
            attachments,
            subpasses,
            dependencies: self.edges.iter().map(DependencyEdge::to_subpass_dependency).collect(),
        })
    }

    /// One clear value per render pass attachment
    pub fn clear_values(&self, clear_color: [f32; 4]) -> Vec<ClearValue> {
        self.attachment_order()
            .into_iter()
            .map(|binding| match binding {
                AttachmentBinding::SwapchainImage => ClearValue::Color(clear_color),
                AttachmentBinding::Store(slot) if slot.format().is_depth() => {
                    ClearValue::DepthStencil { depth: 1.0, stencil: 0 }
                }
                AttachmentBinding::Store(_) => ClearValue::Color([0.0; 4]),
            })
            .collect()
    }

    /// Framebuffer attachment views, ordered like the render pass attachments
    pub fn framebuffer_attachments(
        &self,
        store: &AttachmentStore,
        swapchain_image: &Arc<dyn RenderTarget>,
    ) -> Result<Vec<Arc<dyn RenderTarget>>> {
        self.attachment_order()
            .into_iter()
            .map(|binding| match binding {
                AttachmentBinding::Store(slot) => store.target(slot).cloned(),
                AttachmentBinding::SwapchainImage => Ok(swapchain_image.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "graph_layout_tests.rs"]
mod tests;
