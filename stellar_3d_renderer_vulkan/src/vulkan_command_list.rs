/// CommandList - Vulkan implementation of the CommandList trait

use stellar_3d_renderer::stellar3d::{Result, Error};
use stellar_3d_renderer::stellar3d::render::{
    ClearValue, CommandList as RendererCommandList, DescriptorSet as RendererDescriptorSet,
    Framebuffer as RendererFramebuffer, IndexType, Pipeline as RendererPipeline,
    PipelineBindPoint, Rect2D, RenderPass as RendererRenderPass, ShaderStageFlags,
    Texture as RendererTexture, TextureBarrier, Buffer as RendererBuffer, Viewport,
};
use stellar_3d_renderer::engine_err;
use ash::vk;
use std::sync::Arc;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor_set::DescriptorSet;
use crate::vulkan_format::{
    access_flags_to_vk, barrier_aspect, image_layout_to_vk, index_type_to_vk,
    pipeline_stages_to_vk, shader_stage_flags_to_vk,
};
use crate::vulkan_frame_buffer::Framebuffer;
use crate::vulkan_pipeline::Pipeline;
use crate::vulkan_render_pass::RenderPass;
use crate::vulkan_texture::Texture;

/// Vulkan command list implementation
///
/// Owns its command pool and a single primary command buffer.
pub struct CommandList {
    ctx: Arc<GpuContext>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    is_recording: bool,
    in_render_pass: bool,
    current_subpass: u32,
    subpass_count: u32,
    /// Layout of the last bound pipeline (push constants)
    bound_pipeline_layout: Option<vk::PipelineLayout>,
}

fn vk_pipeline(pipeline: &Arc<dyn RendererPipeline>) -> &Pipeline {
    unsafe { &*(pipeline.as_ref() as *const dyn RendererPipeline as *const Pipeline) }
}

fn vk_buffer(buffer: &Arc<dyn RendererBuffer>) -> &Buffer {
    unsafe { &*(buffer.as_ref() as *const dyn RendererBuffer as *const Buffer) }
}

impl CommandList {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        unsafe {
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT);

            let command_pool = ctx.device.create_command_pool(&command_pool_create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create command pool: {:?}", e))?;

            let command_buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffers = match ctx.device.allocate_command_buffers(&command_buffer_allocate_info) {
                Ok(buffers) => buffers,
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    return Err(engine_err!("stellar3d::vulkan", "Failed to allocate command buffer: {:?}", e));
                }
            };

            Ok(Self {
                ctx,
                command_pool,
                command_buffer: command_buffers[0],
                is_recording: false,
                in_render_pass: false,
                current_subpass: 0,
                subpass_count: 0,
                bound_pipeline_layout: None,
            })
        }
    }

    /// Underlying Vulkan command buffer
    pub(crate) fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    fn require_recording(&self, what: &str) -> Result<()> {
        if !self.is_recording {
            return Err(Error::InvalidState(format!("{} while not recording", what)));
        }
        Ok(())
    }

    fn require_outside_render_pass(&self, what: &str) -> Result<()> {
        self.require_recording(what)?;
        if self.in_render_pass {
            return Err(Error::InvalidState(format!("{} inside a render pass", what)));
        }
        Ok(())
    }

    fn require_inside_render_pass(&self, what: &str) -> Result<()> {
        self.require_recording(what)?;
        if !self.in_render_pass {
            return Err(Error::InvalidState(format!("{} outside a render pass", what)));
        }
        Ok(())
    }
}

impl RendererCommandList for CommandList {
    fn reset(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(Error::InvalidState("command pool reset while recording".to_string()));
        }

        unsafe {
            self.ctx.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to reset command pool: {:?}", e))?;
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(Error::InvalidState("begin while already recording".to_string()));
        }

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            self.ctx.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to begin command buffer: {:?}", e))?;
        }

        self.is_recording = true;
        self.in_render_pass = false;
        self.bound_pipeline_layout = None;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.require_outside_render_pass("end")?;

        unsafe {
            self.ctx.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to end command buffer: {:?}", e))?;
        }

        self.is_recording = false;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.is_recording
    }

    fn begin_render_pass(
        &mut self,
        render_pass: &Arc<dyn RendererRenderPass>,
        framebuffer: &Arc<dyn RendererFramebuffer>,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        self.require_outside_render_pass("begin_render_pass")?;

        if clear_values.len() != render_pass.attachment_count() as usize {
            return Err(Error::InvalidState(format!(
                "{} clear values for {} attachments",
                clear_values.len(),
                render_pass.attachment_count()
            )));
        }

        let vk_render_pass = unsafe {
            &*(render_pass.as_ref() as *const dyn RendererRenderPass as *const RenderPass)
        };
        let vk_framebuffer = unsafe {
            &*(framebuffer.as_ref() as *const dyn RendererFramebuffer as *const Framebuffer)
        };

        let vk_clear_values: Vec<vk::ClearValue> = clear_values
            .iter()
            .map(|cv| match cv {
                ClearValue::Color(color) => vk::ClearValue {
                    color: vk::ClearColorValue { float32: *color },
                },
                ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: *depth, stencil: *stencil },
                },
            })
            .collect();

        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(vk_render_pass.render_pass)
            .framebuffer(vk_framebuffer.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: framebuffer.width(),
                    height: framebuffer.height(),
                },
            })
            .clear_values(&vk_clear_values);

        unsafe {
            self.ctx.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }

        self.in_render_pass = true;
        self.current_subpass = 0;
        self.subpass_count = render_pass.subpass_count();
        Ok(())
    }

    fn next_subpass(&mut self) -> Result<()> {
        self.require_inside_render_pass("next_subpass")?;
        if self.current_subpass + 1 >= self.subpass_count {
            return Err(Error::InvalidState(format!("no subpass after {}", self.current_subpass)));
        }

        unsafe {
            self.ctx.device.cmd_next_subpass(self.command_buffer, vk::SubpassContents::INLINE);
        }
        self.current_subpass += 1;
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.require_inside_render_pass("end_render_pass")?;
        if self.current_subpass + 1 != self.subpass_count {
            return Err(Error::InvalidState(format!(
                "render pass ended on subpass {} of {}",
                self.current_subpass, self.subpass_count
            )));
        }

        unsafe {
            self.ctx.device.cmd_end_render_pass(self.command_buffer);
        }
        self.in_render_pass = false;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.require_recording("set_viewport")?;

        let vk_viewport = vk::Viewport::default()
            .x(viewport.x)
            .y(viewport.y)
            .width(viewport.width)
            .height(viewport.height)
            .min_depth(viewport.min_depth)
            .max_depth(viewport.max_depth);

        unsafe {
            self.ctx.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.require_recording("set_scissor")?;

        let vk_scissor = vk::Rect2D::default()
            .offset(vk::Offset2D { x: scissor.x, y: scissor.y })
            .extent(vk::Extent2D { width: scissor.width, height: scissor.height });

        unsafe {
            self.ctx.device.cmd_set_scissor(self.command_buffer, 0, &[vk_scissor]);
        }
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &Arc<dyn RendererPipeline>) -> Result<()> {
        self.require_recording("bind_pipeline")?;
        if pipeline.bind_point() == PipelineBindPoint::RayTracing && self.in_render_pass {
            return Err(Error::InvalidState("ray tracing pipeline bound inside a render pass".to_string()));
        }

        let vk_pipeline = vk_pipeline(pipeline);
        unsafe {
            self.ctx.device.cmd_bind_pipeline(
                self.command_buffer,
                vk_pipeline.vk_bind_point(),
                vk_pipeline.pipeline,
            );
        }

        self.bound_pipeline_layout = Some(vk_pipeline.pipeline_layout);
        Ok(())
    }

    fn bind_descriptor_set(
        &mut self,
        pipeline: &Arc<dyn RendererPipeline>,
        set_index: u32,
        set: &Arc<dyn RendererDescriptorSet>,
    ) -> Result<()> {
        self.require_recording("bind_descriptor_set")?;
        if set.set_index() != set_index || set_index as usize >= pipeline.set_layouts().len() {
            return Err(Error::InvalidState(format!("descriptor set bound at wrong index {}", set_index)));
        }

        let vk_pipeline = vk_pipeline(pipeline);
        let vk_set = unsafe {
            &*(set.as_ref() as *const dyn RendererDescriptorSet as *const DescriptorSet)
        };

        unsafe {
            self.ctx.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk_pipeline.vk_bind_point(),
                vk_pipeline.pipeline_layout,
                set_index,
                &[vk_set.descriptor_set],
                &[],
            );
        }
        Ok(())
    }

    fn push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) -> Result<()> {
        self.require_recording("push_constants")?;

        let layout = self.bound_pipeline_layout.ok_or_else(|| {
            Error::InvalidState("push_constants with no pipeline bound".to_string())
        })?;

        unsafe {
            self.ctx.device.cmd_push_constants(
                self.command_buffer,
                layout,
                shader_stage_flags_to_vk(stages),
                offset,
                data,
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn RendererBuffer>, offset: u64) -> Result<()> {
        self.require_recording("bind_vertex_buffer")?;

        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(
                self.command_buffer,
                0,
                &[vk_buffer(buffer).buffer],
                &[offset],
            );
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &Arc<dyn RendererBuffer>, offset: u64, index_type: IndexType) -> Result<()> {
        self.require_recording("bind_index_buffer")?;

        unsafe {
            self.ctx.device.cmd_bind_index_buffer(
                self.command_buffer,
                vk_buffer(buffer).buffer,
                offset,
                index_type_to_vk(index_type),
            );
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.require_inside_render_pass("draw")?;

        unsafe {
            self.ctx.device.cmd_draw(
                self.command_buffer,
                vertex_count,
                1, // instance_count
                first_vertex,
                0, // first_instance
            );
        }
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        self.require_inside_render_pass("draw_indexed")?;

        unsafe {
            self.ctx.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                1, // instance_count
                first_index,
                vertex_offset,
                0, // first_instance
            );
        }
        Ok(())
    }

    fn trace_rays(&mut self, pipeline: &Arc<dyn RendererPipeline>, width: u32, height: u32) -> Result<()> {
        self.require_outside_render_pass("trace_rays")?;
        if pipeline.bind_point() != PipelineBindPoint::RayTracing {
            return Err(Error::InvalidState("trace_rays with a graphics pipeline".to_string()));
        }

        let rt = self.ctx.ray_tracing.as_ref().ok_or_else(|| {
            Error::Unsupported("trace_rays on a device without ray tracing".to_string())
        })?;
        let sbt = vk_pipeline(pipeline).sbt.as_ref().ok_or_else(|| {
            engine_err!("stellar3d::vulkan", "ray tracing pipeline has no shader binding table")
        })?;

        unsafe {
            rt.pipeline.cmd_trace_rays(
                self.command_buffer,
                &sbt.raygen,
                &sbt.miss,
                &sbt.hit,
                &sbt.callable,
                width,
                height,
                1,
            );
        }
        Ok(())
    }

    fn texture_barrier(&mut self, texture: &dyn RendererTexture, barrier: TextureBarrier) -> Result<()> {
        self.require_outside_render_pass("texture_barrier")?;

        let vk_texture = unsafe { &*(texture as *const dyn RendererTexture as *const Texture) };
        let info = texture.info();

        let image_barrier = vk::ImageMemoryBarrier::default()
            .old_layout(image_layout_to_vk(barrier.old_layout))
            .new_layout(image_layout_to_vk(barrier.new_layout))
            .src_access_mask(access_flags_to_vk(barrier.src_access))
            .dst_access_mask(access_flags_to_vk(barrier.dst_access))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(vk_texture.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: barrier_aspect(info.format),
                base_mip_level: 0,
                level_count: info.mip_levels,
                base_array_layer: 0,
                layer_count: info.array_layers,
            });

        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                self.command_buffer,
                pipeline_stages_to_vk(barrier.src_stages),
                pipeline_stages_to_vk(barrier.dst_stages),
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            );
        }
        Ok(())
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        unsafe {
            // Frees the command buffer with it
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
