/// Pipeline - Vulkan implementation of the Pipeline trait (graphics and ray tracing)

use stellar_3d_renderer::stellar3d::{Result, Error};
use stellar_3d_renderer::stellar3d::render::{
    ColorBlend, DescriptorSetLayoutDesc, GraphicsPipelineDesc, Pipeline as RendererPipeline,
    PipelineBindPoint, PushConstantRange, RenderPass as RendererRenderPass,
    Shader as RendererShader, VertexInputRate,
};
use stellar_3d_renderer::engine_err;
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    compare_op_to_vk, cull_mode_to_vk, descriptor_type_to_vk, front_face_to_vk,
    shader_stage_flags_to_vk, texture_format_to_vk,
};
use crate::vulkan_ray_tracing::ShaderBindingTable;
use crate::vulkan_render_pass::RenderPass;
use crate::vulkan_shader::{check_reflected_bindings, Shader};

/// Vulkan pipeline implementation
pub struct Pipeline {
    ctx: Arc<GpuContext>,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    /// One per declared set, indexed by set number
    pub(crate) descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    set_layouts: Vec<DescriptorSetLayoutDesc>,
    push_constant_ranges: Vec<PushConstantRange>,
    bind_point: PipelineBindPoint,
    /// Shader binding table (ray tracing pipelines only)
    pub(crate) sbt: Option<ShaderBindingTable>,
}

/// Downcast an engine shader to the Vulkan shader
pub(crate) fn vk_shader(shader: &Arc<dyn RendererShader>) -> &Shader {
    unsafe { &*(shader.as_ref() as *const dyn RendererShader as *const Shader) }
}

impl Pipeline {
    /// Create the descriptor set layouts and the pipeline layout; the
    /// pipeline handle itself is filled in by the caller
    pub(crate) fn with_layout(
        ctx: Arc<GpuContext>,
        bind_point: PipelineBindPoint,
        set_layouts: Vec<DescriptorSetLayoutDesc>,
        push_constant_ranges: Vec<PushConstantRange>,
    ) -> Result<Self> {
        let mut result = Self {
            ctx,
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            descriptor_set_layouts: Vec::with_capacity(set_layouts.len()),
            set_layouts,
            push_constant_ranges,
            bind_point,
            sbt: None,
        };

        unsafe {
            for layout_desc in &result.set_layouts {
                let bindings: Vec<vk::DescriptorSetLayoutBinding> = layout_desc.bindings
                    .iter()
                    .map(|entry| {
                        vk::DescriptorSetLayoutBinding::default()
                            .binding(entry.binding)
                            .descriptor_type(descriptor_type_to_vk(entry.descriptor_type))
                            .descriptor_count(1)
                            .stage_flags(shader_stage_flags_to_vk(entry.stages))
                    })
                    .collect();

                let layout_create = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
                let ds_layout = result.ctx.device.create_descriptor_set_layout(&layout_create, None)
                    .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create descriptor set layout: {:?}", e))?;
                result.descriptor_set_layouts.push(ds_layout);
            }

            let push_constant_ranges: Vec<vk::PushConstantRange> = result.push_constant_ranges
                .iter()
                .map(|range| vk::PushConstantRange {
                    stage_flags: shader_stage_flags_to_vk(range.stages),
                    offset: range.offset,
                    size: range.size,
                })
                .collect();

            let layout_create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&result.descriptor_set_layouts)
                .push_constant_ranges(&push_constant_ranges);

            result.pipeline_layout = result.ctx.device.create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create pipeline layout: {:?}", e))?;
        }

        Ok(result)
    }

    pub(crate) fn new_graphics(ctx: Arc<GpuContext>, desc: &GraphicsPipelineDesc) -> Result<Self> {
        let vertex_shader = vk_shader(desc.vertex_shader);
        let fragment_shader = desc.fragment_shader.map(vk_shader);

        let mut reflections = vec![vertex_shader.reflection()];
        reflections.extend(fragment_shader.map(Shader::reflection));
        check_reflected_bindings(desc.label, &reflections, &desc.set_layouts)?;

        let vk_render_pass = unsafe {
            &*(desc.render_pass.as_ref() as *const dyn RendererRenderPass as *const RenderPass)
        };
        if desc.subpass >= desc.render_pass.subpass_count() {
            return Err(Error::InvalidResource(format!(
                "pipeline '{}' targets subpass {} of a render pass with {} subpasses",
                desc.label,
                desc.subpass,
                desc.render_pass.subpass_count()
            )));
        }

        let mut result = Self::with_layout(
            ctx,
            PipelineBindPoint::Graphics,
            desc.set_layouts.clone(),
            desc.push_constant_ranges.clone(),
        )?;

        let mut shader_stages = vec![
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader.module)
                .name(&vertex_shader.entry_point),
        ];
        if let Some(fragment_shader) = fragment_shader {
            shader_stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(fragment_shader.module)
                    .name(&fragment_shader.entry_point),
            );
        }

        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc.vertex_layout.bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: match binding.input_rate {
                    VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
                    VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
                },
            })
            .collect();

        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc.vertex_layout.attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: texture_format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let mut rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(desc.cull_mode))
            .front_face(front_face_to_vk(desc.front_face));
        if let Some(bias) = desc.depth.bias {
            rasterization_state = rasterization_state
                .depth_bias_enable(true)
                .depth_bias_constant_factor(bias.constant)
                .depth_bias_slope_factor(bias.slope);
        }

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth.test)
            .depth_write_enable(desc.depth.write)
            .depth_compare_op(compare_op_to_vk(desc.depth.compare))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachment = match desc.blend {
            ColorBlend::Opaque => vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false),
            ColorBlend::AlphaBlend => vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
        };
        let blend_attachments = vec![blend_attachment; desc.color_attachment_count as usize];

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .depth_stencil_state(&depth_stencil_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(result.pipeline_layout)
            .render_pass(vk_render_pass.render_pass)
            .subpass(desc.subpass);

        let pipelines = unsafe {
            result.ctx.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_create_info],
                None,
            )
            .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create graphics pipeline '{}': {:?}", desc.label, e.1))?
        };
        result.pipeline = pipelines[0];

        Ok(result)
    }

    pub(crate) fn vk_bind_point(&self) -> vk::PipelineBindPoint {
        match self.bind_point {
            PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineBindPoint::RayTracing => vk::PipelineBindPoint::RAY_TRACING_KHR,
        }
    }
}

impl RendererPipeline for Pipeline {
    fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    fn set_layouts(&self) -> &[DescriptorSetLayoutDesc] {
        &self.set_layouts
    }

    fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.ctx.device.destroy_pipeline(self.pipeline, None);
            }
            if self.pipeline_layout != vk::PipelineLayout::null() {
                self.ctx.device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            for &layout in &self.descriptor_set_layouts {
                self.ctx.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}
