/// Ray tracing support: acceleration structures, ray tracing pipelines and
/// their shader binding tables
///
/// Only reachable when the device enabled the ray tracing extensions
/// (`GpuContext::ray_tracing` is `Some`).

use stellar_3d_renderer::stellar3d::{Result, Error};
use stellar_3d_renderer::stellar3d::render::{
    AccelerationStructure as RendererAccelerationStructure, Buffer as RendererBuffer,
    PipelineBindPoint, RayTracingPipelineDesc, ShaderStage,
};
use stellar_3d_renderer::{engine_debug, engine_err};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::{GpuContext, RayTracingLoaders, RayTracingProperties};
use crate::vulkan_pipeline::{vk_shader, Pipeline};
use crate::vulkan_shader::check_reflected_bindings;

/// Round `value` up to the next multiple of `alignment` (a power of two)
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    (value + alignment - 1) & !(alignment - 1)
}

// ===== SHADER BINDING TABLE =====

/// Offset, stride and size of one shader binding table region, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct SbtRegion {
    pub offset: u64,
    pub stride: u64,
    pub size: u64,
}

/// Placement of the raygen, miss and hit regions inside one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SbtLayout {
    pub handle_size: u64,
    /// Handle size rounded to the handle alignment (record stride)
    pub handle_stride: u64,
    pub raygen: SbtRegion,
    pub miss: SbtRegion,
    pub hit: SbtRegion,
    pub total_size: u64,
}

impl SbtLayout {
    /// One raygen record, `miss_count` miss records, `hit_count` hit records
    pub(crate) fn new(properties: &RayTracingProperties, miss_count: u32, hit_count: u32) -> Self {
        let handle_size = properties.handle_size as u64;
        let base_alignment = properties.base_alignment as u64;
        let handle_stride = align_up(handle_size, properties.handle_alignment as u64);

        // The raygen region's size must equal its stride
        let raygen_stride = align_up(handle_stride, base_alignment);
        let raygen = SbtRegion { offset: 0, stride: raygen_stride, size: raygen_stride };

        let miss = SbtRegion {
            offset: raygen.offset + raygen.size,
            stride: handle_stride,
            size: align_up(miss_count as u64 * handle_stride, base_alignment),
        };

        let hit = SbtRegion {
            offset: miss.offset + miss.size,
            stride: handle_stride,
            size: align_up(hit_count as u64 * handle_stride, base_alignment),
        };

        Self {
            handle_size,
            handle_stride,
            raygen,
            miss,
            hit,
            total_size: hit.offset + hit.size,
        }
    }

    /// Byte offset of the record of shader group `group`, groups ordered
    /// raygen, misses, hits
    pub(crate) fn record_offset(&self, group: u32, miss_count: u32) -> u64 {
        let group = group as u64;
        let miss_count = miss_count as u64;
        if group == 0 {
            self.raygen.offset
        } else if group <= miss_count {
            self.miss.offset + (group - 1) * self.handle_stride
        } else {
            self.hit.offset + (group - 1 - miss_count) * self.handle_stride
        }
    }
}

/// Shader binding table buffer plus the regions passed to `vkCmdTraceRaysKHR`
pub(crate) struct ShaderBindingTable {
    _buffer: Buffer,
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    pub miss: vk::StridedDeviceAddressRegionKHR,
    pub hit: vk::StridedDeviceAddressRegionKHR,
    pub callable: vk::StridedDeviceAddressRegionKHR,
}

fn strided_region(base: u64, region: &SbtRegion) -> vk::StridedDeviceAddressRegionKHR {
    if region.size == 0 {
        return vk::StridedDeviceAddressRegionKHR::default();
    }
    vk::StridedDeviceAddressRegionKHR::default()
        .device_address(base + region.offset)
        .stride(region.stride)
        .size(region.size)
}

fn loaders(ctx: &GpuContext) -> Result<&RayTracingLoaders> {
    ctx.ray_tracing.as_ref().ok_or_else(|| {
        Error::Unsupported("ray tracing extensions are not enabled on this device".to_string())
    })
}

// ===== RAY TRACING PIPELINE =====

pub(crate) fn create_ray_tracing_pipeline(
    ctx: Arc<GpuContext>,
    desc: &RayTracingPipelineDesc,
) -> Result<Pipeline> {
    let properties = loaders(&ctx)?.properties;

    if desc.max_recursion_depth == 0 || desc.max_recursion_depth > properties.max_recursion_depth {
        return Err(Error::Unsupported(format!(
            "pipeline '{}' asks for recursion depth {}, device allows 1..={}",
            desc.label, desc.max_recursion_depth, properties.max_recursion_depth
        )));
    }

    let raygen = vk_shader(desc.raygen_shader);
    let misses: Vec<_> = desc.miss_shaders.iter().map(|s| vk_shader(s)).collect();
    let hit = desc.closest_hit_shader.map(vk_shader);

    let stage_ok = desc.raygen_shader.stage() == ShaderStage::RayGen
        && desc.miss_shaders.iter().all(|s| s.stage() == ShaderStage::Miss)
        && desc.closest_hit_shader.map_or(true, |s| s.stage() == ShaderStage::ClosestHit);
    if !stage_ok {
        return Err(Error::InvalidResource(format!(
            "pipeline '{}': shader stages do not match raygen/miss/closest-hit slots",
            desc.label
        )));
    }

    let mut reflections = vec![raygen.reflection()];
    reflections.extend(misses.iter().map(|s| s.reflection()));
    reflections.extend(hit.map(|s| s.reflection()));
    check_reflected_bindings(desc.label, &reflections, &desc.set_layouts)?;

    let mut pipeline = Pipeline::with_layout(
        Arc::clone(&ctx),
        PipelineBindPoint::RayTracing,
        desc.set_layouts.clone(),
        desc.push_constant_ranges.clone(),
    )?;

    let mut stages = vec![
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::RAYGEN_KHR)
            .module(raygen.module)
            .name(&raygen.entry_point),
    ];
    for miss in &misses {
        stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::MISS_KHR)
                .module(miss.module)
                .name(&miss.entry_point),
        );
    }
    if let Some(hit) = hit {
        stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::CLOSEST_HIT_KHR)
                .module(hit.module)
                .name(&hit.entry_point),
        );
    }

    // One group per stage, same order as `stages`
    let general_group = |index: usize| {
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
            .general_shader(index as u32)
            .closest_hit_shader(vk::SHADER_UNUSED_KHR)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR)
    };
    let mut groups: Vec<vk::RayTracingShaderGroupCreateInfoKHR> =
        (0..=misses.len()).map(general_group).collect();
    if hit.is_some() {
        groups.push(
            vk::RayTracingShaderGroupCreateInfoKHR::default()
                .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
                .general_shader(vk::SHADER_UNUSED_KHR)
                .closest_hit_shader(misses.len() as u32 + 1)
                .any_hit_shader(vk::SHADER_UNUSED_KHR)
                .intersection_shader(vk::SHADER_UNUSED_KHR),
        );
    }

    let create_info = vk::RayTracingPipelineCreateInfoKHR::default()
        .stages(&stages)
        .groups(&groups)
        .max_pipeline_ray_recursion_depth(desc.max_recursion_depth)
        .layout(pipeline.pipeline_layout);

    let rt = loaders(&ctx)?;
    let pipelines = unsafe {
        rt.pipeline
            .create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                &[create_info],
                None,
            )
            .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create ray tracing pipeline '{}': {:?}", desc.label, e))?
    };
    pipeline.pipeline = pipelines[0];

    let miss_count = misses.len() as u32;
    let hit_count = if hit.is_some() { 1 } else { 0 };
    pipeline.sbt = Some(build_shader_binding_table(
        &ctx,
        rt,
        pipeline.pipeline,
        groups.len() as u32,
        miss_count,
        hit_count,
    )?);

    engine_debug!("stellar3d::vulkan",
        "Ray tracing pipeline '{}' created ({} miss, {} hit groups)", desc.label, miss_count, hit_count);

    Ok(pipeline)
}

fn build_shader_binding_table(
    ctx: &Arc<GpuContext>,
    rt: &RayTracingLoaders,
    pipeline: vk::Pipeline,
    group_count: u32,
    miss_count: u32,
    hit_count: u32,
) -> Result<ShaderBindingTable> {
    let layout = SbtLayout::new(&rt.properties, miss_count, hit_count);
    let handle_size = layout.handle_size as usize;

    let handles = unsafe {
        rt.pipeline
            .get_ray_tracing_shader_group_handles(pipeline, 0, group_count, group_count as usize * handle_size)
            .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to read shader group handles: {:?}", e))?
    };

    // Extra base_alignment bytes so the table start can be aligned inside the allocation
    let base_alignment = rt.properties.base_alignment as u64;
    let buffer = Buffer::allocate(
        Arc::clone(ctx),
        "shader_binding_table",
        layout.total_size + base_alignment,
        vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryLocation::CpuToGpu,
    )?;

    let buffer_address = buffer.device_address();
    let base = align_up(buffer_address, base_alignment);
    let padding = base - buffer_address;

    let mut table = vec![0u8; layout.total_size as usize];
    for group in 0..group_count {
        let src = group as usize * handle_size;
        let dst = layout.record_offset(group, miss_count) as usize;
        table[dst..dst + handle_size].copy_from_slice(&handles[src..src + handle_size]);
    }
    buffer.update(padding, &table)?;

    Ok(ShaderBindingTable {
        raygen: strided_region(base, &layout.raygen),
        miss: strided_region(base, &layout.miss),
        hit: strided_region(base, &layout.hit),
        callable: vk::StridedDeviceAddressRegionKHR::default(),
        _buffer: buffer,
    })
}

// ===== ACCELERATION STRUCTURES =====

/// Bottom-level (triangle geometry) or top-level (instances) acceleration structure
pub struct AccelerationStructure {
    ctx: Arc<GpuContext>,
    pub(crate) handle: vk::AccelerationStructureKHR,
    _storage: Buffer,
    address: u64,
    /// Bottom-level structures referenced by a top-level structure
    _children: Vec<Arc<AccelerationStructure>>,
}

/// One instance of a bottom-level structure in a top-level structure
pub struct AccelerationStructureInstance {
    pub blas: Arc<AccelerationStructure>,
    /// Row-major 3x4 object-to-world transform
    pub transform: [f32; 12],
}

/// Triangle mesh input of a bottom-level build
///
/// Vertices are `R32G32B32_SFLOAT` positions at the start of each
/// `vertex_stride`-byte element; indices are `u32`. Both buffers need
/// `BufferUsage::DEVICE_ADDRESS`.
pub struct TriangleGeometry<'a> {
    pub vertex_buffer: &'a Arc<dyn RendererBuffer>,
    pub vertex_count: u32,
    pub vertex_stride: u64,
    pub index_buffer: &'a Arc<dyn RendererBuffer>,
    pub index_count: u32,
}

fn addressable(buffer: &Arc<dyn RendererBuffer>, what: &str) -> Result<u64> {
    let vk_buffer = unsafe { &*(buffer.as_ref() as *const dyn RendererBuffer as *const Buffer) };
    if !vk_buffer.usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
        return Err(Error::InvalidResource(format!(
            "{} buffer needs BufferUsage::DEVICE_ADDRESS for acceleration structure builds",
            what
        )));
    }
    Ok(vk_buffer.device_address())
}

impl AccelerationStructure {
    pub(crate) fn build_bottom_level(ctx: Arc<GpuContext>, geometry: &TriangleGeometry) -> Result<Self> {
        if geometry.index_count == 0 || geometry.index_count % 3 != 0 || geometry.vertex_count == 0 {
            return Err(Error::InvalidResource(format!(
                "bottom-level geometry needs vertices and a multiple of 3 indices (got {} vertices, {} indices)",
                geometry.vertex_count, geometry.index_count
            )));
        }

        let vertex_address = addressable(geometry.vertex_buffer, "vertex")?;
        let index_address = addressable(geometry.index_buffer, "index")?;

        let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
            .vertex_format(vk::Format::R32G32B32_SFLOAT)
            .vertex_data(vk::DeviceOrHostAddressConstKHR { device_address: vertex_address })
            .vertex_stride(geometry.vertex_stride)
            .max_vertex(geometry.vertex_count - 1)
            .index_type(vk::IndexType::UINT32)
            .index_data(vk::DeviceOrHostAddressConstKHR { device_address: index_address });

        let vk_geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
            .flags(vk::GeometryFlagsKHR::OPAQUE);

        Self::build(
            ctx,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            vk_geometry,
            geometry.index_count / 3,
            Vec::new(),
        )
    }

    pub(crate) fn build_top_level(
        ctx: Arc<GpuContext>,
        instances: &[AccelerationStructureInstance],
    ) -> Result<Self> {
        let vk_instances: Vec<vk::AccelerationStructureInstanceKHR> = instances
            .iter()
            .enumerate()
            .map(|(index, instance)| vk::AccelerationStructureInstanceKHR {
                transform: vk::TransformMatrixKHR { matrix: instance.transform },
                instance_custom_index_and_mask: vk::Packed24_8::new(index as u32, 0xff),
                instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
                    0,
                    vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8,
                ),
                acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
                    device_handle: instance.blas.address,
                },
            })
            .collect();

        let instance_bytes = unsafe {
            std::slice::from_raw_parts(
                vk_instances.as_ptr() as *const u8,
                std::mem::size_of_val(vk_instances.as_slice()),
            )
        };

        let instance_buffer = Buffer::allocate(
            Arc::clone(&ctx),
            "tlas_instances",
            (instance_bytes.len() as u64).max(1),
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::CpuToGpu,
        )?;
        instance_buffer.update(0, instance_bytes)?;

        let instances_data = vk::AccelerationStructureGeometryInstancesDataKHR::default()
            .array_of_pointers(false)
            .data(vk::DeviceOrHostAddressConstKHR { device_address: instance_buffer.device_address() });

        let vk_geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR { instances: instances_data });

        // The build waits for completion, so the instance buffer may drop afterwards
        Self::build(
            ctx,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            vk_geometry,
            vk_instances.len() as u32,
            instances.iter().map(|i| Arc::clone(&i.blas)).collect(),
        )
    }

    fn build(
        ctx: Arc<GpuContext>,
        ty: vk::AccelerationStructureTypeKHR,
        geometry: vk::AccelerationStructureGeometryKHR,
        primitive_count: u32,
        children: Vec<Arc<AccelerationStructure>>,
    ) -> Result<Self> {
        let rt = loaders(&ctx)?;

        let mut build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(ty)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&geometry));

        let mut sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            rt.acceleration_structure.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_info,
                &[primitive_count],
                &mut sizes,
            );
        }

        let storage = Buffer::allocate(
            Arc::clone(&ctx),
            "acceleration_structure",
            sizes.acceleration_structure_size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
        )?;

        let scratch_alignment = rt.properties.scratch_alignment as u64;
        let scratch = Buffer::allocate(
            Arc::clone(&ctx),
            "acceleration_structure_scratch",
            sizes.build_scratch_size + scratch_alignment,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(storage.buffer)
            .size(sizes.acceleration_structure_size)
            .ty(ty);

        let handle = unsafe {
            rt.acceleration_structure
                .create_acceleration_structure(&create_info, None)
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to create acceleration structure: {:?}", e))?
        };

        // From here on Drop destroys the handle
        let mut result = Self {
            ctx: Arc::clone(&ctx),
            handle,
            _storage: storage,
            address: 0,
            _children: children,
        };

        build_info = build_info
            .dst_acceleration_structure(handle)
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: align_up(scratch.device_address(), scratch_alignment),
            });
        let range = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(primitive_count);

        ctx.submit_one_shot(|command_buffer| unsafe {
            rt.acceleration_structure.cmd_build_acceleration_structures(
                command_buffer,
                std::slice::from_ref(&build_info),
                &[std::slice::from_ref(&range)],
            );
        })?;

        result.address = unsafe {
            let info = vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(handle);
            rt.acceleration_structure.get_acceleration_structure_device_address(&info)
        };

        Ok(result)
    }
}

impl RendererAccelerationStructure for AccelerationStructure {
    fn device_address(&self) -> u64 {
        self.address
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        if let Some(rt) = &self.ctx.ray_tracing {
            unsafe {
                rt.acceleration_structure.destroy_acceleration_structure(self.handle, None);
            }
        }
    }
}

#[cfg(test)]
#[path = "vulkan_ray_tracing_tests.rs"]
mod tests;
