/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait

use stellar_3d_renderer::stellar3d::{Result, Error};
use stellar_3d_renderer::stellar3d::render::{
    AccelerationStructure as RendererAccelerationStructure, BindingResource,
    Buffer as RendererBuffer, BufferDesc, BufferUsage, CommandList as RendererCommandList,
    Config, DescriptorSet as RendererDescriptorSet, DeviceCapabilities,
    Fence as RendererFence, Framebuffer as RendererFramebuffer, FramebufferDesc,
    GraphicsDevice, GraphicsPipelineDesc, Pipeline as RendererPipeline,
    RayTracingPipelineDesc, RenderPass as RendererRenderPass, RenderPassDesc,
    RenderTarget as RendererRenderTarget, Semaphore as RendererSemaphore,
    Shader as RendererShader, ShaderDesc, SubmitInfo, Swapchain as RendererSwapchain,
    Texture as RendererTexture, TextureDesc, validate_bindings,
};
use stellar_3d_renderer::{engine_bail, engine_debug, engine_err, engine_error, engine_info, engine_warn};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::Buffer;
use crate::vulkan_command_list::CommandList;
use crate::vulkan_context::{GpuContext, RayTracingLoaders, RayTracingProperties};
use crate::vulkan_descriptor_set::DescriptorSet;
use crate::vulkan_format::pipeline_stages_to_vk;
use crate::vulkan_frame_buffer::Framebuffer;
use crate::vulkan_pipeline::Pipeline;
use crate::vulkan_ray_tracing::{
    create_ray_tracing_pipeline, AccelerationStructure, AccelerationStructureInstance,
    TriangleGeometry,
};
use crate::vulkan_render_pass::RenderPass;
use crate::vulkan_render_target::RenderTarget;
use crate::vulkan_sampler::SamplerCache;
use crate::vulkan_shader::Shader;
use crate::vulkan_swapchain::Swapchain;
use crate::vulkan_sync::{vk_fence, vk_semaphore, Fence, Semaphore};
use crate::vulkan_texture::Texture;

/// Device extensions required for ray tracing pipelines
const RAY_TRACING_EXTENSIONS: [&CStr; 3] = [
    ash::khr::acceleration_structure::NAME,
    ash::khr::ray_tracing_pipeline::NAME,
    ash::khr::deferred_host_operations::NAME,
];

/// Vulkan graphics device
///
/// Owns the instance, the logical device and the presentation surface.
/// Every resource it creates shares its `GpuContext`.
pub struct VulkanGraphicsDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    #[cfg(feature = "vulkan-validation")]
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    capabilities: DeviceCapabilities,

    sampler_cache: Mutex<SamplerCache>,

    gpu_context: Arc<GpuContext>,
}

impl VulkanGraphicsDevice {
    /// Create the device for `window`
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|_| Error::InitializationFailed("application name contains a NUL byte".to_string()))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Stellar3D")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window.display_handle()
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to get display handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get display handle: {}", e))
                })?;
            #[allow(unused_mut)]
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to get required extensions: {}", e);
                    Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                })?
                .to_vec();

            #[allow(unused_mut)]
            let mut layer_names: Vec<*const std::os::raw::c_char> = Vec::new();

            #[cfg(feature = "vulkan-validation")]
            if config.enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }
            #[cfg(not(feature = "vulkan-validation"))]
            if config.enable_validation {
                engine_warn!("stellar3d::vulkan",
                    "Validation requested but the crate was built without the 'vulkan-validation' feature");
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            #[cfg(feature = "vulkan-validation")]
            let debug_messenger = if config.enable_validation {
                Some(Self::create_debug_messenger(&entry, &instance, config)?)
            } else {
                None
            };

            let window_handle = window.window_handle()
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to get window handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get window handle: {}", e))
                })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!("stellar3d::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let (physical_device, queue_family) = Self::pick_physical_device(&instance, &surface_loader, surface)?;

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = properties.device_name_as_c_str().unwrap_or(c"unknown");
            engine_info!("stellar3d::vulkan", "Using GPU: {:?}", device_name);

            let ray_tracing = Self::supports_ray_tracing(&instance, physical_device);

            // Create logical device
            let queue_priorities = [1.0];
            let queue_create_infos = [
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(queue_family)
                    .queue_priorities(&queue_priorities),
            ];

            let mut device_extension_names = vec![ash::khr::swapchain::NAME.as_ptr()];
            if ray_tracing {
                device_extension_names.extend(RAY_TRACING_EXTENSIONS.iter().map(|name| name.as_ptr()));
            }

            let mut buffer_device_address_features = vk::PhysicalDeviceBufferDeviceAddressFeatures::default()
                .buffer_device_address(true);
            let mut acceleration_structure_features = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
                .acceleration_structure(true);
            let mut ray_tracing_features = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default()
                .ray_tracing_pipeline(true);
            let mut features2 = vk::PhysicalDeviceFeatures2::default();
            if ray_tracing {
                features2 = features2
                    .push_next(&mut buffer_device_address_features)
                    .push_next(&mut acceleration_structure_features)
                    .push_next(&mut ray_tracing_features);
            }

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .push_next(&mut features2);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let graphics_queue = device.get_device_queue(queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: ray_tracing,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("stellar3d::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let descriptor_pool = Self::create_descriptor_pool(&device, ray_tracing)?;

            // Reusable pool for one-shot uploads and acceleration structure builds
            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let upload_command_pool = device.create_command_pool(&upload_pool_create_info, None)
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to create upload command pool: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create upload command pool: {:?}", e))
                })?;

            let ray_tracing_loaders = if ray_tracing {
                Some(RayTracingLoaders {
                    pipeline: ash::khr::ray_tracing_pipeline::Device::new(&instance, &device),
                    acceleration_structure: ash::khr::acceleration_structure::Device::new(&instance, &device),
                    properties: Self::ray_tracing_properties(&instance, physical_device),
                })
            } else {
                None
            };

            let capabilities = DeviceCapabilities {
                ray_tracing,
                max_image_dimension_2d: properties.limits.max_image_dimension2_d,
                max_push_constants_size: properties.limits.max_push_constants_size,
            };
            engine_info!("stellar3d::vulkan", "Device ready (ray tracing: {}, max 2D image: {})",
                capabilities.ray_tracing, capabilities.max_image_dimension_2d);

            let gpu_context = Arc::new(GpuContext::new(
                device,
                allocator,
                graphics_queue,
                queue_family,
                upload_command_pool,
                descriptor_pool,
                ray_tracing_loaders,
            ));

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                surface,
                surface_loader,
                #[cfg(feature = "vulkan-validation")]
                debug_messenger,
                capabilities,
                sampler_cache: Mutex::new(SamplerCache::new(Arc::clone(&gpu_context))),
                gpu_context,
            })
        }
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &Config,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        crate::debug::init_debug_config(crate::debug::Config {
            severity: config.debug_severity,
            output: config.debug_output.clone(),
            message_filter: config.debug_message_filter,
            break_on_error: config.break_on_validation_error,
            panic_on_error: config.panic_on_error,
            enable_stats: config.enable_validation_stats,
        });

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::severity_flags(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils
            .create_debug_utils_messenger(&debug_info, None)
            .map_err(|e| {
                engine_error!("stellar3d::vulkan", "Failed to create debug messenger: {:?}", e);
                Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
            })?;

        Ok((debug_utils, messenger))
    }

    /// First GPU with a queue family that both renders and presents to `surface`
    unsafe fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| {
                engine_error!("stellar3d::vulkan", "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
            })?;

        for physical_device in physical_devices {
            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let family = queue_families.iter().enumerate().find(|(index, family)| {
                family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    && surface_loader
                        .get_physical_device_surface_support(physical_device, *index as u32, surface)
                        .unwrap_or(false)
            });
            if let Some((index, _)) = family {
                return Ok((physical_device, index as u32));
            }
        }

        engine_error!("stellar3d::vulkan", "No GPU with a graphics queue able to present");
        Err(Error::InitializationFailed("No Vulkan-capable GPU with presentation support found".to_string()))
    }

    /// Extensions and features for ray tracing pipelines are all present
    unsafe fn supports_ray_tracing(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> bool {
        let extensions = match instance.enumerate_device_extension_properties(physical_device) {
            Ok(extensions) => extensions,
            Err(_) => return false,
        };
        let has_extension = |name: &CStr| {
            extensions
                .iter()
                .any(|ext| ext.extension_name_as_c_str().map_or(false, |ext_name| ext_name == name))
        };
        if !RAY_TRACING_EXTENSIONS.iter().all(|name| has_extension(*name)) {
            engine_debug!("stellar3d::vulkan", "Ray tracing extensions not exposed by this GPU");
            return false;
        }

        let mut buffer_device_address = vk::PhysicalDeviceBufferDeviceAddressFeatures::default();
        let mut acceleration_structure = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
        let mut ray_tracing_pipeline = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut buffer_device_address)
            .push_next(&mut acceleration_structure)
            .push_next(&mut ray_tracing_pipeline);
        instance.get_physical_device_features2(physical_device, &mut features2);

        buffer_device_address.buffer_device_address == vk::TRUE
            && acceleration_structure.acceleration_structure == vk::TRUE
            && ray_tracing_pipeline.ray_tracing_pipeline == vk::TRUE
    }

    unsafe fn ray_tracing_properties(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> RayTracingProperties {
        let mut pipeline_properties = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut acceleration_structure_properties = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
        let mut properties2 = vk::PhysicalDeviceProperties2::default()
            .push_next(&mut pipeline_properties)
            .push_next(&mut acceleration_structure_properties);
        instance.get_physical_device_properties2(physical_device, &mut properties2);

        RayTracingProperties {
            handle_size: pipeline_properties.shader_group_handle_size,
            handle_alignment: pipeline_properties.shader_group_handle_alignment,
            base_alignment: pipeline_properties.shader_group_base_alignment,
            max_recursion_depth: pipeline_properties.max_ray_recursion_depth,
            scratch_alignment: acceleration_structure_properties.min_acceleration_structure_scratch_offset_alignment,
        }
    }

    /// Descriptor pool with fixed capacity (1024 sets)
    ///
    /// Created with `FREE_DESCRIPTOR_SET` so every `DescriptorSet` hands its
    /// slot back on drop. Called during init and whenever every pool is full.
    fn create_descriptor_pool(device: &ash::Device, ray_tracing: bool) -> Result<vk::DescriptorPool> {
        let mut pool_sizes = vec![
            vk::DescriptorPoolSize { ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER, descriptor_count: 2048 },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER, descriptor_count: 1024 },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_BUFFER, descriptor_count: 1024 },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::INPUT_ATTACHMENT, descriptor_count: 1024 },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_IMAGE, descriptor_count: 256 },
        ];
        if ray_tracing {
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                descriptor_count: 64,
            });
        }
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(1024);

        unsafe {
            device.create_descriptor_pool(&info, None)
                .map_err(|e| {
                    engine_error!("stellar3d::vulkan", "Failed to create descriptor pool: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create descriptor pool: {:?}", e))
                })
        }
    }

    /// Allocate one set of `layout`
    ///
    /// Tries every existing pool (freed sets leave room in older ones) and
    /// only creates a new pool when all of them are full. Returns the pool
    /// the set came from so the set can be freed back into it.
    pub(crate) fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<(vk::DescriptorPool, vk::DescriptorSet)> {
        let device = &self.gpu_context.device;
        let layouts = [layout];
        let mut pools = self.gpu_context.descriptor_pools.lock().unwrap();

        for &pool in pools.iter().rev() {
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);
            match unsafe { device.allocate_descriptor_sets(&allocate_info) } {
                Ok(sets) => return Ok((pool, sets[0])),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => continue,
                Err(e) => return Err(engine_err!("stellar3d::vulkan", "Failed to allocate descriptor set: {:?}", e)),
            }
        }

        let new_pool = Self::create_descriptor_pool(device, self.capabilities.ray_tracing)?;
        pools.push(new_pool);
        engine_info!("stellar3d::vulkan",
            "Descriptor pools full, created new pool (total: {})", pools.len());
        let retry_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(new_pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            device.allocate_descriptor_sets(&retry_info)
                .map_err(|e| engine_err!("stellar3d::vulkan",
                    "Failed to allocate descriptor set after pool growth: {:?}", e))?
        };
        Ok((new_pool, sets[0]))
    }

    pub(crate) fn gpu_context(&self) -> &Arc<GpuContext> {
        &self.gpu_context
    }

    /// Number of descriptor pools created so far
    pub fn descriptor_pool_count(&self) -> usize {
        self.gpu_context.descriptor_pools.lock().unwrap().len()
    }

    /// Build a bottom-level acceleration structure over one triangle mesh
    pub fn build_bottom_level(&self, geometry: &TriangleGeometry) -> Result<Arc<AccelerationStructure>> {
        Ok(Arc::new(AccelerationStructure::build_bottom_level(Arc::clone(&self.gpu_context), geometry)?))
    }

    /// Build a top-level acceleration structure over bottom-level instances
    pub fn build_top_level(&self, instances: &[AccelerationStructureInstance]) -> Result<Arc<AccelerationStructure>> {
        Ok(Arc::new(AccelerationStructure::build_top_level(Arc::clone(&self.gpu_context), instances)?))
    }
}

fn vk_texture(texture: &dyn RendererTexture) -> &Texture {
    unsafe { &*(texture as *const dyn RendererTexture as *const Texture) }
}

fn vk_buffer(buffer: &dyn RendererBuffer) -> &Buffer {
    unsafe { &*(buffer as *const dyn RendererBuffer as *const Buffer) }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn RendererTexture>> {
        let max = self.capabilities.max_image_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(Error::InvalidResource(format!(
                "texture '{}' extent {}x{} exceeds device limit {}",
                desc.label, desc.width, desc.height, max
            )));
        }
        Ok(Arc::new(Texture::new(Arc::clone(&self.gpu_context), desc)?))
    }

    fn create_render_target(
        &self,
        texture: &Arc<dyn RendererTexture>,
        layer: u32,
        mip_level: u32,
    ) -> Result<Arc<dyn RendererRenderTarget>> {
        Ok(Arc::new(RenderTarget::new_texture_target(
            Arc::clone(&self.gpu_context),
            texture,
            layer,
            mip_level,
        )?))
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn RendererBuffer>> {
        if desc.usage.contains(BufferUsage::DEVICE_ADDRESS) && !self.capabilities.ray_tracing {
            return Err(Error::Unsupported(format!(
                "buffer '{}' asks for device addresses, which this device does not enable",
                desc.label
            )));
        }
        Ok(Arc::new(Buffer::new(Arc::clone(&self.gpu_context), &desc)?))
    }

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn RendererShader>> {
        Ok(Arc::new(Shader::new(Arc::clone(&self.gpu_context), desc)?))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<dyn RendererRenderPass>> {
        Ok(Arc::new(RenderPass::new(Arc::clone(&self.gpu_context), desc)?))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<Arc<dyn RendererFramebuffer>> {
        Ok(Arc::new(Framebuffer::new(Arc::clone(&self.gpu_context), desc)?))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<dyn RendererPipeline>> {
        Ok(Arc::new(Pipeline::new_graphics(Arc::clone(&self.gpu_context), desc)?))
    }

    fn create_ray_tracing_pipeline(&self, desc: &RayTracingPipelineDesc) -> Result<Arc<dyn RendererPipeline>> {
        Ok(Arc::new(create_ray_tracing_pipeline(Arc::clone(&self.gpu_context), desc)?))
    }

    fn create_descriptor_set(
        &self,
        pipeline: &Arc<dyn RendererPipeline>,
        set_index: u32,
        resources: &[BindingResource],
    ) -> Result<Arc<dyn RendererDescriptorSet>> {
        let vk_pipeline = unsafe { &*(pipeline.as_ref() as *const dyn RendererPipeline as *const Pipeline) };

        let layout_desc = pipeline.set_layouts().get(set_index as usize).ok_or_else(|| {
            Error::InvalidResource(format!(
                "create_descriptor_set: set {} out of range (pipeline has {} layouts)",
                set_index,
                pipeline.set_layouts().len()
            ))
        })?;
        validate_bindings(layout_desc, resources)?;

        let (pool, descriptor_set) =
            self.allocate_descriptor_set(vk_pipeline.descriptor_set_layouts[set_index as usize])?;
        // Freed back into `pool` if a write below fails
        let set = DescriptorSet::new(
            Arc::clone(&self.gpu_context),
            pool,
            descriptor_set,
            set_index,
            resources.len() as u32,
        );

        // First pass: the infos the writes point into
        let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::new();
        let mut image_infos: Vec<vk::DescriptorImageInfo> = Vec::new();
        let mut acceleration_structures: Vec<vk::AccelerationStructureKHR> = Vec::new();

        for resource in resources {
            match resource {
                BindingResource::UniformBuffer(buffer) | BindingResource::StorageBuffer(buffer) => {
                    buffer_infos.push(
                        vk::DescriptorBufferInfo::default()
                            .buffer(vk_buffer(*buffer).buffer)
                            .offset(0)
                            .range(vk::WHOLE_SIZE),
                    );
                }
                BindingResource::SampledTexture(texture, sampler_type) => {
                    let sampler = self.sampler_cache.lock().unwrap().get(*sampler_type)?;
                    let layout = if texture.info().format.is_depth() {
                        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                    } else {
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                    };
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_layout(layout)
                            .image_view(vk_texture(*texture).view)
                            .sampler(sampler),
                    );
                }
                BindingResource::InputAttachment(texture) => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                            .image_view(vk_texture(*texture).view),
                    );
                }
                BindingResource::StorageImage(texture) => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_layout(vk::ImageLayout::GENERAL)
                            .image_view(vk_texture(*texture).view),
                    );
                }
                BindingResource::AccelerationStructure(tlas) => {
                    if !self.capabilities.ray_tracing {
                        engine_bail!("stellar3d::vulkan",
                            "create_descriptor_set: acceleration structure bound on a device without ray tracing");
                    }
                    let vk_tlas = unsafe {
                        &*(*tlas as *const dyn RendererAccelerationStructure as *const AccelerationStructure)
                    };
                    acceleration_structures.push(vk_tlas.handle);
                }
            }
        }

        let mut acceleration_structure_writes: Vec<vk::WriteDescriptorSetAccelerationStructureKHR> =
            acceleration_structures
                .iter()
                .map(|handle| {
                    vk::WriteDescriptorSetAccelerationStructureKHR::default()
                        .acceleration_structures(std::slice::from_ref(handle))
                })
                .collect();

        // Second pass: writes with pointers into the infos
        let mut buffer_idx = 0usize;
        let mut image_idx = 0usize;
        let mut acceleration_structure_iter = acceleration_structure_writes.iter_mut();
        let mut writes: Vec<vk::WriteDescriptorSet> = Vec::with_capacity(resources.len());

        for (binding_index, resource) in resources.iter().enumerate() {
            let write = vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(binding_index as u32)
                .dst_array_element(0);

            let write = match resource {
                BindingResource::UniformBuffer(_) | BindingResource::StorageBuffer(_) => {
                    let ty = if matches!(resource, BindingResource::UniformBuffer(_)) {
                        vk::DescriptorType::UNIFORM_BUFFER
                    } else {
                        vk::DescriptorType::STORAGE_BUFFER
                    };
                    buffer_idx += 1;
                    write
                        .descriptor_type(ty)
                        .buffer_info(std::slice::from_ref(&buffer_infos[buffer_idx - 1]))
                }
                BindingResource::SampledTexture(..)
                | BindingResource::InputAttachment(_)
                | BindingResource::StorageImage(_) => {
                    let ty = match resource {
                        BindingResource::SampledTexture(..) => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        BindingResource::InputAttachment(_) => vk::DescriptorType::INPUT_ATTACHMENT,
                        _ => vk::DescriptorType::STORAGE_IMAGE,
                    };
                    image_idx += 1;
                    write
                        .descriptor_type(ty)
                        .image_info(std::slice::from_ref(&image_infos[image_idx - 1]))
                }
                BindingResource::AccelerationStructure(_) => {
                    let as_write = acceleration_structure_iter.next().ok_or_else(|| {
                        engine_err!("stellar3d::vulkan", "create_descriptor_set: acceleration structure write missing")
                    })?;
                    let mut write = write
                        .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                        .push_next(as_write);
                    // No info slice sets the count for this descriptor kind
                    write.descriptor_count = 1;
                    write
                }
            };
            writes.push(write);
        }

        unsafe {
            self.gpu_context.device.update_descriptor_sets(&writes, &[]);
        }

        Ok(Arc::new(set))
    }

    fn create_command_list(&self) -> Result<Box<dyn RendererCommandList>> {
        Ok(Box::new(CommandList::new(Arc::clone(&self.gpu_context))?))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn RendererFence>> {
        Ok(Box::new(Fence::new(Arc::clone(&self.gpu_context), signaled)?))
    }

    fn create_semaphore(&self) -> Result<Box<dyn RendererSemaphore>> {
        Ok(Box::new(Semaphore::new(Arc::clone(&self.gpu_context))?))
    }

    fn create_swapchain(&self, width: u32, height: u32) -> Result<Box<dyn RendererSwapchain>> {
        Ok(Box::new(Swapchain::new(
            Arc::clone(&self.gpu_context),
            &self.instance,
            self.physical_device,
            self.surface,
            self.surface_loader.clone(),
            width,
            height,
        )?))
    }

    fn submit(&self, info: &SubmitInfo) -> Result<()> {
        for command_list in info.command_lists {
            if command_list.is_recording() {
                return Err(Error::InvalidState("submit of a command list still recording".to_string()));
            }
        }

        let command_buffers: Vec<vk::CommandBuffer> = info.command_lists
            .iter()
            .map(|cmd| unsafe {
                (*(*cmd as *const dyn RendererCommandList as *const CommandList)).command_buffer()
            })
            .collect();

        let wait_semaphores: Vec<vk::Semaphore> = info.wait_semaphores
            .iter()
            .map(|(semaphore, _)| vk_semaphore(*semaphore))
            .collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = info.wait_semaphores
            .iter()
            .map(|(_, stages)| pipeline_stages_to_vk(*stages))
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = info.signal_semaphores
            .iter()
            .map(|semaphore| vk_semaphore(*semaphore))
            .collect();
        let fence = info.fence.map_or(vk::Fence::null(), vk_fence);

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let result = unsafe {
            self.gpu_context.device.queue_submit(self.gpu_context.graphics_queue, &[submit_info], fence)
        };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                engine_error!("stellar3d::vulkan", "Device lost during queue submit");
                Err(Error::DeviceLost("device lost during queue submit".to_string()))
            }
            Err(e) => Err(engine_err!("stellar3d::vulkan", "Failed to submit commands to GPU queue: {:?}", e)),
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.gpu_context.device
                .device_wait_idle()
                .map_err(|e| engine_err!("stellar3d::vulkan", "Failed to wait idle: {:?}", e))
        }
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            self.gpu_context.device.device_wait_idle().ok();

            // 1. Destroy samplers and release the cache's GpuContext reference
            self.sampler_cache.get_mut().unwrap().shutdown();

            // 2. Device-owned objects
            //    Sets still alive after this see their pool gone and skip the free
            for pool in self.gpu_context.descriptor_pools.lock().unwrap().drain(..) {
                self.gpu_context.device.destroy_descriptor_pool(pool, None);
            }
            {
                let mut pool = self.gpu_context.upload_command_pool.lock().unwrap();
                if *pool != vk::CommandPool::null() {
                    self.gpu_context.device.destroy_command_pool(*pool, None);
                    *pool = vk::CommandPool::null();
                }
            }

            // 3. Free allocator pages before the device goes away
            //    (only possible once every resource has released its context)
            if let Some(ctx) = Arc::get_mut(&mut self.gpu_context) {
                ManuallyDrop::drop(&mut ctx.allocator);
            } else {
                engine_warn!("stellar3d::vulkan", "GPU resources outlive the device; allocator pages leak");
            }

            // 4. No callbacks during teardown
            crate::debug::cleanup_debug_config();

            #[cfg(feature = "vulkan-validation")]
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 5. Surface, device, instance
            self.surface_loader.destroy_surface(self.surface, None);
            self.gpu_context.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
