// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::swapchain as khr_swapchain;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rook_render::{
    Acquire, FrameBackend, FrameCounter, FrameOutcome, FrameSynchronizer, PresentStatus, Rebuild,
    RenderSettings, RenderSize, Renderer,
};
use tracing::{debug, info};

pub mod commands;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod swapchain;
pub mod sync;

pub use error::VkRenderError;

use commands::{create_framebuffers, CommandRecording, FrameRecipe};
use device::{Gpu, LogicalDevice};
use error::VkCall;
use instance::VkInstance;
use pipeline::{RenderPipeline, ShaderSet};
use swapchain::{SurfaceConfiguration, SurfaceSupport, Swapchain};
use sync::FrameSyncSet;

/// Everything that lives exactly as long as one swapchain.
struct SwapchainResources {
    swapchain: Swapchain,
    pipeline: RenderPipeline,
    framebuffers: Vec<vk::Framebuffer>,
    commands: CommandRecording,
}

impl SwapchainResources {
    // STRICT TEARDOWN ORDER:
    // command buffers -> framebuffers -> image views -> pipeline/render pass.
    // The swapchain handle itself is handed back so the next build can retire it.
    unsafe fn release(mut self, device: &ash::Device) -> vk::SwapchainKHR {
        self.commands.destroy(device);
        for fb in self.framebuffers.drain(..) {
            device.destroy_framebuffer(fb, None);
        }
        self.swapchain.destroy_views(device);
        self.pipeline.destroy(device);
        self.swapchain.handle
    }
}

struct VkBackend {
    instance: VkInstance,
    gpu: Gpu,
    device: LogicalDevice,
    swapchain_loader: khr_swapchain::Device,
    shaders: ShaderSet,
    recipe: FrameRecipe,
    window_size: RenderSize,
    sync: FrameSyncSet,
    chain: Option<SwapchainResources>,
}

impl VkBackend {
    fn chain(&self) -> Result<&SwapchainResources> {
        self.chain.as_ref().context("swapchain not built")
    }

    unsafe fn build_chain(
        &self,
        config: SurfaceConfiguration,
        old: vk::SwapchainKHR,
    ) -> Result<SwapchainResources> {
        let d = &self.device.device;
        let swapchain = Swapchain::create(
            d,
            &self.swapchain_loader,
            self.instance.surface,
            &self.gpu.families,
            config,
            old,
        )
        .context("create swapchain")?;
        let pipeline = RenderPipeline::create(d, &self.shaders, config.format.format, config.extent)
            .context("create pipeline")?;
        let framebuffers =
            create_framebuffers(d, pipeline.render_pass, &swapchain.views, config.extent)?;
        let commands = CommandRecording::record(
            d,
            self.gpu.families.graphics,
            &pipeline,
            &framebuffers,
            config.extent,
            &self.recipe,
        )?;
        let images = swapchain.images.len();
        debug_assert_eq!(swapchain.views.len(), images);
        debug_assert_eq!(framebuffers.len(), images);
        debug_assert_eq!(commands.len(), images);
        Ok(SwapchainResources {
            swapchain,
            pipeline,
            framebuffers,
            commands,
        })
    }
}

impl FrameBackend for VkBackend {
    type Guard = vk::Fence;

    fn image_count(&self) -> usize {
        self.chain
            .as_ref()
            .map_or(0, |c| c.swapchain.images.len())
    }

    fn slot_guard(&self, slot: usize) -> vk::Fence {
        self.sync.slot(slot).in_flight
    }

    fn wait_guard(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[fence], true, u64::MAX)
                .vk("vkWaitForFences")?;
        }
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> Result<Acquire> {
        let handle = self.chain()?.swapchain.handle;
        let semaphore = self.sync.slot(slot).image_available;
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(handle, u64::MAX, semaphore, vk::Fence::null())
        };
        match result {
            Ok((image, false)) => Ok(Acquire::Image(image)),
            // suboptimal still signals the semaphore
            Ok((_, true)) => Ok(Acquire::Stale { signaled: true }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::Stale { signaled: false }),
            Err(result) => Err(VkRenderError::Vulkan {
                call: "vkAcquireNextImageKHR",
                result,
            }
            .into()),
        }
    }

    fn submit(&mut self, slot: usize, image: u32) -> Result<()> {
        let cmd = self
            .chain()?
            .commands
            .buffer(image)
            .with_context(|| format!("no command buffer for image {image}"))?;
        let s = self.sync.slot(slot);
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_finished,
            ..Default::default()
        };
        unsafe {
            let d = &self.device.device;
            d.reset_fences(&[s.in_flight]).vk("vkResetFences")?;
            d.queue_submit(
                self.device.graphics_queue,
                std::slice::from_ref(&submit),
                s.in_flight,
            )
            .vk("vkQueueSubmit")?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<PresentStatus> {
        let handle = self.chain()?.swapchain.handle;
        let s = self.sync.slot(slot);
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.render_finished,
            swapchain_count: 1,
            p_swapchains: &handle,
            p_image_indices: &image,
            ..Default::default()
        };
        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue, &present)
        };
        match result {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::Stale),
            Err(result) => Err(VkRenderError::Vulkan {
                call: "vkQueuePresentKHR",
                result,
            }
            .into()),
        }
    }

    fn renew_acquire_signals(&mut self, slots: &[usize]) -> Result<()> {
        let d = &self.device.device;
        unsafe {
            d.device_wait_idle().vk("vkDeviceWaitIdle")?;
            for &slot in slots {
                self.sync.renew_image_available(d, slot)?;
            }
        }
        debug!("vk: renewed image-available semaphores for slots {:?}", slots);
        Ok(())
    }

    fn rebuild(&mut self) -> Result<Rebuild> {
        if self.window_size.is_empty() {
            return Ok(Rebuild::Deferred);
        }

        let config = unsafe {
            self.device
                .device
                .device_wait_idle()
                .vk("vkDeviceWaitIdle")?;
            let support = SurfaceSupport::query(
                &self.instance.surface_loader,
                self.gpu.phys,
                self.instance.surface,
            )?;
            SurfaceConfiguration::derive(&support, self.window_size)?
        };
        if config.size().is_empty() {
            debug!("vk: surface extent is 0x0, keeping the current swapchain");
            return Ok(Rebuild::Deferred);
        }

        unsafe {
            let old = match self.chain.take() {
                Some(chain) => chain.release(&self.device.device),
                None => vk::SwapchainKHR::null(),
            };
            let next = self.build_chain(config, old);
            if old != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old, None);
            }
            self.chain = Some(next?);
        }

        info!(
            "vk: swapchain {}x{}, {:?}/{:?}, {:?}, {} images",
            config.extent.width,
            config.extent.height,
            config.format.format,
            config.format.color_space,
            config.present_mode,
            self.image_count()
        );
        Ok(Rebuild::Done)
    }
}

// STRICT TEARDOWN ORDER:
// device idle -> swapchain resources -> swapchain -> sync ring -> device
// -> surface -> instance
impl Drop for VkBackend {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device.device;
            d.device_wait_idle().ok();

            if let Some(chain) = self.chain.take() {
                let handle = chain.release(d);
                self.swapchain_loader.destroy_swapchain(handle, None);
            }
            self.sync.destroy(d);
            d.destroy_device(None);

            self.instance.destroy();
        }
    }
}

pub struct VkRenderer {
    frames: FrameSynchronizer<vk::Fence>,
    backend: VkBackend,
}

impl VkRenderer {
    pub fn frame_counter(&self) -> FrameCounter {
        self.frames.counter()
    }

    pub fn device_name(&self) -> &str {
        &self.backend.gpu.name
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let shader_dir = match &settings.shader_dir {
            Some(dir) => dir.clone(),
            None => rook_core::executable_dir()?.join("assets").join("shaders"),
        };
        let shaders = ShaderSet::load(&shader_dir)?;
        let validation = settings.validation && cfg!(debug_assertions);
        let ring = settings.frames_in_flight.max(1);

        let backend = unsafe {
            let instance = VkInstance::new(window, display, &settings.app_name, validation)
                .context("create instance and surface")?;
            let gpu = device::pick_physical_device(
                &instance.instance,
                &instance.surface_loader,
                instance.surface,
            )?;
            let device = LogicalDevice::new(&instance.instance, &gpu)?;
            let swapchain_loader = khr_swapchain::Device::new(&instance.instance, &device.device);
            let sync = FrameSyncSet::new(&device.device, ring)?;
            VkBackend {
                instance,
                gpu,
                device,
                swapchain_loader,
                shaders,
                recipe: FrameRecipe {
                    clear: settings.clear_color,
                    draw: settings.draw,
                },
                window_size: size,
                sync,
                chain: None,
            }
        };

        let mut r = VkRenderer {
            frames: FrameSynchronizer::new(ring, 0),
            backend,
        };
        if !r.frames.rebuild(&mut r.backend)? {
            info!("vk: window is empty, first swapchain deferred");
        }
        info!("vk: {} frames in flight", ring);
        Ok(r)
    }

    fn resize(&mut self, size: RenderSize) {
        let paused = self.backend.window_size.is_empty();
        if size.is_empty() && !paused {
            info!("vk: resize to 0x0 -> paused");
        } else if !size.is_empty() && paused {
            info!("vk: resize to {}x{} -> resumed", size.width, size.height);
        }
        self.backend.window_size = size;
        self.frames.request_rebuild();
    }

    fn render(&mut self) -> Result<FrameOutcome> {
        if self.backend.window_size.is_empty() {
            return Ok(FrameOutcome::default());
        }
        if self.backend.chain.is_none() {
            let rebuilt = self.frames.rebuild(&mut self.backend)?;
            return Ok(FrameOutcome {
                submitted: false,
                rebuilt,
            });
        }
        self.frames.draw_frame(&mut self.backend)
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.backend.device.device.device_wait_idle() }.vk("vkDeviceWaitIdle")?;
        Ok(())
    }
}
