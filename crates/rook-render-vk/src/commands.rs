// SPDX-License-Identifier: CEPL-1.0
use crate::error::VkCall;
use crate::pipeline::{scissor_for, RenderPipeline};
use anyhow::{Context, Result};
use ash::vk;
use rook_render::DrawParams;

pub unsafe fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(views.len());
    for view in views {
        let fb_info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: 1,
            p_attachments: view,
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        framebuffers.push(
            device
                .create_framebuffer(&fb_info, None)
                .vk("vkCreateFramebuffer")?,
        );
    }
    Ok(framebuffers)
}

pub struct FrameRecipe {
    pub clear: [f32; 4],
    pub draw: DrawParams,
}

/// One primary command buffer per framebuffer, recorded once and replayed every frame.
pub struct CommandRecording {
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandRecording {
    pub unsafe fn record(
        device: &ash::Device,
        queue_family: u32,
        pipeline: &RenderPipeline,
        framebuffers: &[vk::Framebuffer],
        extent: vk::Extent2D,
        recipe: &FrameRecipe,
    ) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            ..Default::default()
        };
        let pool = device
            .create_command_pool(&pool_info, None)
            .vk("vkCreateCommandPool")?;
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: framebuffers.len() as u32,
            ..Default::default()
        };
        let buffers = device
            .allocate_command_buffers(&alloc_info)
            .vk("vkAllocateCommandBuffers")?;

        let recording = CommandRecording { pool, buffers };
        for (i, (&cmd, &fb)) in recording.buffers.iter().zip(framebuffers).enumerate() {
            record_one(device, cmd, pipeline, fb, extent, recipe)
                .with_context(|| format!("recording command buffer {i}"))?;
        }
        Ok(recording)
    }

    pub fn buffer(&self, image: u32) -> Option<vk::CommandBuffer> {
        self.buffers.get(image as usize).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.buffers.len()
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if !self.buffers.is_empty() {
            device.free_command_buffers(self.pool, &self.buffers);
            self.buffers.clear();
        }
        device.destroy_command_pool(self.pool, None);
    }
}

unsafe fn record_one(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    pipeline: &RenderPipeline,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    recipe: &FrameRecipe,
) -> Result<()> {
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .vk("vkBeginCommandBuffer")?;

    let clears = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: recipe.clear,
        },
    }];
    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: pipeline.render_pass,
        framebuffer,
        render_area: scissor_for(extent),
        clear_value_count: clears.len() as u32,
        p_clear_values: clears.as_ptr(),
        ..Default::default()
    };

    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
    device.cmd_set_line_width(cmd, 1.0);
    device.cmd_draw(cmd, recipe.draw.vertex_count, recipe.draw.instance_count, 0, 0);
    device.cmd_end_render_pass(cmd);

    device.end_command_buffer(cmd).vk("vkEndCommandBuffer")?;
    Ok(())
}
