// SPDX-License-Identifier: CEPL-1.0
use crate::error::VkCall;
use anyhow::Result;
use ash::vk;

pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// Ring of per-frame sync objects. Outlives every swapchain generation.
pub struct FrameSyncSet {
    slots: Vec<FrameSlot>,
}

impl FrameSyncSet {
    pub unsafe fn new(device: &ash::Device, count: usize) -> Result<Self> {
        let sem_ci = vk::SemaphoreCreateInfo::default();
        // signaled so the first wait on each slot returns immediately
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };

        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            slots.push(FrameSlot {
                image_available: device
                    .create_semaphore(&sem_ci, None)
                    .vk("vkCreateSemaphore")?,
                render_finished: device
                    .create_semaphore(&sem_ci, None)
                    .vk("vkCreateSemaphore")?,
                in_flight: device.create_fence(&fence_ci, None).vk("vkCreateFence")?,
            });
        }
        Ok(FrameSyncSet { slots })
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index % self.slots.len()]
    }

    /// A suboptimal acquire leaves its semaphore signal pending with nothing to consume it.
    /// Swap in a fresh one. The device must be idle.
    pub unsafe fn renew_image_available(&mut self, device: &ash::Device, index: usize) -> Result<()> {
        let fresh = device
            .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            .vk("vkCreateSemaphore")?;
        let len = self.slots.len();
        let slot = &mut self.slots[index % len];
        device.destroy_semaphore(slot.image_available, None);
        slot.image_available = fresh;
        Ok(())
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for slot in self.slots.drain(..) {
            device.destroy_fence(slot.in_flight, None);
            device.destroy_semaphore(slot.render_finished, None);
            device.destroy_semaphore(slot.image_available, None);
        }
    }
}
