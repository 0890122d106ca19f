// SPDX-License-Identifier: CEPL-1.0
use crate::device::FamilyIndices;
use crate::error::{VkCall, VkRenderError};
use anyhow::Result;
use ash::khr::{surface, swapchain};
use ash::vk;
use rook_render::RenderSize;
use tracing::debug;

/// Live capability snapshot. Queried again on every build, never kept across a resize.
pub struct SurfaceSupport {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub unsafe fn query(
        loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self, VkRenderError> {
        Ok(SurfaceSupport {
            caps: loader
                .get_physical_device_surface_capabilities(phys, surface)
                .vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
            formats: loader
                .get_physical_device_surface_formats(phys, surface)
                .vk("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
            present_modes: loader
                .get_physical_device_surface_present_modes(phys, surface)
                .vk("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
        })
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// MAILBOX, then FIFO_RELAXED, then FIFO which every driver must offer.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO_RELAXED]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.min_image_count == caps.max_image_count {
        caps.min_image_count
    } else {
        caps.min_image_count + 1
    }
}

/// Images are shared across both families when they differ.
pub fn sharing_mode(families: &FamilyIndices) -> (vk::SharingMode, &[u32]) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, &[])
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceConfiguration {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl SurfaceConfiguration {
    pub fn derive(support: &SurfaceSupport, window: RenderSize) -> Result<Self, VkRenderError> {
        let format = choose_surface_format(&support.formats).ok_or(VkRenderError::NoSurfaceFormats)?;
        Ok(SurfaceConfiguration {
            format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.caps, window),
            image_count: choose_image_count(&support.caps),
            transform: support.caps.current_transform,
        })
    }

    pub fn size(&self) -> RenderSize {
        RenderSize {
            width: self.extent.width,
            height: self.extent.height,
        }
    }
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

impl Swapchain {
    /// `old` is retired by the driver; the caller destroys it once this returns.
    pub unsafe fn create(
        device: &ash::Device,
        loader: &swapchain::Device,
        surface: vk::SurfaceKHR,
        families: &FamilyIndices,
        config: SurfaceConfiguration,
        old: vk::SwapchainKHR,
    ) -> Result<Self> {
        let (sharing, family_list) = sharing_mode(families);
        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: config.image_count,
            image_format: config.format.format,
            image_color_space: config.format.color_space,
            image_extent: config.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_list.len() as u32,
            p_queue_family_indices: family_list.as_ptr(),
            pre_transform: config.transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: config.present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };

        let handle = loader
            .create_swapchain(&swap_info, None)
            .vk("vkCreateSwapchainKHR")?;
        let images = loader
            .get_swapchain_images(handle)
            .vk("vkGetSwapchainImagesKHR")?;
        debug!("swapchain: {} images ({:?})", images.len(), sharing);

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            views.push(create_view(device, image, config.format.format)?);
        }

        Ok(Swapchain {
            handle,
            images,
            views,
        })
    }

    pub unsafe fn destroy_views(&mut self, device: &ash::Device) {
        for view in self.views.drain(..) {
            device.destroy_image_view(view, None);
        }
    }
}

unsafe fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, VkRenderError> {
    let info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        components: vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        },
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    device
        .create_image_view(&info, None)
        .vk("vkCreateImageView")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rook_render::SquareViewport;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        }
    }

    fn size(width: u32, height: u32) -> RenderSize {
        RenderSize { width, height }
    }

    fn sf(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    const TRACK: (u32, u32) = (u32::MAX, u32::MAX);

    #[test]
    fn srgb_bgra_preferred() {
        let formats = [
            sf(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[1]));
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            sf(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_priority() {
        use vk::PresentModeKHR as P;
        assert_eq!(choose_present_mode(&[P::FIFO, P::IMMEDIATE, P::MAILBOX]), P::MAILBOX);
        assert_eq!(choose_present_mode(&[P::FIFO, P::FIFO_RELAXED]), P::FIFO_RELAXED);
        assert_eq!(choose_present_mode(&[P::IMMEDIATE, P::FIFO]), P::FIFO);
        assert_eq!(choose_present_mode(&[]), P::FIFO);
    }

    #[test]
    fn sentinel_extent_follows_window() {
        let c = caps(TRACK, (1, 1), (4096, 4096));
        assert_eq!(
            choose_extent(&c, size(1280, 720)),
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn sentinel_extent_is_clamped_per_axis() {
        let c = caps(TRACK, (64, 64), (1920, 1080));
        assert_eq!(
            choose_extent(&c, size(4000, 10)),
            vk::Extent2D {
                width: 1920,
                height: 64
            }
        );
    }

    #[test]
    fn fixed_extent_ignores_window() {
        let c = caps((1024, 768), (1, 1), (4096, 4096));
        assert_eq!(
            choose_extent(&c, size(300, 200)),
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );
    }

    #[test]
    fn image_count_policy() {
        let mut c = caps(TRACK, (1, 1), (1, 1));
        assert_eq!(choose_image_count(&c), 3);

        c.max_image_count = 0;
        assert_eq!(choose_image_count(&c), 3);

        c.max_image_count = 2;
        assert_eq!(choose_image_count(&c), 2);
    }

    #[test]
    fn sharing_follows_family_split() {
        let shared = FamilyIndices::new(1, 1);
        let (mode, list) = sharing_mode(&shared);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(list.is_empty());

        let split = FamilyIndices::new(0, 2);
        let (mode, list) = sharing_mode(&split);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(list, &[0, 2]);
    }

    #[test]
    fn resize_shrinks_configuration_and_viewport() {
        let support = SurfaceSupport {
            caps: caps(TRACK, (1, 1), (4096, 4096)),
            formats: vec![sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let before = SurfaceConfiguration::derive(&support, size(800, 600)).unwrap();
        assert_eq!(before.size(), size(800, 600));

        let after = SurfaceConfiguration::derive(&support, size(400, 300)).unwrap();
        assert_eq!(after.size(), size(400, 300));
        assert_eq!(after.format, before.format);

        let vp = SquareViewport::fit(after.size());
        assert_eq!((vp.x, vp.y, vp.side), (50.0, 0.0, 300.0));
    }

    #[test]
    fn configuration_needs_a_format() {
        let support = SurfaceSupport {
            caps: caps(TRACK, (1, 1), (4096, 4096)),
            formats: Vec::new(),
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            SurfaceConfiguration::derive(&support, size(800, 600)),
            Err(VkRenderError::NoSurfaceFormats)
        ));
    }
}
