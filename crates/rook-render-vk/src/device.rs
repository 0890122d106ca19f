// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection and the logical device built on top of it.
//!
//! Selection is first-match in enumeration order. The GPU queries are reduced to a
//! [`DeviceCandidate`] so the policy itself needs no driver.

use crate::error::{VkCall, VkRenderError};
use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Instance};
use std::ffi::{CStr, CString};
use tracing::{debug, info};

pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DeviceCandidate {
    pub name: String,
    pub extensions: Vec<CString>,
    pub format_count: usize,
    pub present_mode_count: usize,
    pub families: Vec<QueueFamilySupport>,
}

/// What a device reports about the window surface.
#[derive(Clone, Debug, Default)]
pub struct SurfaceReport {
    pub format_count: usize,
    pub present_mode_count: usize,
    pub families: Vec<QueueFamilySupport>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FamilyIndices {
    pub graphics: u32,
    pub present: u32,
    unique: Vec<u32>,
}

impl FamilyIndices {
    pub fn new(graphics: u32, present: u32) -> Self {
        let unique = if graphics == present {
            vec![graphics]
        } else {
            vec![graphics, present]
        };
        FamilyIndices {
            graphics,
            present,
            unique,
        }
    }

    /// Graphics first, then present if it differs.
    pub fn unique(&self) -> &[u32] {
        &self.unique
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// A family that does both wins; otherwise the first of each.
pub fn find_queue_families(families: &[QueueFamilySupport]) -> Option<FamilyIndices> {
    if let Some(both) = families.iter().position(|f| f.graphics && f.present) {
        return Some(FamilyIndices::new(both as u32, both as u32));
    }
    let graphics = families.iter().position(|f| f.graphics)?;
    let present = families.iter().position(|f| f.present)?;
    Some(FamilyIndices::new(graphics as u32, present as u32))
}

impl DeviceCandidate {
    /// Runs `query_surface` only when the device has the required extensions. A device
    /// without them is kept with an empty surface report and fails `evaluate`.
    pub fn gather<F>(name: String, extensions: Vec<CString>, query_surface: F) -> Result<Self>
    where
        F: FnOnce() -> Result<SurfaceReport>,
    {
        let mut candidate = DeviceCandidate {
            name,
            extensions,
            ..DeviceCandidate::default()
        };
        if candidate.supports_extensions(&REQUIRED_DEVICE_EXTENSIONS) {
            let report = query_surface()?;
            candidate.format_count = report.format_count;
            candidate.present_mode_count = report.present_mode_count;
            candidate.families = report.families;
        }
        Ok(candidate)
    }

    pub fn supports_extensions(&self, required: &[&CStr]) -> bool {
        required
            .iter()
            .all(|r| self.extensions.iter().any(|e| e.as_c_str() == *r))
    }

    pub fn evaluate(&self) -> Option<FamilyIndices> {
        if !self.supports_extensions(&REQUIRED_DEVICE_EXTENSIONS) {
            debug!("{}: missing required extensions", self.name);
            return None;
        }
        if self.format_count == 0 || self.present_mode_count == 0 {
            debug!(
                "{}: {} surface formats, {} present modes",
                self.name, self.format_count, self.present_mode_count
            );
            return None;
        }
        let families = find_queue_families(&self.families);
        if families.is_none() {
            debug!("{}: no graphics/present queue families", self.name);
        }
        families
    }
}

pub fn select_device(
    candidates: &[DeviceCandidate],
) -> Result<(usize, FamilyIndices), VkRenderError> {
    if candidates.is_empty() {
        return Err(VkRenderError::NoPhysicalDevices);
    }
    candidates
        .iter()
        .enumerate()
        .find_map(|(i, c)| c.evaluate().map(|f| (i, f)))
        .ok_or(VkRenderError::NoSuitableDevice {
            checked: candidates.len(),
        })
}

pub struct Gpu {
    pub phys: vk::PhysicalDevice,
    pub name: String,
    pub families: FamilyIndices,
}

unsafe fn describe(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Result<DeviceCandidate> {
    let props = instance.get_physical_device_properties(phys);
    let name = props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string());

    let extensions = instance
        .enumerate_device_extension_properties(phys)
        .vk("vkEnumerateDeviceExtensionProperties")?
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();

    DeviceCandidate::gather(name, extensions, || {
        let format_count = surface_loader
            .get_physical_device_surface_formats(phys, surface)
            .vk("vkGetPhysicalDeviceSurfaceFormatsKHR")?
            .len();
        let present_mode_count = surface_loader
            .get_physical_device_surface_present_modes(phys, surface)
            .vk("vkGetPhysicalDeviceSurfacePresentModesKHR")?
            .len();

        let mut families = Vec::new();
        for (i, q) in instance
            .get_physical_device_queue_family_properties(phys)
            .iter()
            .enumerate()
        {
            let present = surface_loader
                .get_physical_device_surface_support(phys, i as u32, surface)
                .vk("vkGetPhysicalDeviceSurfaceSupportKHR")?;
            families.push(QueueFamilySupport {
                graphics: q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present,
            });
        }
        Ok(SurfaceReport {
            format_count,
            present_mode_count,
            families,
        })
    })
}

pub unsafe fn pick_physical_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<Gpu> {
    let devices = instance
        .enumerate_physical_devices()
        .vk("vkEnumeratePhysicalDevices")?;

    let mut candidates = Vec::with_capacity(devices.len());
    for &phys in &devices {
        candidates.push(describe(instance, surface_loader, surface, phys)?);
    }

    let (index, families) = select_device(&candidates)?;
    let phys = devices[index];
    let props = instance.get_physical_device_properties(phys);
    let name = std::mem::take(&mut candidates[index].name);
    info!(
        "vk: using {} (api {}.{}.{}), graphics family {}, present family {}",
        name,
        vk::api_version_major(props.api_version),
        vk::api_version_minor(props.api_version),
        vk::api_version_patch(props.api_version),
        families.graphics,
        families.present
    );
    Ok(Gpu {
        phys,
        name,
        families,
    })
}

pub fn queue_create_infos<'a>(
    families: &FamilyIndices,
    priorities: &'a [f32],
) -> Vec<vk::DeviceQueueCreateInfo<'a>> {
    families
        .unique()
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(priorities)
        })
        .collect()
}

pub struct LogicalDevice {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl LogicalDevice {
    pub unsafe fn new(instance: &Instance, gpu: &Gpu) -> Result<Self> {
        let priorities = [1.0_f32];
        let queue_infos = queue_create_infos(&gpu.families, &priorities);
        let device_exts: Vec<_> = REQUIRED_DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();

        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };
        let device = instance
            .create_device(gpu.phys, &dinfo, None)
            .vk("vkCreateDevice")
            .with_context(|| format!("create_device on {}", gpu.name))?;

        let graphics_queue = device.get_device_queue(gpu.families.graphics, 0);
        let present_queue = device.get_device_queue(gpu.families.present, 0);
        Ok(LogicalDevice {
            device,
            graphics_queue,
            present_queue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(graphics: bool, present: bool) -> QueueFamilySupport {
        QueueFamilySupport { graphics, present }
    }

    fn capable(name: &str, families: Vec<QueueFamilySupport>) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            extensions: vec![swapchain::NAME.to_owned()],
            format_count: 2,
            present_mode_count: 1,
            families,
        }
    }

    #[test]
    fn combined_family_preferred_over_earlier_split() {
        let f = find_queue_families(&[
            family(true, false),
            family(false, true),
            family(true, true),
        ])
        .unwrap();
        assert_eq!(f, FamilyIndices::new(2, 2));
        assert_eq!(f.unique(), &[2]);
        assert!(f.is_shared());
    }

    #[test]
    fn split_families_keep_graphics_present_order() {
        let f = find_queue_families(&[family(false, true), family(true, false)]).unwrap();
        assert_eq!((f.graphics, f.present), (1, 0));
        assert_eq!(f.unique(), &[1, 0]);
        assert!(!f.is_shared());
    }

    #[test]
    fn no_present_family_is_rejected() {
        assert!(find_queue_families(&[family(true, false)]).is_none());
        assert!(find_queue_families(&[]).is_none());
    }

    #[test]
    fn first_qualifying_device_wins() {
        let mut no_ext = capable("software", vec![family(true, true)]);
        no_ext.extensions.clear();
        let mut no_modes = capable("headless", vec![family(true, true)]);
        no_modes.present_mode_count = 0;

        let candidates = vec![
            no_ext,
            no_modes,
            capable("discrete", vec![family(true, false), family(false, true)]),
            capable("integrated", vec![family(true, true)]),
        ];
        let (index, families) = select_device(&candidates).unwrap();
        assert_eq!(index, 2);
        assert_eq!(families, FamilyIndices::new(0, 1));
    }

    fn report(families: Vec<QueueFamilySupport>) -> SurfaceReport {
        SurfaceReport {
            format_count: 2,
            present_mode_count: 1,
            families,
        }
    }

    #[test]
    fn surface_is_not_queried_without_swapchain_extension() {
        let mut queried = false;
        let c = DeviceCandidate::gather("software".to_string(), Vec::new(), || {
            queried = true;
            Ok(report(vec![family(true, true)]))
        })
        .unwrap();
        assert!(!queried);
        assert!(c.evaluate().is_none());
    }

    #[test]
    fn surface_failure_on_rejected_device_is_ignored() {
        let c = DeviceCandidate::gather("compute-only".to_string(), Vec::new(), || {
            anyhow::bail!("vkGetPhysicalDeviceSurfaceFormatsKHR: ERROR_SURFACE_LOST_KHR")
        })
        .unwrap();
        assert_eq!(c.format_count, 0);

        let candidates = vec![c, capable("gpu", vec![family(true, true)])];
        assert_eq!(select_device(&candidates).unwrap().0, 1);
    }

    #[test]
    fn capable_device_reports_its_surface() {
        let c = DeviceCandidate::gather(
            "gpu".to_string(),
            vec![swapchain::NAME.to_owned()],
            || Ok(report(vec![family(false, true), family(true, false)])),
        )
        .unwrap();
        assert_eq!((c.format_count, c.present_mode_count), (2, 1));
        assert_eq!(c.evaluate(), Some(FamilyIndices::new(1, 0)));

        let failing = DeviceCandidate::gather(
            "gpu".to_string(),
            vec![swapchain::NAME.to_owned()],
            || anyhow::bail!("surface lost"),
        );
        assert!(failing.is_err());
    }

    #[test]
    fn no_formats_disqualifies() {
        let mut c = capable("gpu", vec![family(true, true)]);
        c.format_count = 0;
        assert!(c.evaluate().is_none());
    }

    #[test]
    fn empty_device_list_is_fatal() {
        assert!(matches!(
            select_device(&[]),
            Err(VkRenderError::NoPhysicalDevices)
        ));
    }

    #[test]
    fn nothing_qualifies() {
        let candidates = vec![capable("gpu", vec![family(true, false)])];
        assert!(matches!(
            select_device(&candidates),
            Err(VkRenderError::NoSuitableDevice { checked: 1 })
        ));
    }

    #[test]
    fn one_queue_per_unique_family() {
        let priorities = [1.0_f32];

        let shared = queue_create_infos(&FamilyIndices::new(0, 0), &priorities);
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].queue_family_index, 0);
        assert_eq!(shared[0].queue_count, 1);

        let split = queue_create_infos(&FamilyIndices::new(0, 3), &priorities);
        let indices: Vec<u32> = split.iter().map(|q| q.queue_family_index).collect();
        assert_eq!(indices, vec![0, 3]);
    }
}
