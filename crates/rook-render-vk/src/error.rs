// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VkRenderError {
    #[error("no physical devices found")]
    NoPhysicalDevices,
    #[error("no suitable device among {checked} candidate(s)")]
    NoSuitableDevice { checked: usize },
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    #[error("cannot load shader {}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{call} failed: {result:?}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

/// Tags a raw `vk::Result` with the entry point that produced it.
pub(crate) trait VkCall<T> {
    fn vk(self, call: &'static str) -> Result<T, VkRenderError>;
}

impl<T> VkCall<T> for Result<T, vk::Result> {
    fn vk(self, call: &'static str) -> Result<T, VkRenderError> {
        self.map_err(|result| VkRenderError::Vulkan { call, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_error_names_the_call() {
        let failed: Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = failed.vk("vkQueueSubmit").unwrap_err();
        assert_eq!(err.to_string(), "vkQueueSubmit failed: ERROR_DEVICE_LOST");
    }

    #[test]
    fn shader_error_keeps_io_source() {
        let err = VkRenderError::ShaderLoad {
            path: PathBuf::from("assets/shaders/shader.vert.spv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("shader.vert.spv"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
