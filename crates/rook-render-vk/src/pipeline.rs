// SPDX-License-Identifier: CEPL-1.0
//! Render pass and the one fixed graphics pipeline.

use crate::error::{VkCall, VkRenderError};
use anyhow::{anyhow, Result};
use ash::util::read_spv;
use ash::vk;
use rook_render::{RenderSize, SquareViewport};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const VERTEX_SHADER: &str = "shader.vert.spv";
pub const FRAGMENT_SHADER: &str = "shader.frag.spv";

/// SPIR-V words, read once at startup and reused by every pipeline build.
pub struct ShaderSet {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderSet {
    pub fn load(dir: &Path) -> Result<Self, VkRenderError> {
        let vertex = read_words(dir.join(VERTEX_SHADER))?;
        let fragment = read_words(dir.join(FRAGMENT_SHADER))?;
        debug!(
            "shaders: {} + {} words from {}",
            vertex.len(),
            fragment.len(),
            dir.display()
        );
        Ok(ShaderSet { vertex, fragment })
    }
}

fn read_words(path: PathBuf) -> Result<Vec<u32>, VkRenderError> {
    let words = std::fs::read(&path).and_then(|bytes| read_spv(&mut Cursor::new(&bytes[..])));
    words.map_err(|source| VkRenderError::ShaderLoad { path, source })
}

pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    let square = SquareViewport::fit(RenderSize {
        width: extent.width,
        height: extent.height,
    });
    vk::Viewport {
        x: square.x,
        y: square.y,
        width: square.side,
        height: square.side,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

pub struct RenderPipeline {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl RenderPipeline {
    // Format and extent are baked in; rebuild whenever the swapchain is.
    pub unsafe fn create(
        device: &ash::Device,
        shaders: &ShaderSet,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let render_pass = create_render_pass(device, format)?;

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .vk("vkCreatePipelineLayout")?;

        let vs = create_module(device, &shaders.vertex)?;
        let fs = create_module(device, &shaders.fragment)?;
        let pipeline = create_pipeline(device, vs, fs, render_pass, layout, extent);
        device.destroy_shader_module(vs, None);
        device.destroy_shader_module(fs, None);

        Ok(RenderPipeline {
            render_pass,
            layout,
            pipeline: pipeline?,
        })
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
        device.destroy_render_pass(self.render_pass, None);
    }
}

unsafe fn create_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    Ok(device
        .create_shader_module(&info, None)
        .vk("vkCreateShaderModule")?)
}

unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    let color_att = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let att_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &att_ref,
        ..Default::default()
    };
    // the acquire semaphore is waited on at color output, so the layout
    // transition has to wait there too
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    };

    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_att,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    Ok(device
        .create_render_pass(&rp_info, None)
        .vk("vkCreateRenderPass")?)
}

unsafe fn create_pipeline(
    device: &ash::Device,
    vs: vk::ShaderModule,
    fs: vk::ShaderModule,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
) -> Result<vk::Pipeline> {
    let entry = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    // vertices live in the vertex shader
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };

    let viewport = viewport_for(extent);
    let scissor = scissor_for(extent);
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &viewport,
        scissor_count: 1,
        p_scissors: &scissor,
        ..Default::default()
    };

    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let dyn_states = [vk::DynamicState::LINE_WIDTH];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let pipelines = device
        .create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        )
        .map_err(|(_, result)| VkRenderError::Vulkan {
            call: "vkCreateGraphicsPipelines",
            result,
        })?;
    pipelines
        .first()
        .copied()
        .ok_or_else(|| anyhow!("vkCreateGraphicsPipelines returned no pipeline"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rook-shaders-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn spirv_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn loads_both_stages() {
        let dir = scratch_dir("ok");
        fs::write(dir.join(VERTEX_SHADER), spirv_bytes(&[0x0723_0203, 1, 2])).unwrap();
        fs::write(dir.join(FRAGMENT_SHADER), spirv_bytes(&[0x0723_0203, 9])).unwrap();

        let set = ShaderSet::load(&dir).unwrap();
        assert_eq!(set.vertex, vec![0x0723_0203, 1, 2]);
        assert_eq!(set.fragment.len(), 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_fragment_shader_names_the_file() {
        let dir = scratch_dir("missing");
        fs::write(dir.join(VERTEX_SHADER), spirv_bytes(&[0x0723_0203])).unwrap();

        match ShaderSet::load(&dir) {
            Err(VkRenderError::ShaderLoad { path, source }) => {
                assert_eq!(path, dir.join(FRAGMENT_SHADER));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("load should fail without a fragment shader"),
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn truncated_bytecode_is_rejected() {
        let dir = scratch_dir("truncated");
        fs::write(dir.join(VERTEX_SHADER), [0x03u8, 0x02, 0x23]).unwrap();
        fs::write(dir.join(FRAGMENT_SHADER), spirv_bytes(&[0x0723_0203])).unwrap();

        assert!(matches!(
            ShaderSet::load(&dir),
            Err(VkRenderError::ShaderLoad { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn viewport_is_centered_square() {
        let vp = viewport_for(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!((vp.x, vp.y, vp.width, vp.height), (100.0, 0.0, 600.0, 600.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
    }

    #[test]
    fn scissor_covers_extent() {
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let sc = scissor_for(extent);
        assert_eq!(sc.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(sc.extent, extent);
    }
}
