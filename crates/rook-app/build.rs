use std::error::Error;
use std::path::{Path, PathBuf};
use std::{env, fs};

const STAGES: [(&str, shaderc::ShaderKind); 2] = [
    ("shader.vert", shaderc::ShaderKind::Vertex),
    ("shader.frag", shaderc::ShaderKind::Fragment),
];

// OUT_DIR is <target>/<profile>/build/<pkg>-<hash>/out
fn profile_dir(out: &Path) -> Result<PathBuf, Box<dyn Error>> {
    out.ancestors()
        .nth(3)
        .map(Path::to_path_buf)
        .ok_or_else(|| format!("unexpected OUT_DIR layout: {}", out.display()).into())
}

fn main() -> Result<(), Box<dyn Error>> {
    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let out = PathBuf::from(env::var("OUT_DIR")?);
    let src_dir = manifest.join("shaders");
    let dst_dir = profile_dir(&out)?.join("assets").join("shaders");
    fs::create_dir_all(&dst_dir)?;

    let comp = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (name, kind) in STAGES {
        let path = src_dir.join(name);
        println!("cargo:rerun-if-changed={}", path.display());

        let source = fs::read_to_string(&path)?;
        let spv = comp.compile_into_spirv(&source, kind, name, "main", Some(&opts))?;
        if spv.get_num_warnings() > 0 {
            println!("cargo:warning={}: {}", name, spv.get_warning_messages());
        }
        fs::write(dst_dir.join(format!("{name}.spv")), spv.as_binary_u8())?;
    }

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
