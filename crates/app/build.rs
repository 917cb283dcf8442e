//! Compiles the GLSL shaders in `<workspace>/shaders` to the `.spv` files
//! the default config loads.
//!
//! The compiler is `$GLSLC`, else `$VULKAN_SDK/bin/glslc`, else `glslc` on
//! `PATH`. Without one the build continues with a warning and the renderer
//! reports the missing `.spv` at startup. `SKIP_SHADERS` disables the step.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADERS: [&str; 2] = ["shader.vert", "shader.frag"];

fn glslc() -> PathBuf {
    if let Ok(path) = env::var("GLSLC") {
        return PathBuf::from(path);
    }
    if let Ok(sdk) = env::var("VULKAN_SDK") {
        let exe = if cfg!(target_os = "windows") {
            "glslc.exe"
        } else {
            "glslc"
        };
        let candidate = Path::new(&sdk).join("bin").join(exe);
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from("glslc")
}

fn is_stale(source: &Path, output: &Path) -> bool {
    match (
        std::fs::metadata(source).and_then(|m| m.modified()),
        std::fs::metadata(output).and_then(|m| m.modified()),
    ) {
        (Ok(src), Ok(out)) => src > out,
        _ => true,
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed=GLSLC");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var_os("SKIP_SHADERS").is_some() {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let shader_dir = manifest_dir.join("../../shaders");
    let glslc = glslc();

    for name in SHADERS {
        let source = shader_dir.join(name);
        let output = shader_dir.join(format!("{name}.spv"));
        println!("cargo:rerun-if-changed={}", source.display());

        if !source.exists() || !is_stale(&source, &output) {
            continue;
        }

        match Command::new(&glslc).arg(&source).arg("-o").arg(&output).status() {
            Ok(status) if status.success() => {}
            Ok(status) => panic!("{} failed on {}: {}", glslc.display(), name, status),
            Err(e) => {
                println!(
                    "cargo:warning=shader {} not compiled ({} unavailable: {}); see README.md",
                    name,
                    glslc.display(),
                    e
                );
                return;
            }
        }
    }
}
