// Build script to compile the triangle's GLSL shaders to SPIR-V
//
// Output lands in assets/ so it is packaged into the APK next to config.toml.

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    compile_shader("shaders/tri.vert", "assets/shaders/tri-vert.spv");
    compile_shader("shaders/tri.frag", "assets/shaders/tri-frag.spv");
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    if let Some(dir) = output_path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }

    // glslc ships with the Vulkan SDK and the Android NDK
    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=compile manually: glslc {} -o {}", input, output);
        }
    }
}
