use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Create config template if it doesn't exist
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../config.template.toml");

    let template = r#"# vcompress configuration template
# Copy this file to 'config.toml' and adjust the values

# Directory compressed files are written to
# cache_dir = "/tmp/vcompress"

# low, medium or high
default_quality = "medium"

# Codec poll timeout in microseconds
poll_timeout_us = 10000
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}
