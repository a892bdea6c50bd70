//! Build script for exifgate.
//!
//! This script handles:
//! 1. Locating a Windows exiftool executable (if embedded-worker feature is enabled)
//! 2. Copying the executable to OUT_DIR for embedding

fn main() {
    // Only stage the worker if embedded-worker feature is enabled
    #[cfg(feature = "embedded-worker")]
    stage_embedded_worker();

    println!("cargo:rerun-if-changed=resources/");
    println!("cargo:rerun-if-env-changed=EXIFGATE_EMBED_EXIFTOOL");
    println!("cargo:rerun-if-changed=build.rs");
}

#[cfg(feature = "embedded-worker")]
fn stage_embedded_worker() {
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let manifest_dir =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    let staged = out_dir.join("exiftool.exe");

    let mut candidates = Vec::new();
    if let Ok(path) = env::var("EXIFGATE_EMBED_EXIFTOOL") {
        candidates.push(PathBuf::from(path));
    }
    candidates.push(manifest_dir.join("resources").join("exiftool.exe"));
    candidates.push(manifest_dir.join("exiftool.exe"));

    for path in &candidates {
        if path.exists() {
            fs::copy(path, &staged).expect("Failed to copy exiftool.exe for embedding");
            println!("cargo:warning=Embedding exiftool from {:?}", path);
            return;
        }
    }

    panic!(
        "Cannot embed exiftool: no executable found.\n\
         Place exiftool.exe in resources/ or set EXIFGATE_EMBED_EXIFTOOL to its path."
    );
}
