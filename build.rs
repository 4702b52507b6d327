use std::{env, fs, path::Path};

// Put config.json next to the built binary, where it is picked up by default.
fn main() {
    println!("cargo:rerun-if-changed=config.json");

    let src = Path::new("config.json");
    if !src.exists() {
        return;
    }

    // OUT_DIR = target/<profile>/build/<crate>/out
    let Ok(out_dir) = env::var("OUT_DIR") else {
        return;
    };
    let Some(exe_dir) = Path::new(&out_dir).ancestors().nth(3) else {
        return;
    };

    let dst = exe_dir.join("config.json");
    if let Err(e) = fs::copy(src, &dst) {
        println!("cargo:warning=Could not copy config.json to {}: {}", dst.display(), e);
    }
}
