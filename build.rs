use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=IQTREE_LIB_DIR");

    // Without the engine the crate builds its marshalling layer only.
    if env::var_os("CARGO_FEATURE_IQTREE").is_none() {
        return;
    }

    if let Some(dir) = env::var_os("IQTREE_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    }
    println!("cargo:rustc-link-lib=iqtree2");
    println!("cargo:rustc-link-lib=z");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    match target_os.as_str() {
        "macos" => {
            println!("cargo:rustc-link-lib=c++");
            println!("cargo:rustc-link-lib=omp");
        }
        "windows" => {}
        _ => {
            println!("cargo:rustc-link-lib=stdc++");
            println!("cargo:rustc-link-lib=gomp");
        }
    }
}
