use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src/linker.ld");
    println!("cargo:rerun-if-env-changed=LOG");

    // Only the board image is linked with the kernel layout; host builds of
    // the library and its tests use the default linker script.
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    if arch == "riscv64" {
        let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
        let script = manifest.join("src").join("linker.ld");
        println!("cargo:rustc-link-arg-bins=-T{}", script.display());
    }
}
