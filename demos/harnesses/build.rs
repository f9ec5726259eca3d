use std::env;
use std::path::PathBuf;
use std::process::Command;

const FUZZER_LIB: &str = "libclang_rt.fuzzer_no_main.a";
const FUZZER_LIB_ENV: &str = "FUZZER_NO_MAIN_LIB";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed={FUZZER_LIB_ENV}");

    let Some(lib) = find_fuzzer_lib() else {
        println!(
            "cargo:warning=could not find {FUZZER_LIB}; put clang on PATH or set {FUZZER_LIB_ENV}. \
             The harnesses will build but report that libFuzzer is unavailable."
        );
        return;
    };

    // The bridge resolves libFuzzer at runtime, so every symbol must be kept
    // and exported even though nothing references it at link time.
    println!("cargo:rustc-link-arg-bins=-Wl,--whole-archive");
    println!("cargo:rustc-link-arg-bins={}", lib.display());
    println!("cargo:rustc-link-arg-bins=-Wl,--no-whole-archive");
    println!("cargo:rustc-link-arg-bins=-Wl,--export-dynamic");
    println!("cargo:rustc-link-arg-bins=-lstdc++");
}

/// Asks clang where its fuzzer runtime lives, falling back to the environment.
fn find_fuzzer_lib() -> Option<PathBuf> {
    let from_clang = Command::new("clang")
        .arg(format!("--print-file-name={FUZZER_LIB}"))
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| PathBuf::from(String::from_utf8_lossy(&out.stdout).trim()))
        // clang echoes the bare name back when it has no such file.
        .filter(|path| path.is_absolute() && path.exists());

    from_clang.or_else(|| {
        env::var_os(FUZZER_LIB_ENV)
            .map(PathBuf::from)
            .filter(|path| path.exists())
    })
}
