// Integration tests: verify that generated C++ compiles against the runtime
// header, and that a generated unit runs.
//
// Complements the unit tests in codegen.rs which verify structural properties
// of generated C++ strings without invoking a compiler.
// Skipped automatically if no C++ compiler is found.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn ugg_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ugg"))
}

fn find_cxx_compiler() -> Option<String> {
    for compiler in &["c++", "g++", "clang++"] {
        if Command::new(compiler)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
        {
            return Some(compiler.to_string());
        }
    }
    None
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Unique counter for temp directory names (avoids collisions in parallel tests).
static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Run ugg on a bundled unit file into a fresh directory.
fn generate(unit_file: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let out = std::env::temp_dir().join(format!("ugg_cxx_{}_{}", std::process::id(), n));
    let _ = std::fs::remove_dir_all(&out);

    let src = project_root().join("units").join(unit_file);
    let gen = Command::new(ugg_binary())
        .arg(&src)
        .arg("-o")
        .arg(&out)
        .output()
        .expect("failed to run ugg");
    assert!(
        gen.status.success(),
        "ugg failed for {}:\n{}",
        unit_file,
        String::from_utf8_lossy(&gen.stderr)
    );
    out
}

fn runtime_include() -> PathBuf {
    project_root().join("runtime")
}

/// Generate C++ for a unit file and syntax-check the implementation.
fn assert_unit_file_compiles(unit_file: &str, stem: &str) {
    let cxx = match find_cxx_compiler() {
        Some(c) => c,
        None => {
            eprintln!("SKIP: no C++ compiler found");
            return;
        }
    };
    let out = generate(unit_file);
    let cpp = out.join(format!("{stem}.cpp"));
    assert!(cpp.exists(), "missing {}", cpp.display());

    let check = Command::new(&cxx)
        .arg("-std=c++17")
        .arg("-fsyntax-only")
        .arg("-Wall")
        .arg("-I")
        .arg(runtime_include())
        .arg("-I")
        .arg(&out)
        .arg(&cpp)
        .output()
        .expect("failed to run C++ compiler");
    assert!(
        check.status.success(),
        "C++ syntax check failed for {}:\n{}\n--- source ---\n{}",
        unit_file,
        String::from_utf8_lossy(&check.stderr),
        std::fs::read_to_string(&cpp).unwrap_or_default()
    );
}

// ── Bundled units ───────────────────────────────────────────────────────────

#[test]
fn osci_compiles() {
    assert_unit_file_compiles("osci.ugg", "osci");
}

#[test]
fn decay_compiles() {
    assert_unit_file_compiles("decay.ugg", "decay");
}

#[test]
fn mult_compiles() {
    assert_unit_file_compiles("mult.ugg", "mult");
}

#[test]
fn add_compiles() {
    assert_unit_file_compiles("add.ugg", "add");
}

#[test]
fn smooth_compiles() {
    assert_unit_file_compiles("smooth.ugg", "smooth");
}

// ── Runtime behaviour ───────────────────────────────────────────────────────

/// Decay starts at `amp` and falls by `amp / (time * AR)` per sample.
#[test]
fn decay_envelope_falls_within_a_block() {
    let cxx = match find_cxx_compiler() {
        Some(c) => c,
        None => {
            eprintln!("SKIP: no C++ compiler found");
            return;
        }
    };
    let out = generate("decay.ugg");
    let driver = out.join("main.cpp");
    std::fs::write(
        &driver,
        concat!(
            "#include <cstdio>\n",
            "#include \"decay.h\"\n",
            "int main() {\n",
            "    Ugen *u = Decay_cc_a_create(1.0f, 0.001f);\n",
            "    u->run(1);\n",
            "    sample *o = u->get_outs();\n",
            "    std::printf(\"%f %f\\n\", o[0], o[BL - 1]);\n",
            "    delete u;\n",
            "    return 0;\n",
            "}\n",
        ),
    )
    .unwrap();

    let exe = out.join("decay_test");
    let build = Command::new(&cxx)
        .arg("-std=c++17")
        .arg("-I")
        .arg(runtime_include())
        .arg("-I")
        .arg(&out)
        .arg(&driver)
        .arg(out.join("decay.cpp"))
        .arg("-o")
        .arg(&exe)
        .output()
        .expect("failed to run C++ compiler");
    assert!(
        build.status.success(),
        "build failed:\n{}",
        String::from_utf8_lossy(&build.stderr)
    );

    let run = Command::new(&exe).output().expect("failed to run decay_test");
    assert!(run.status.success());
    let stdout = String::from_utf8_lossy(&run.stdout);
    let values: Vec<f64> = stdout
        .split_whitespace()
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(values.len(), 2, "{stdout}");
    assert!((values[0] - 1.0).abs() < 1e-6, "{stdout}");
    // 31 steps of 1 / 44.1.
    assert!((values[1] - (1.0 - 31.0 / 44.1)).abs() < 1e-3, "{stdout}");
}
