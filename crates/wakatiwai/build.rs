// Build metadata shown by `wakatiwai version --extended`.
const EXPORTED: [(&str, &str); 2] = [
    ("TARGET", "WAKATIWAI_BUILD_TARGET"),
    ("PROFILE", "WAKATIWAI_BUILD_PROFILE"),
];

fn main() {
    for (cargo_var, exported) in EXPORTED {
        if let Ok(value) = std::env::var(cargo_var) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={cargo_var}");
    }
    // Release pipelines pass the commit in; `version` falls back to "unknown".
    println!("cargo:rerun-if-env-changed=GIT_HASH");
}
