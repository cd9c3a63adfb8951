#!/usr/bin/env cargo-script
---
[dependencies]
anyhow = "1"
---

use anyhow::{Result, anyhow};
use std::{env, fs, path::Path, process::Command};

const LANGUAGES: [&str; 3] = ["kotlin", "swift", "python"];

fn main() -> Result<()> {
    let languages: Vec<String> = match env::args().nth(1) {
        Some(language) if LANGUAGES.contains(&language.as_str()) => vec![language],
        Some(other) => {
            return Err(anyhow!(
                "Unknown language '{other}', expected one of {LANGUAGES:?}"
            ));
        }
        None => LANGUAGES.iter().map(ToString::to_string).collect(),
    };

    println!("Building markform release library...");
    run_command("cargo", &["build", "--release"])?;

    let lib_path = match env::consts::OS {
        "macos" => "target/release/libmarkform.dylib",
        "linux" => "target/release/libmarkform.so",
        "windows" => "target/release/markform.dll",
        other => return Err(anyhow!("Unsupported platform: {other}")),
    };

    for language in &languages {
        let out_dir = Path::new("bindings").join(language);
        fs::create_dir_all(&out_dir)?;
        println!("Generating {language} bindings into {}", out_dir.display());
        run_command(
            "cargo",
            &[
                "run",
                "--bin",
                "uniffi-bindgen",
                "--",
                "generate",
                "--library",
                lib_path,
                "--language",
                language,
                "--out-dir",
                &out_dir.to_string_lossy(),
            ],
        )?;
    }

    println!("Bindings generated for {}", languages.join(", "));
    Ok(())
}

fn run_command(cmd: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(cmd).args(args).spawn()?.wait()?;
    if !status.success() {
        return Err(anyhow!("Command {} failed", cmd));
    }
    Ok(())
}
