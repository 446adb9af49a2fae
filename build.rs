use anyhow::{Result, anyhow, bail};
use chrono::TimeZone;
use std::env;
use std::process::Command;
use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<()> {
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("[0-9]*"))
        .build()?;

    let gitcl_res = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = gitcl_res {
        eprintln!("error occurred while generating git instructions: {e:?}");
        println!("cargo:rustc-env=VERGEN_GIT_DESCRIBE=unknown");
    }

    // honour SOURCE_DATE_EPOCH
    let now = match env::var("SOURCE_DATE_EPOCH") {
        Ok(val) => chrono::Utc
            .timestamp_opt(val.parse::<i64>()?, 0)
            .single()
            .ok_or_else(|| anyhow!("invalid SOURCE_DATE_EPOCH: {val}"))?,
        Err(_) => chrono::Utc::now(),
    };

    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let hevc_version = hevc_version_from_metadata().unwrap_or_else(|e| {
        eprintln!("could not resolve the hevc version: {e:?}");
        "unknown".to_string()
    });
    println!("cargo:rustc-env=HEVC_VERSION={hevc_version}");
    println!("cargo:rerun-if-changed=hevc/Cargo.toml");

    Ok(())
}

/// Version of the `hevc` workspace member.
fn hevc_version_from_metadata() -> Result<String> {
    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let output = Command::new(cargo)
        .args(["metadata", "--no-deps", "--format-version", "1"])
        .output()?;

    if !output.status.success() {
        bail!("cargo metadata failed");
    }

    let metadata: serde_json::Value = serde_json::from_slice(&output.stdout)?;

    metadata["packages"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|package| package["name"] == "hevc")
        .and_then(|package| package["version"].as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("hevc package not found in workspace metadata"))
}
