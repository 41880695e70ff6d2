use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    profile: &'static str,
    os: &'static str,
    arch: &'static str,
    features: Vec<&'static str>,
}

impl VersionInfo {
    fn current() -> Self {
        let mut features = vec!["cli"];
        if cfg!(feature = "server") {
            features.push("server");
        }
        if cfg!(feature = "async") {
            features.push("async");
        }
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            target: option_env!("AGENTLINK_BUILD_TARGET").unwrap_or("unknown"),
            profile: option_env!("AGENTLINK_BUILD_PROFILE").unwrap_or("unknown"),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            features,
        }
    }
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    let info = VersionInfo::current();
    if !args.extended {
        println!("{} {}", info.name, info.version);
        return Ok(SUCCESS);
    }

    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(SUCCESS);
    }

    println!("name: {}", info.name);
    println!("version: {}", info.version);
    println!("target: {}", info.target);
    println!("build_profile: {}", info.profile);
    println!("os: {}", info.os);
    println!("arch: {}", info.arch);
    println!("features: {}", info.features.join(","));
    Ok(SUCCESS)
}
