use agentlink_server::profiles::load_config;
use agentlink_server::{resolve_name, Profile, ProfileDetails};

use crate::cmd::{ProfileCheckArgs, ProfileCommand};
use crate::exit::{profile_error, CliResult, SUCCESS};
use crate::output::{print_profile, OutputFormat};

pub fn run(command: ProfileCommand, format: OutputFormat) -> CliResult<i32> {
    match command {
        ProfileCommand::Check(args) => check(args, format),
    }
}

fn check(args: ProfileCheckArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args.file).map_err(|err| profile_error("profile check failed", err))?;
    let profile = Profile {
        name: resolve_name(&args.name).to_string(),
        config,
        source: Some(args.file),
    };
    print_profile(&ProfileDetails::from(&profile), format);
    Ok(SUCCESS)
}
