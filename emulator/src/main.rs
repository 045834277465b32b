mod replay;

use std::env;
use std::io;
use std::process;

use replay::{TranscriptLogger, TranscriptProfile};
use ups_core::policy::{DEFAULT_POLICY, WatchdogPolicy};

struct Options {
    profile: TranscriptProfile,
    policy: WatchdogPolicy,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!(
            "Usage: ups-emulator [--profile <flicker|slow-recovery|outage|reboot|scenario>] \
             [--policy <key=value,...>]"
        );
        process::exit(2);
    });

    let mut transcript = TranscriptLogger::create(options.profile)?;
    let summary = replay::replay(options.profile, options.policy, &mut transcript)?;

    println!(
        "{}: {} launch(es), {} reboot(s), transcript at {}",
        options.profile.tag(),
        summary.launches,
        summary.reboots,
        options.profile.log_path()
    );
    for outcome in &summary.outcomes {
        println!("  session {outcome}");
    }
    Ok(())
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        profile: TranscriptProfile::Scenario,
        policy: DEFAULT_POLICY,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--profile=") {
            options.profile = TranscriptProfile::from_tag(value)?;
        } else if arg == "--profile" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --profile".to_string())?;
            options.profile = TranscriptProfile::from_tag(&value)?;
        } else if let Some(value) = arg.strip_prefix("--policy=") {
            options.policy = parse_policy(value)?;
        } else if arg == "--policy" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --policy".to_string())?;
            options.policy = parse_policy(&value)?;
        } else {
            options.profile = TranscriptProfile::from_tag(&arg)?;
        }
    }

    Ok(options)
}

fn parse_policy(input: &str) -> Result<WatchdogPolicy, String> {
    DEFAULT_POLICY
        .with_overrides(input)
        .map_err(|err| format!("Invalid policy `{input}`: {err}"))
}
