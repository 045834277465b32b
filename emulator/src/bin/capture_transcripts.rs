use std::io;

#[allow(dead_code)]
#[path = "../replay.rs"]
mod replay;

use replay::{TranscriptLogger, TranscriptProfile};
use ups_core::policy::DEFAULT_POLICY;

fn main() -> io::Result<()> {
    for profile in TranscriptProfile::ALL {
        let mut transcript = TranscriptLogger::create(profile)?;
        let summary = replay::replay(profile, DEFAULT_POLICY, &mut transcript)?;
        println!(
            "{:<14} launches={} reboots={} -> {}",
            profile.tag(),
            summary.launches,
            summary.reboots,
            profile.log_path()
        );
    }
    Ok(())
}
