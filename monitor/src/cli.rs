use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ups_core::policy::{DEFAULT_POLICY, WatchdogPolicy};

use crate::error::MonitorError;
use crate::logging::Verbosity;

pub const DEFAULT_REBOOT_COMMAND: &str = "systemctl reboot";

#[derive(Debug, Parser)]
#[command(name = "ups-monitor", version, about = "UPS power flicker watchdog")]
pub struct Cli {
    /// Debug output, including every sample.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true, env = "UPS_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }

    /// Global flags forwarded to child sessions.
    pub fn forwarded_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if self.verbose {
            args.push("--verbose".into());
        }
        if self.quiet {
            args.push("--quiet".into());
        }
        if let Some(path) = &self.log_file {
            args.push("--log-file".into());
            args.push(path.into());
        }
        args
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the primary flicker detection loop.
    Watch(WatchArgs),
    /// Run a single escalation session and exit.
    Escalate(SessionArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// How escalation sessions are started.
    #[arg(long, value_enum, env = "UPS_MODE", default_value_t = LaunchMode::Process)]
    pub mode: LaunchMode,

    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LaunchMode {
    /// Child process running `ups-monitor escalate`.
    Process,
    /// Detached task inside this process.
    Task,
}

/// Arguments shared by the primary loop and escalation sessions.
#[derive(Clone, Debug, Args)]
pub struct SessionArgs {
    /// Policy overrides, e.g. `threshold=80,grace=5s,window=20s,repeats=3,period=2s`.
    #[arg(long, env = "UPS_POLICY")]
    pub policy: Option<String>,

    #[command(flatten)]
    pub sensor: SensorArgs,

    #[command(flatten)]
    pub reboot: RebootArgs,
}

impl SessionArgs {
    pub fn policy(&self) -> Result<WatchdogPolicy, MonitorError> {
        match &self.policy {
            Some(overrides) => DEFAULT_POLICY
                .with_overrides(overrides)
                .map_err(|err| MonitorError::Policy(err.to_string())),
            None => Ok(DEFAULT_POLICY),
        }
    }

    /// Sensor and reboot flags forwarded to a child session. The policy is
    /// appended per launch.
    pub fn forwarded_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(dir) = &self.sensor.hwmon {
            args.push("--hwmon".into());
            args.push(dir.into());
        }
        if let Some(script) = &self.sensor.script {
            let joined = script
                .iter()
                .map(f32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            args.push("--script".into());
            args.push(joined.into());
        }
        args.push("--reboot-command".into());
        args.push(self.reboot.reboot_command.clone().into());
        if self.reboot.dry_run {
            args.push("--dry-run".into());
        }
        args
    }
}

#[derive(Clone, Debug, Args)]
pub struct SensorArgs {
    /// hwmon device directory of the INA219; discovered under /sys/class/hwmon when omitted.
    #[arg(long, env = "UPS_HWMON", conflicts_with = "script")]
    pub hwmon: Option<PathBuf>,

    /// Comma separated bus voltages replayed instead of reading hardware.
    #[arg(long, env = "UPS_SCRIPT", value_delimiter = ',')]
    pub script: Option<Vec<f32>>,
}

#[derive(Clone, Debug, Args)]
pub struct RebootArgs {
    /// Command run when a session triggers.
    #[arg(long, env = "UPS_REBOOT_COMMAND", default_value = DEFAULT_REBOOT_COMMAND)]
    pub reboot_command: String,

    /// Log the reboot instead of running the command.
    #[arg(long, env = "UPS_DRY_RUN")]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn watch_defaults_to_process_mode_and_fixed_policy() {
        let cli = Cli::try_parse_from(["ups-monitor", "watch"]).unwrap();
        let Command::Watch(args) = cli.command else {
            panic!("expected watch subcommand");
        };

        assert_eq!(args.mode, LaunchMode::Process);
        assert_eq!(args.session.reboot.reboot_command, DEFAULT_REBOOT_COMMAND);
        assert!(!args.session.reboot.dry_run);
        assert_eq!(args.session.policy().unwrap(), DEFAULT_POLICY);
    }

    #[test]
    fn policy_overrides_are_applied() {
        let cli = Cli::try_parse_from([
            "ups-monitor",
            "escalate",
            "--policy",
            "window=30s,repeats=2",
        ])
        .unwrap();
        let Command::Escalate(args) = cli.command else {
            panic!("expected escalate subcommand");
        };

        let policy = args.policy().unwrap();
        assert_eq!(policy.window, Duration::from_secs(30));
        assert_eq!(policy.repeats, 2);
    }

    #[test]
    fn invalid_policy_is_reported() {
        let cli =
            Cli::try_parse_from(["ups-monitor", "escalate", "--policy", "period=0s"]).unwrap();
        let Command::Escalate(args) = cli.command else {
            panic!("expected escalate subcommand");
        };

        let err = args.policy().unwrap_err();
        assert!(err.to_string().contains("period"), "{err}");
    }

    #[test]
    fn hwmon_and_script_conflict() {
        let result = Cli::try_parse_from([
            "ups-monitor",
            "watch",
            "--hwmon",
            "/sys/class/hwmon/hwmon2",
            "--script",
            "12.6,10.0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn forwarded_args_round_trip_through_escalate() {
        let cli = Cli::try_parse_from([
            "ups-monitor",
            "--verbose",
            "watch",
            "--mode",
            "task",
            "--script",
            "12.6,10.5",
            "--dry-run",
        ])
        .unwrap();
        let Command::Watch(watch) = &cli.command else {
            panic!("expected watch subcommand");
        };
        assert_eq!(watch.mode, LaunchMode::Task);

        let mut argv: Vec<OsString> = vec!["ups-monitor".into()];
        argv.extend(cli.forwarded_args());
        argv.push("escalate".into());
        argv.extend(watch.session.forwarded_args());

        let child = Cli::try_parse_from(argv).unwrap();
        assert!(child.verbose);
        let Command::Escalate(args) = child.command else {
            panic!("expected escalate subcommand");
        };
        assert_eq!(args.sensor.script, Some(vec![12.6, 10.5]));
        assert!(args.reboot.dry_run);
    }

    #[test]
    fn verbose_and_quiet_together_resolve_to_verbose() {
        let cli = Cli::try_parse_from(["ups-monitor", "-v", "-q", "watch"]).unwrap();
        assert_eq!(cli.verbosity(), Verbosity::Verbose);

        let cli = Cli::try_parse_from(["ups-monitor", "watch", "--quiet"]).unwrap();
        assert_eq!(cli.verbosity(), Verbosity::Quiet);
    }
}
