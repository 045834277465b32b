use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use ups_core::detector::FlickerEvent;
use ups_core::policy::WatchdogPolicy;
use ups_core::power::{BUS_VOLTS_SPAN, EMPTY_BUS_VOLTS, VoltageSensor};
use ups_core::session::{SessionOutcome, SessionStep};
use ups_core::supervisor::{
    Escalation, LaunchRequest, RebootActuator, SessionError, SessionGuard, SessionLauncher,
    SessionTick, TickError, TickReport, Watchdog,
};
use ups_core::telemetry::TelemetryRecorder;
use ups_core::time::MonotonicInstant;

const EVIDENCE_DIR: &str = "evidence";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    /// Two isolated flickers, each followed by a session that times out.
    Flicker,
    /// Supply parks on the threshold and recovers after the grace period.
    SlowRecovery,
    /// Long outage: the window times out, then power is restored.
    Outage,
    /// A flicker followed by three more; the session reboots.
    Reboot,
    /// Flicker, then the `100,90,70,60,85,70,90,70,95` trace inside the session.
    Scenario,
}

impl TranscriptProfile {
    pub const ALL: [TranscriptProfile; 5] = [
        TranscriptProfile::Flicker,
        TranscriptProfile::SlowRecovery,
        TranscriptProfile::Outage,
        TranscriptProfile::Reboot,
        TranscriptProfile::Scenario,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            TranscriptProfile::Flicker => "flicker",
            TranscriptProfile::SlowRecovery => "slow-recovery",
            TranscriptProfile::Outage => "outage",
            TranscriptProfile::Reboot => "reboot",
            TranscriptProfile::Scenario => "scenario",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Flicker => "UPS watchdog emulator flicker transcript",
            TranscriptProfile::SlowRecovery => "UPS watchdog emulator slow recovery transcript",
            TranscriptProfile::Outage => "UPS watchdog emulator outage transcript",
            TranscriptProfile::Reboot => "UPS watchdog emulator reboot transcript",
            TranscriptProfile::Scenario => "UPS watchdog emulator scenario transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|profile| profile.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| format!("Unknown transcript profile `{tag}`"))
    }

    pub fn log_path(self) -> String {
        format!("{EVIDENCE_DIR}/emulator-{}.log", self.tag())
    }

    /// Supply percentage at each sample period, starting at zero.
    pub fn supply(self) -> Vec<f32> {
        let mut trace = Vec::new();
        match self {
            TranscriptProfile::Flicker => {
                trace.extend([100.0, 60.0, 95.0]);
                trace.extend([100.0; 12]);
                trace.extend([60.0, 95.0]);
                trace.extend([100.0; 12]);
            }
            TranscriptProfile::SlowRecovery => {
                trace.extend([100.0, 60.0, 80.0, 80.0, 80.0, 95.0]);
                trace.extend([100.0; 4]);
            }
            TranscriptProfile::Outage => {
                trace.push(100.0);
                trace.extend([40.0; 6]);
                trace.extend([100.0; 4]);
            }
            TranscriptProfile::Reboot => {
                trace.extend([100.0, 60.0, 95.0, 70.0, 90.0, 70.0, 90.0, 70.0, 95.0]);
                trace.extend([100.0; 4]);
            }
            TranscriptProfile::Scenario => {
                trace.extend([100.0, 60.0, 90.0]);
                trace.extend([100.0, 90.0, 70.0, 60.0, 85.0, 70.0, 90.0, 70.0, 95.0]);
                trace.extend([100.0; 4]);
            }
        }
        trace
    }
}

/// Millisecond virtual clock advanced by the replay loop.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualInstant(u64);

impl VirtualInstant {
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn since_start(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Add<Duration> for VirtualInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(
            self.0
                .saturating_add(u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX)),
        )
    }
}

impl MonotonicInstant for VirtualInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Sensor reading the profile's supply at the current replay step. Every clone
/// sees the same step, so the primary loop and a session sample one supply.
#[derive(Clone)]
struct TraceSensor {
    supply: Rc<[f32]>,
    step: Rc<Cell<usize>>,
}

impl VoltageSensor for TraceSensor {
    type Error = Infallible;

    fn read_bus_voltage(&mut self) -> Result<f32, Self::Error> {
        let index = self.step.get().min(self.supply.len().saturating_sub(1));
        let percent = self.supply.get(index).copied().unwrap_or(100.0);
        Ok(EMPTY_BUS_VOLTS + BUS_VOLTS_SPAN * percent / 100.0)
    }
}

struct ReplayGuard(Rc<Cell<bool>>);

impl SessionGuard for ReplayGuard {
    type Error = Infallible;

    fn session_active(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.get())
    }
}

struct ReplayLauncher(Rc<RefCell<Vec<LaunchRequest<VirtualInstant>>>>);

impl SessionLauncher for ReplayLauncher {
    type Instant = VirtualInstant;
    type Error = Infallible;

    fn launch(&mut self, request: LaunchRequest<VirtualInstant>) -> Result<(), Self::Error> {
        self.0.borrow_mut().push(request);
        Ok(())
    }
}

struct ReplayActuator(Rc<Cell<usize>>);

impl RebootActuator for ReplayActuator {
    type Error = Infallible;

    fn reboot(&mut self) -> Result<(), Self::Error> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

/// What a replay did, for callers and tests.
#[derive(Debug, Default, PartialEq)]
pub struct ReplaySummary {
    pub events: Vec<FlickerEvent>,
    pub launches: usize,
    pub reboots: usize,
    pub outcomes: Vec<SessionOutcome>,
}

impl ReplaySummary {
    fn transitions(&self) -> impl Iterator<Item = &FlickerEvent> {
        self.events.iter().filter(|event| event.is_transition())
    }
}

/// Steps `profile` through the primary loop and any session it launches,
/// one sample period per supply entry, until the supply runs out or the
/// host is rebooted.
pub fn replay<W: Write>(
    profile: TranscriptProfile,
    policy: WatchdogPolicy,
    transcript: &mut TranscriptLogger<W>,
) -> io::Result<ReplaySummary> {
    let sensor = TraceSensor {
        supply: profile.supply().into(),
        step: Rc::new(Cell::new(0)),
    };
    let active = Rc::new(Cell::new(false));
    let launches = Rc::new(RefCell::new(Vec::new()));
    let reboots = Rc::new(Cell::new(0));

    let mut watchdog = Watchdog::new(
        sensor.clone(),
        ReplayGuard(Rc::clone(&active)),
        ReplayLauncher(Rc::clone(&launches)),
        policy,
    );
    let mut telemetry = TelemetryRecorder::<VirtualInstant>::new();
    let mut session: Option<Escalation<TraceSensor, ReplayActuator, VirtualInstant>> = None;
    let mut summary = ReplaySummary::default();
    let period = u64::try_from(policy.sample_period.as_millis()).unwrap_or(u64::MAX);

    transcript.write_header(profile, &policy)?;

    let mut elapsed = Duration::ZERO;
    for step in 0..sensor.supply.len() {
        sensor.step.set(step);
        let now = VirtualInstant::from_millis(period.saturating_mul(step as u64));
        elapsed = now.since_start();

        let report = match watchdog.tick(now, &mut telemetry) {
            Ok(report) => report,
            Err(TickError::Sensor(never) | TickError::Guard(never)) => match never {},
            Err(TickError::Launch { source, .. }) => match source {},
        };
        transcript.log_report(elapsed, &report)?;
        if let TickReport::Sampled { event, .. } = report {
            summary.events.push(event);
        }

        let pending = launches.borrow_mut().pop();
        if session.is_none()
            && let Some(request) = pending
        {
            summary.launches += 1;
            transcript.append_line(
                elapsed,
                TranscriptRole::Session,
                &format!(
                    "session started, deadline=+{}ms",
                    (request.requested_at + request.policy.window)
                        .since_start()
                        .as_millis()
                ),
            )?;
            session = Some(Escalation::start(
                sensor.clone(),
                ReplayActuator(Rc::clone(&reboots)),
                &request.policy,
                request.requested_at,
                &mut telemetry,
            ));
            active.set(true);
        }

        let Some(running) = session.as_mut() else {
            continue;
        };
        let tick = match running.tick(now, &mut telemetry) {
            Ok(tick) => tick,
            Err(SessionError::Sensor(never)) => match never {},
            Err(SessionError::Reboot { source, .. }) => match source {},
        };
        transcript.log_session(elapsed, &tick)?;

        if let Some(outcome) = running.outcome() {
            summary.outcomes.push(outcome);
            session = None;
            active.set(false);

            if outcome.is_reboot() {
                transcript.append_line(elapsed, TranscriptRole::Emulator, "host reboot requested")?;
                break;
            }
        }
    }

    summary.reboots = reboots.get();
    transcript.append_line(
        elapsed,
        TranscriptRole::Emulator,
        &format!(
            "summary: transitions={} launches={} reboots={}",
            summary.transitions().count(),
            summary.launches,
            summary.reboots
        ),
    )?;
    Ok(summary)
}

#[derive(Clone, Copy)]
pub enum TranscriptRole {
    Primary,
    Session,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Primary => "WATCH>",
            TranscriptRole::Session => "SESS >",
            TranscriptRole::Emulator => "EMU  <",
        }
    }
}

pub struct TranscriptLogger<W: Write> {
    writer: W,
}

impl TranscriptLogger<BufWriter<std::fs::File>> {
    /// Truncates and opens the evidence log for `profile`.
    pub fn create(profile: TranscriptProfile) -> io::Result<Self> {
        let log_path = profile.log_path();
        let path = Path::new(&log_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TranscriptLogger<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_header(
        &mut self,
        profile: TranscriptProfile,
        policy: &WatchdogPolicy,
    ) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(self.writer, "# Timestamps are virtual milliseconds since replay start")?;
        writeln!(self.writer, "# Policy: {policy}")?;
        writeln!(self.writer)
    }

    pub fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }

    fn log_report(&mut self, elapsed: Duration, report: &TickReport) -> io::Result<()> {
        let line = match report {
            TickReport::SessionActive => "session active; skipping tick".to_string(),
            TickReport::Sampled {
                sample,
                event,
                launched,
            } => {
                let mut line = format!("level {} ({:.2} V)", sample.level, sample.bus_volts);
                if let Some(note) = describe_event(event) {
                    line.push(' ');
                    line.push_str(&note);
                }
                if *launched {
                    line.push_str(", session launched");
                }
                line
            }
        };
        self.append_line(elapsed, TranscriptRole::Primary, &line)
    }

    fn log_session(&mut self, elapsed: Duration, tick: &SessionTick) -> io::Result<()> {
        let line = match tick {
            SessionTick::Sampled { sample, step } => {
                let note = match step {
                    SessionStep::Holding | SessionStep::Finished(_) => String::new(),
                    SessionStep::Dropped => " dropped".to_string(),
                    SessionStep::Counted { transitions } => format!(" counted={transitions}"),
                    SessionStep::Triggered { transitions, .. } => {
                        format!(" counted={transitions} REBOOT")
                    }
                };
                format!("level {}{note}", sample.level)
            }
            SessionTick::Finished(outcome) => format!("finished: {outcome}"),
        };
        self.append_line(elapsed, TranscriptRole::Session, &line)
    }
}

fn describe_event(event: &FlickerEvent) -> Option<String> {
    match event {
        FlickerEvent::Steady => None,
        FlickerEvent::PowerDropped => Some("dropped, recovery window open".to_string()),
        FlickerEvent::Flicker { recovered_after } => {
            Some(format!("flicker, recovered after {}ms", recovered_after.as_millis()))
        }
        FlickerEvent::SlowRecovery { recovered_after } => Some(format!(
            "slow recovery after {}ms, not escalating",
            recovered_after.as_millis()
        )),
        FlickerEvent::RecoveryTimedOut { waited } => Some(format!(
            "still low after {}ms, window closed",
            waited.as_millis()
        )),
        FlickerEvent::PowerRestored => Some("restored".to_string()),
    }
}
