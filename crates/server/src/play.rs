use std::mem;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tilenet::{
    FrameControl, FrameDriver, HostEvent, LevelStatus, NetError, Session, WaitStage,
};

/// Millisecond tick source shared by the session and its waits.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn ticks(&self) -> u32 {
        self.start.elapsed().as_millis().min(u128::from(u32::MAX)) as u32
    }
}

/// Optional wall-clock limit on a run.
#[derive(Debug, Clone, Copy)]
pub struct RunLimit {
    end: Option<Instant>,
}

impl RunLimit {
    pub fn from_secs(secs: u64) -> Self {
        let end = (secs > 0).then(|| Instant::now() + Duration::from_secs(secs));
        Self { end }
    }

    pub fn expired(&self) -> bool {
        self.end.is_some_and(|end| Instant::now() >= end)
    }
}

/// Headless wait driver: logs each new stage and sleeps one frame.
pub struct SleepDriver {
    clock: Clock,
    frame: Duration,
    stage: Option<WaitStage>,
}

impl SleepDriver {
    pub fn new(clock: Clock, frame_ms: u32) -> Self {
        Self {
            clock,
            frame: Duration::from_millis(frame_ms.into()),
            stage: None,
        }
    }
}

impl FrameDriver for SleepDriver {
    fn frame(&mut self, stage: WaitStage) -> FrameControl {
        let changed = self
            .stage
            .is_none_or(|last| mem::discriminant(&last) != mem::discriminant(&stage));
        if changed {
            log::info!("{}", stage.label());
        }
        self.stage = Some(stage);

        thread::sleep(self.frame);
        FrameControl::Continue(self.clock.ticks())
    }
}

pub fn describe(event: &HostEvent) -> String {
    match event {
        HostEvent::ClientConnected { slot, addr } => {
            format!("Client {} connected from {}", slot, addr)
        }
        HostEvent::LevelSent { slot, bytes } => {
            format!("Client {} received the level ({} bytes)", slot, bytes)
        }
        HostEvent::PlayerJoined {
            slot,
            player,
            team,
            name,
        } => format!(
            "{} joined as player {} on team {} (client {})",
            name, player, team, slot
        ),
        HostEvent::PlayerLeft { slot, player } => {
            format!("Player {} left (client {})", player, slot)
        }
        HostEvent::ClientDisconnected { slot, reason } => {
            format!("Client {} {}", slot, reason.as_str())
        }
    }
}

/// What one frame of the run loop observed.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub events: Vec<HostEvent>,
    pub level: Option<LevelStatus>,
    pub finished: bool,
}

/// Steps the session once and collects what a display should show.
pub fn advance(session: &mut Session, clock: &Clock) -> Result<FrameReport> {
    let mut report = FrameReport::default();

    match session.step(clock.ticks()) {
        Ok(()) => {}
        Err(NetError::Disconnected) => {
            report.finished = true;
            return Ok(report);
        }
        Err(e) => return Err(e.into()),
    }

    match session {
        Session::Host(host) => report.events.extend(host.drain_events()),
        Session::Client(client) => {
            let status = client.set_level();
            match status {
                LevelStatus::Ready { .. } => report.level = Some(status),
                LevelStatus::Ended => {
                    report.level = Some(status);
                    report.finished = true;
                }
                LevelStatus::Waiting | LevelStatus::Downloading { .. } => {}
            }
        }
        Session::Local(_) => {}
    }

    Ok(report)
}

/// Fixed-rate loop without a terminal UI.
pub fn run_headless(session: &mut Session, clock: Clock, frame_ms: u32, limit: RunLimit) -> Result<()> {
    let frame = Duration::from_millis(frame_ms.into());

    while !limit.expired() {
        let report = advance(session, &clock)?;
        for event in &report.events {
            log::info!("{}", describe(event));
        }
        if let Some(LevelStatus::Ready { path, level_type }) = &report.level {
            log::info!("Next level ({:?}) ready at {}", level_type, path.display());
        }
        if report.finished {
            log::info!("Session finished");
            break;
        }
        thread::sleep(frame);
    }

    session.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use tilenet::{DisconnectReason, SessionConfig};

    use super::*;

    #[test]
    fn test_run_limit() {
        assert!(!RunLimit::from_secs(0).expired());
        assert!(!RunLimit::from_secs(60).expired());
    }

    #[test]
    fn test_describe_events() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000);
        assert_eq!(
            describe(&HostEvent::ClientConnected { slot: 2, addr }),
            "Client 2 connected from 127.0.0.1:4000"
        );
        assert_eq!(
            describe(&HostEvent::ClientDisconnected {
                slot: 1,
                reason: DisconnectReason::Kicked
            }),
            "Client 1 kicked"
        );
    }

    #[test]
    fn test_local_session_runs() {
        let mut session = Session::local(SessionConfig::default(), "LEVEL0.000");
        let clock = Clock::new();
        let report = advance(&mut session, &clock).unwrap();
        assert!(report.events.is_empty());
        assert!(!report.finished);
    }

    #[test]
    fn test_sleep_driver_reports_ticks() {
        let clock = Clock::new();
        let mut driver = SleepDriver::new(clock, 1);
        let FrameControl::Continue(first) = driver.frame(WaitStage::Connecting) else {
            panic!("driver should not abort");
        };
        let FrameControl::Continue(second) = driver.frame(WaitStage::Connecting) else {
            panic!("driver should not abort");
        };
        assert!(second >= first);
    }
}
