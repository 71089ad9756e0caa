use crate::error::{NetError, NetResult};

/// What a blocking wait is currently doing, for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    Connecting,
    AwaitingReply,
    AwaitingLevel,
    Downloading { bytes: usize },
    Joining,
}

impl WaitStage {
    pub fn label(&self) -> String {
        match self {
            WaitStage::Connecting => "CONNECTING TO SERVER".to_string(),
            WaitStage::AwaitingReply => "WAITING FOR REPLY".to_string(),
            WaitStage::AwaitingLevel => "WAITING FOR LEVEL".to_string(),
            WaitStage::Downloading { bytes } => format!("downloaded {} bytes", bytes),
            WaitStage::Joining => "JOINING GAME".to_string(),
        }
    }
}

/// Result of one frame of a blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameControl {
    /// Keep waiting; the clock now reads this many ticks.
    Continue(u32),
    Cancel,
    Quit,
}

/// Drives the frame loop while a session blocks during setup.
///
/// Called once per wait iteration; implementations render progress and
/// report the current tick count or a user abort.
pub trait FrameDriver {
    fn frame(&mut self, stage: WaitStage) -> FrameControl;
}

impl<F> FrameDriver for F
where
    F: FnMut(WaitStage) -> FrameControl,
{
    fn frame(&mut self, stage: WaitStage) -> FrameControl {
        self(stage)
    }
}

pub(crate) fn next_tick<D: FrameDriver + ?Sized>(driver: &mut D, stage: WaitStage) -> NetResult<u32> {
    match driver.frame(stage) {
        FrameControl::Continue(ticks) => Ok(ticks),
        FrameControl::Cancel => Err(NetError::Cancelled),
        FrameControl::Quit => Err(NetError::Quit),
    }
}
