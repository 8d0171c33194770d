//! Turns sampled control state into periodic input reports.

use shared::protocol::ClientMessage;
use std::time::{Duration, Instant};

/// Keep-alive cadence for input reports (~60Hz).
pub const INPUT_INTERVAL: Duration = Duration::from_millis(16);

/// Control state sampled by the platform layer each frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Controls {
    pub throttle: bool,
    pub brake: bool,
    /// Steering in [-1, 1].
    pub steer: f32,
}

/// Manages input report emission: a report goes out whenever the controls
/// change or the keep-alive interval elapses.
pub struct InputTracker {
    last_controls: Controls,
    /// Instant of the previous report; drives both the keep-alive check and
    /// the elapsed window carried by the next report.
    last_report: Instant,
    has_steered: bool,
}

impl InputTracker {
    pub fn new() -> Self {
        InputTracker {
            last_controls: Controls::default(),
            last_report: Instant::now(),
            has_steered: false,
        }
    }

    /// Produces the next `PlayerInput` report if one is due.
    ///
    /// `direction` is the local car's current heading; it is reported as
    /// absent until the player steers for the first time. `rings_crossed` is
    /// the running checkpoint tally.
    pub fn update(
        &mut self,
        controls: &Controls,
        direction: f32,
        rings_crossed: u32,
    ) -> Option<ClientMessage> {
        if controls.steer != 0.0 {
            self.has_steered = true;
        }

        let changed = *controls != self.last_controls;
        let keep_alive_due = self.last_report.elapsed() >= INPUT_INTERVAL;
        if !changed && !keep_alive_due {
            return None;
        }

        let elapsed_time = self.last_report.elapsed().as_secs_f32();
        self.last_controls = *controls;
        self.last_report = Instant::now();

        Some(ClientMessage::PlayerInput {
            direction_angle: if self.has_steered {
                Some(direction)
            } else {
                None
            },
            elapsed_time,
            rings_crossed,
        })
    }
}

impl Default for InputTracker {
    fn default() -> Self {
        Self::new()
    }
}
