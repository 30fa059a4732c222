//! Gain scheduler: computes the proportional gain `Kp` fed into the
//! Mahony update each tick, from armed state, a disarmed-boot boost, a
//! post-disarm attitude-reset state machine, and a post-crash
//! level-recovery envelope.

pub const SPIN_RATE_LIMIT_DEG_S: f32 = 20.0;
pub const ATTITUDE_RESET_QUIET_TIME_US: u64 = 250_000;
pub const ATTITUDE_RESET_ACTIVE_TIME_US: u64 = 500_000;
pub const ATTITUDE_RESET_GYRO_LIMIT_DEG_S: f32 = 15.0;
pub const ATTITUDE_RESET_KP: f32 = 25.0;
pub const DISARMED_KP_MULTIPLIER: f32 = 10.0;

/// The post-disarm "attitude reset" mini state machine: after disarming,
/// wait for a quiet gyro period, then force a high gain for a short
/// window to reconverge quickly, then settle back to the normal
/// disarmed boost. Any gyro activity during or after the window
/// restarts the whole cycle, which is what lets a pilot right the craft
/// after a crash and have the reset re-trigger.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttitudeResetState {
    last_armed: bool,
    gyro_quiet_end_us: u64,
    attitude_reset_end_us: u64,
    reset_completed: bool,
}

impl AttitudeResetState {
    /// Advance the state machine for one tick. `gyro_deg_s` is the raw
    /// per-axis gyro average (not the rotated/corrected rate), matching
    /// the original's use of `gyroAverage` directly.
    pub fn step(&mut self, now_us: u64, armed: bool, use_acc: f32, gyro_deg_s: [f32; 3]) -> bool {
        let mut attitude_reset_active = false;

        if !armed {
            if self.last_armed {
                self.gyro_quiet_end_us = now_us + ATTITUDE_RESET_QUIET_TIME_US;
                self.attitude_reset_end_us = 0;
                self.reset_completed = false;
            }

            if self.attitude_reset_end_us > 0 || self.gyro_quiet_end_us > 0 || self.reset_completed {
                let gyro_active = gyro_deg_s.iter().any(|v| v.abs() > ATTITUDE_RESET_GYRO_LIMIT_DEG_S);
                if gyro_active || use_acc == 0.0 {
                    self.gyro_quiet_end_us = now_us + ATTITUDE_RESET_QUIET_TIME_US;
                    self.attitude_reset_end_us = 0;
                }
            }

            if self.attitude_reset_end_us > 0 {
                if now_us >= self.attitude_reset_end_us {
                    self.gyro_quiet_end_us = 0;
                    self.attitude_reset_end_us = 0;
                    self.reset_completed = true;
                } else {
                    attitude_reset_active = true;
                }
            } else if self.gyro_quiet_end_us > 0 && now_us >= self.gyro_quiet_end_us {
                self.attitude_reset_end_us = now_us + ATTITUDE_RESET_ACTIVE_TIME_US;
                self.gyro_quiet_end_us = 0;
            }
        }

        self.last_armed = armed;
        attitude_reset_active
    }
}

/// Post-crash Kp boost: while any gyro axis exceeds the configured
/// threshold, latch the crash time; for a configured window afterward,
/// scale Kp up with a strength that decays linearly across the second
/// half of the window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LevelRecoveryState {
    previous_crash_time_us: u64,
    active: bool,
    /// `[0, 1000]`.
    strength: u32,
}

impl LevelRecoveryState {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn strength(&self) -> u32 {
        self.strength
    }

    /// Advance the state machine for one tick.
    pub fn step(&mut self, now_us: u64, armed: bool, gyro_deg_s: [f32; 3], threshold_deg_s: f32, window_us: u64) {
        if gyro_deg_s.iter().any(|v| v.abs() > threshold_deg_s) {
            self.previous_crash_time_us = now_us;
        }

        let elapsed = now_us.saturating_sub(self.previous_crash_time_us);
        if elapsed < window_us {
            self.active = true;
            let mut strength = 2 * (window_us - elapsed) * 1000 / window_us;
            if strength > 1000 {
                strength = 1000;
            }
            self.strength = strength as u32;
        } else {
            self.active = false;
            self.strength = 0;
        }

        if !armed {
            self.active = false;
            self.strength = 0;
        }
    }
}

/// Compute the Kp to use for this tick.
///
/// Preserves the original's literal ordering: the attitude-reset branch
/// and the disarmed-boost branch are mutually exclusive, but level
/// recovery is applied *after* both, unconditionally overwriting
/// whatever was computed — including stomping an active attitude reset.
/// This is almost certainly not the intended interaction, but it is
/// preserved here rather than silently "fixed".
pub fn scheduled_kp(
    base_kp: f32,
    armed: bool,
    attitude_reset_active: bool,
    level_recovery: &LevelRecoveryState,
    level_recovery_coef: f32,
) -> f32 {
    let mut kp = if attitude_reset_active {
        ATTITUDE_RESET_KP
    } else if !armed {
        base_kp * DISARMED_KP_MULTIPLIER
    } else {
        base_kp
    };

    if level_recovery.is_active() {
        kp = base_kp * (1.0 + level_recovery_coef * level_recovery.strength() as f32 / 1000.0);
    }

    kp
}
