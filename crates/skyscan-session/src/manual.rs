use std::fmt;

use skyscan_fc::ManualAxis;

const NEUTRAL_PWM: u16 = 1500;
const NUDGE_PWM: u16 = 100;

/// One stick nudge from the operator console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualCommand {
    ThrottleUp,
    ThrottleDown,
    RollRight,
    RollLeft,
    PitchForward,
    PitchBackward,
    YawClockwise,
    YawAnticlockwise,
}

impl ManualCommand {
    pub fn axis(self) -> ManualAxis {
        use ManualCommand::*;
        match self {
            ThrottleUp | ThrottleDown => ManualAxis::Throttle,
            RollRight | RollLeft => ManualAxis::Roll,
            PitchForward | PitchBackward => ManualAxis::Pitch,
            YawClockwise | YawAnticlockwise => ManualAxis::Yaw,
        }
    }

    /// Override value for this nudge. Pitch is reversed: stick forward
    /// reads low on the ArduPilot channel map.
    pub fn pwm(self) -> u16 {
        use ManualCommand::*;
        match self {
            ThrottleUp | RollRight | PitchBackward | YawClockwise => NEUTRAL_PWM + NUDGE_PWM,
            ThrottleDown | RollLeft | PitchForward | YawAnticlockwise => NEUTRAL_PWM - NUDGE_PWM,
        }
    }
}

impl fmt::Display for ManualCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ManualCommand::ThrottleUp => "throttle up",
            ManualCommand::ThrottleDown => "throttle down",
            ManualCommand::RollRight => "roll right",
            ManualCommand::RollLeft => "roll left",
            ManualCommand::PitchForward => "pitch forward",
            ManualCommand::PitchBackward => "pitch backward",
            ManualCommand::YawClockwise => "yaw clockwise",
            ManualCommand::YawAnticlockwise => "yaw anticlockwise",
        };
        f.write_str(s)
    }
}
