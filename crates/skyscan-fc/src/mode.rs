use std::fmt;
use std::str::FromStr;

/// Autopilot flight modes the ground station cares about. Anything else the
/// vehicle reports is carried verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlightMode {
    Guided,
    Loiter,
    Land,
    ReturnToLaunch,
    Brake,
    Other(String),
}

// ArduCopter custom_mode numbers.
const COPTER_MODES: &[(u32, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (5, "LOITER"),
    (6, "RTL"),
    (7, "CIRCLE"),
    (9, "LAND"),
    (11, "DRIFT"),
    (13, "SPORT"),
    (14, "FLIP"),
    (15, "AUTOTUNE"),
    (16, "POSHOLD"),
    (17, "BRAKE"),
    (18, "THROW"),
    (20, "GUIDED_NOGPS"),
    (21, "SMART_RTL"),
];

impl FlightMode {
    pub fn name(&self) -> &str {
        match self {
            FlightMode::Guided => "GUIDED",
            FlightMode::Loiter => "LOITER",
            FlightMode::Land => "LAND",
            FlightMode::ReturnToLaunch => "RTL",
            FlightMode::Brake => "BRAKE",
            FlightMode::Other(name) => name,
        }
    }

    /// Map the HEARTBEAT `custom_mode` of a copter to a mode.
    pub fn from_copter_custom_mode(custom_mode: u32) -> Self {
        COPTER_MODES
            .iter()
            .find(|(n, _)| *n == custom_mode)
            .map(|(_, name)| FlightMode::from_name(name))
            .unwrap_or_else(|| FlightMode::Other(format!("MODE_{}", custom_mode)))
    }

    /// ArduCopter `custom_mode` for this mode, if the autopilot knows it.
    pub fn copter_custom_mode(&self) -> Option<u32> {
        let name = self.name();
        COPTER_MODES.iter().find(|(_, n)| *n == name).map(|(num, _)| *num)
    }

    fn from_name(name: &str) -> Self {
        match name {
            "GUIDED" => FlightMode::Guided,
            "LOITER" => FlightMode::Loiter,
            "LAND" => FlightMode::Land,
            "RTL" => FlightMode::ReturnToLaunch,
            "BRAKE" => FlightMode::Brake,
            other => FlightMode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FlightMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        anyhow::ensure!(!name.is_empty(), "empty flight mode name");
        let name = match name.as_str() {
            "RETURN_TO_LAUNCH" | "RETURNTOLAUNCH" => "RTL".to_string(),
            _ => name,
        };
        Ok(FlightMode::from_name(&name))
    }
}

/// Satellite fix quality as used by every "safe hold" decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GpsFixQuality {
    Weak,
    Adequate,
}

impl GpsFixQuality {
    /// 3D fix (raw fix type 3) or better is adequate.
    pub fn from_fix_type(fix_type: u8) -> Self {
        if fix_type >= 3 {
            GpsFixQuality::Adequate
        } else {
            GpsFixQuality::Weak
        }
    }

    pub fn is_adequate(self) -> bool {
        self == GpsFixQuality::Adequate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_quality_threshold_is_3d_fix() {
        assert_eq!(GpsFixQuality::from_fix_type(0), GpsFixQuality::Weak);
        assert_eq!(GpsFixQuality::from_fix_type(2), GpsFixQuality::Weak);
        assert_eq!(GpsFixQuality::from_fix_type(3), GpsFixQuality::Adequate);
        assert_eq!(GpsFixQuality::from_fix_type(6), GpsFixQuality::Adequate);
    }

    #[test]
    fn copter_mode_numbers_roundtrip_for_known_modes() {
        for mode in [FlightMode::Guided, FlightMode::Loiter, FlightMode::Land, FlightMode::ReturnToLaunch, FlightMode::Brake] {
            let num = mode.copter_custom_mode().unwrap();
            assert_eq!(FlightMode::from_copter_custom_mode(num), mode);
        }
        assert_eq!(FlightMode::from_copter_custom_mode(0), FlightMode::Other("STABILIZE".into()));
        assert_eq!(FlightMode::from_copter_custom_mode(99), FlightMode::Other("MODE_99".into()));
    }

    #[test]
    fn parses_operator_mode_names() {
        assert_eq!("loiter".parse::<FlightMode>().unwrap(), FlightMode::Loiter);
        assert_eq!("RTL".parse::<FlightMode>().unwrap(), FlightMode::ReturnToLaunch);
        assert_eq!("poshold".parse::<FlightMode>().unwrap(), FlightMode::Other("POSHOLD".into()));
        assert!("  ".parse::<FlightMode>().is_err());
    }
}
