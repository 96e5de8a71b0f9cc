//! Which boards can do what.
//!
//! Session code consults this to decide whether a scenario applies to the
//! board under test at all; nothing in the protocol layer reads it.
use std::fmt;
use std::str::FromStr;

use super::{DeviceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// USB (UVC) streaming
    Wired,
    /// Wi-Fi streaming
    Wireless,
    /// LED current sensing
    MeasureCurrent,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Wired => "wired",
            Capability::Wireless => "wireless",
            Capability::MeasureCurrent => "measure_current",
        };
        f.write_str(name)
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "wired" => Ok(Capability::Wired),
            "wireless" => Ok(Capability::Wireless),
            "measure_current" => Ok(Capability::MeasureCurrent),
            other => Err(format!("Unknown capability {}", other)),
        }
    }
}

use Capability::*;

const BOARD_CAPABILITIES: &[(&str, &[Capability])] = &[
    ("esp_eye", &[Wired, Wireless]),
    ("esp32AIThinker", &[Wireless]),
    ("esp32Cam", &[Wireless]),
    ("esp32M5Stack", &[Wireless]),
    ("facefocusvr_eye_L", &[Wired, MeasureCurrent]),
    ("facefocusvr_eye_R", &[Wired, MeasureCurrent]),
    ("facefocusvr_face", &[Wired, MeasureCurrent]),
    ("project_babble", &[Wireless, Wired]),
    ("seed_studio", &[Wireless, Wired]),
    ("wrooms3", &[Wireless, Wired]),
    ("wrooms3QIO", &[Wireless, Wired]),
    ("wrover", &[Wireless, Wired]),
];

pub fn known_boards() -> impl Iterator<Item = &'static str> {
    BOARD_CAPABILITIES.iter().map(|(board, _)| *board)
}

pub fn capabilities(board: &str) -> Result<&'static [Capability]> {
    BOARD_CAPABILITIES
        .iter()
        .find(|(name, _)| *name == board)
        .map(|(_, caps)| *caps)
        .ok_or_else(|| DeviceError::UnknownBoard(board.to_string()))
}

/// True if `board` has every capability in `required`
pub fn has_capabilities(board: &str, required: &[Capability]) -> Result<bool> {
    let caps = capabilities(board)?;
    Ok(required.iter().all(|cap| caps.contains(cap)))
}

pub fn has_capability(board: &str, capability: Capability) -> Result<bool> {
    has_capabilities(board, &[capability])
}

pub fn lacks_capability(board: &str, capability: Capability) -> Result<bool> {
    has_capability(board, capability).map(|has| !has)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_board_capabilities() {
        assert!(has_capability("esp_eye", Wired).unwrap());
        assert!(lacks_capability("esp32Cam", Wired).unwrap());
        assert!(has_capabilities("wrover", &[Wired, Wireless]).unwrap());
        assert!(!has_capabilities("facefocusvr_face", &[Wired, Wireless]).unwrap());
        assert!(has_capability("facefocusvr_eye_L", MeasureCurrent).unwrap());
    }

    #[test]
    fn unknown_board_is_an_error() {
        assert!(matches!(capabilities("toaster"), Err(DeviceError::UnknownBoard(_))));
    }

    #[test]
    fn capability_names_round_trip() {
        for cap in [Wired, Wireless, MeasureCurrent] {
            assert_eq!(cap.to_string().parse::<Capability>().unwrap(), cap);
        }
        assert_eq!(known_boards().count(), 12);
    }
}
