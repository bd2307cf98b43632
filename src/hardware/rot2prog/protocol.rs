//! ROT2Prog binary packet codec
//!
//! Protocol: fixed-length binary frames, 9600 baud 8N1, strictly request/response.
//!
//! Command packet (13 bytes, host → controller):
//!
//! ```text
//! [0x57, H1, H2, H3, H4, RH, V1, V2, V3, V4, RV, CMD, 0x20]
//! ```
//!
//! `H1..H4` / `V1..V4` are ASCII digits of `round(resolution * (angle + 360))`,
//! `RH`/`RV` carry the resolution in pulses per degree.
//!
//! Response packet (12 bytes, controller → host):
//!
//! ```text
//! [0x57, A1, A2, A3, A4, PH, E1, E2, E3, E4, PV, 0x20]
//! ```
//!
//! `A1..A4` / `E1..E4` are raw digit values (not ASCII) of the angle plus 360,
//! with the last digit in tenths of a degree.
//!
//! Nothing in this module performs I/O.

use crate::error::{RotorError, RotorResult};
use std::fmt;
use std::str::FromStr;

/// Length of every command packet.
pub const COMMAND_LEN: usize = 13;
/// Length of every response packet.
pub const RESPONSE_LEN: usize = 12;

const START: u8 = 0x57;
const END: u8 = 0x20;
const ASCII_ZERO: u8 = 0x30;

const CMD_STOP: u8 = 0x0F;
const CMD_STATUS: u8 = 0x1F;
const CMD_SET: u8 = 0x2F;
const CMD_JOG: u8 = 0x14;
const CMD_MOTOR_POWER: u8 = 0xF7;
const CMD_CLEAR_SETTINGS: u8 = 0xF8;

// =============================================================================
// Resolution
// =============================================================================

/// Encoder resolution reported by the controller, in pulses per degree.
///
/// The controller only ever reports 1, 2, 4 or 10, identically on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution(u8);

impl Resolution {
    /// Accepted pulses-per-degree values.
    pub const VALID: [u8; 4] = [1, 2, 4, 10];

    /// Pulses per degree.
    pub fn pulses_per_degree(self) -> u8 {
        self.0
    }
}

impl Default for Resolution {
    /// Assumed until the first successful status exchange.
    fn default() -> Self {
        Resolution(1)
    }
}

impl TryFrom<u8> for Resolution {
    type Error = RotorError;

    fn try_from(value: u8) -> RotorResult<Self> {
        if Self::VALID.contains(&value) {
            Ok(Resolution(value))
        } else {
            Err(RotorError::Packet(format!(
                "Invalid controller resolution {value}"
            )))
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pulses/deg", self.0)
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Manual jog direction. Diagonals drive both motors at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JogDirection {
    /// Azimuth motor counter-clockwise.
    Left,
    /// Azimuth motor clockwise.
    Right,
    /// Elevation motor up.
    Up,
    /// Elevation motor down.
    Down,
    /// Left and up.
    LeftUp,
    /// Right and up.
    RightUp,
    /// Left and down.
    LeftDown,
    /// Right and down.
    RightDown,
}

impl JogDirection {
    /// All directions, in protocol-table order.
    pub const ALL: [JogDirection; 8] = [
        JogDirection::Left,
        JogDirection::Right,
        JogDirection::Up,
        JogDirection::Down,
        JogDirection::LeftUp,
        JogDirection::RightUp,
        JogDirection::LeftDown,
        JogDirection::RightDown,
    ];

    /// Direction bit pattern placed in the first azimuth byte.
    pub fn code(self) -> u8 {
        match self {
            JogDirection::Left => 0x01,
            JogDirection::Right => 0x02,
            JogDirection::Up => 0x04,
            JogDirection::Down => 0x08,
            JogDirection::LeftUp => 0x05,
            JogDirection::RightUp => 0x06,
            JogDirection::LeftDown => 0x0A,
            JogDirection::RightDown => 0x09,
        }
    }
}

impl FromStr for JogDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', '+'], "-").as_str() {
            "left" => Ok(JogDirection::Left),
            "right" => Ok(JogDirection::Right),
            "up" => Ok(JogDirection::Up),
            "down" => Ok(JogDirection::Down),
            "left-up" => Ok(JogDirection::LeftUp),
            "right-up" => Ok(JogDirection::RightUp),
            "left-down" => Ok(JogDirection::LeftDown),
            "right-down" => Ok(JogDirection::RightDown),
            other => Err(format!(
                "Unknown jog direction '{other}'. Expected left, right, up, down, \
                 left-up, right-up, left-down or right-down"
            )),
        }
    }
}

/// A controller operation, prior to encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Stop in place; answered with the current position.
    Stop,
    /// Query position; answered with the current position.
    Status,
    /// Move to an absolute position. No response.
    Set {
        /// Target azimuth in degrees.
        azimuth: f64,
        /// Target elevation in degrees.
        elevation: f64,
    },
    /// Start jogging; answered with a status-shaped packet.
    Jog(JogDirection),
    /// Stop jogging; answered with a status-shaped packet.
    JogStop,
    /// Motor power in percent, already clamped to 0..=100. No response.
    MotorPower {
        /// Azimuth motor power.
        motor1: u8,
        /// Elevation motor power.
        motor2: u8,
    },
    /// Reset controller settings. No response.
    ClearSettings,
}

impl Command {
    /// Operation byte placed at position 11.
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Stop => CMD_STOP,
            Command::Status => CMD_STATUS,
            Command::Set { .. } => CMD_SET,
            Command::Jog(_) | Command::JogStop => CMD_JOG,
            Command::MotorPower { .. } => CMD_MOTOR_POWER,
            Command::ClearSettings => CMD_CLEAR_SETTINGS,
        }
    }

    /// Whether the controller answers this command with a response packet.
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            Command::Stop | Command::Status | Command::Jog(_) | Command::JogStop
        )
    }

    /// Build the 13-byte packet for this command.
    ///
    /// `resolution` is only written for commands that carry it (set and jog).
    ///
    /// # Errors
    /// `Unencodable` if a set target scales outside `0..=9999`.
    pub fn encode(&self, resolution: Resolution) -> RotorResult<CommandPacket> {
        let mut bytes = [0u8; COMMAND_LEN];
        bytes[0] = START;
        bytes[11] = self.opcode();
        bytes[12] = END;

        let ppd = resolution.pulses_per_degree();
        match *self {
            Command::Stop | Command::Status | Command::ClearSettings => {}
            Command::Set { azimuth, elevation } => {
                bytes[1..5].copy_from_slice(&ascii_digits(scale(azimuth, ppd)?));
                bytes[5] = ppd;
                bytes[6..10].copy_from_slice(&ascii_digits(scale(elevation, ppd)?));
                bytes[10] = ppd;
            }
            Command::Jog(direction) => {
                bytes[1] = direction.code();
                bytes[5] = ppd;
                bytes[10] = ppd;
            }
            Command::JogStop => {
                bytes[5] = ppd;
                bytes[10] = ppd;
            }
            Command::MotorPower { motor1, motor2 } => {
                bytes[5] = motor1.min(100);
                bytes[10] = motor2.min(100);
            }
        }

        Ok(CommandPacket(bytes))
    }
}

/// `round(ppd * (angle + 360))`, checked to fit four decimal digits.
fn scale(angle: f64, ppd: u8) -> RotorResult<u16> {
    // `NAN as i64` is 0, which would encode as a valid -360°
    if !angle.is_finite() {
        return Err(RotorError::NonFiniteAngle { value: angle });
    }
    let scaled = (f64::from(ppd) * (angle + 360.0)).round() as i64;
    if (0..=9999).contains(&scaled) {
        Ok(scaled as u16)
    } else {
        Err(RotorError::Unencodable { value: scaled })
    }
}

fn ascii_digits(value: u16) -> [u8; 4] {
    [
        ASCII_ZERO + (value / 1000 % 10) as u8,
        ASCII_ZERO + (value / 100 % 10) as u8,
        ASCII_ZERO + (value / 10 % 10) as u8,
        ASCII_ZERO + (value % 10) as u8,
    ]
}

fn parse_ascii_digits(digits: &[u8]) -> Option<u16> {
    digits.iter().try_fold(0u16, |acc, &b| {
        b.checked_sub(ASCII_ZERO)
            .filter(|d| *d <= 9)
            .map(|d| acc * 10 + u16::from(d))
    })
}

/// An encoded, immutable command packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket([u8; COMMAND_LEN]);

impl CommandPacket {
    /// Raw wire bytes.
    pub fn as_bytes(&self) -> &[u8; COMMAND_LEN] {
        &self.0
    }

    /// Operation byte.
    pub fn opcode(&self) -> u8 {
        self.0[11]
    }

    /// Scaled H and V values of a set packet, as written on the wire.
    pub fn wire_position(&self) -> Option<(u16, u16)> {
        if self.opcode() != CMD_SET {
            return None;
        }
        Some((
            parse_ascii_digits(&self.0[1..5])?,
            parse_ascii_digits(&self.0[6..10])?,
        ))
    }

    /// Target azimuth/elevation of a set packet, reversing the scaling.
    pub fn target(&self) -> Option<(f64, f64)> {
        let (h, v) = self.wire_position()?;
        let ppd = f64::from(self.0[5]);
        if ppd == 0.0 {
            return None;
        }
        Some((f64::from(h) / ppd - 360.0, f64::from(v) / ppd - 360.0))
    }
}

impl fmt::Display for CommandPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x?}", self.0)
    }
}

// =============================================================================
// Responses
// =============================================================================

/// A validated response packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponsePacket {
    /// Azimuth in degrees, rounded to 0.1°.
    pub azimuth: f64,
    /// Elevation in degrees, rounded to 0.1°.
    pub elevation: f64,
    /// Resolution reported in PH/PV.
    pub resolution: Resolution,
}

/// Decode a response read from the controller.
///
/// No side effects: applying the result to the rotor state is up to the caller.
///
/// # Errors
/// - `ReadTimeout` if `bytes` is empty (nothing arrived before the deadline)
/// - `Packet` if the length is not 12, or PH/PV disagree or are not a valid resolution
pub fn decode(bytes: &[u8]) -> RotorResult<ResponsePacket> {
    if bytes.is_empty() {
        return Err(RotorError::ReadTimeout);
    }
    if bytes.len() != RESPONSE_LEN {
        return Err(RotorError::Packet(format!(
            "Incomplete response packet: expected {} bytes, got {} ({:02x?})",
            RESPONSE_LEN,
            bytes.len(),
            bytes
        )));
    }

    let ph = bytes[5];
    let pv = bytes[10];
    if ph != pv || !Resolution::VALID.contains(&ph) {
        return Err(RotorError::Packet(format!(
            "Invalid controller resolution received (PH = {ph}, PV = {pv})"
        )));
    }

    Ok(ResponsePacket {
        azimuth: decode_angle(&bytes[1..5]),
        elevation: decode_angle(&bytes[6..10]),
        resolution: Resolution(ph),
    })
}

fn decode_angle(digits: &[u8]) -> f64 {
    let raw = f64::from(digits[0]) * 100.0
        + f64::from(digits[1]) * 10.0
        + f64::from(digits[2])
        + f64::from(digits[3]) / 10.0
        - 360.0;
    (raw * 10.0).round() / 10.0
}

/// Build the response the controller would send for a given position.
///
/// Used by simulated devices and tests; the host never sends these.
pub fn response_bytes(azimuth: f64, elevation: f64, resolution: Resolution) -> [u8; RESPONSE_LEN] {
    let mut bytes = [0u8; RESPONSE_LEN];
    bytes[0] = START;
    bytes[1..5].copy_from_slice(&raw_digits(azimuth));
    bytes[5] = resolution.pulses_per_degree();
    bytes[6..10].copy_from_slice(&raw_digits(elevation));
    bytes[10] = resolution.pulses_per_degree();
    bytes[11] = END;
    bytes
}

fn raw_digits(angle: f64) -> [u8; 4] {
    let tenths = ((angle + 360.0) * 10.0).round().clamp(0.0, 9999.0) as u16;
    [
        (tenths / 1000 % 10) as u8,
        (tenths / 100 % 10) as u8,
        (tenths / 10 % 10) as u8,
        (tenths % 10) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(ppd: u8) -> Resolution {
        Resolution::try_from(ppd).unwrap()
    }

    #[test]
    fn test_encode_set_origin_at_unit_resolution() {
        let packet = Command::Set {
            azimuth: 0.0,
            elevation: 0.0,
        }
        .encode(res(1))
        .unwrap();

        assert_eq!(
            packet.as_bytes(),
            &[0x57, 0x30, 0x33, 0x36, 0x30, 0x01, 0x30, 0x33, 0x36, 0x30, 0x01, 0x2F, 0x20]
        );
    }

    #[test]
    fn test_encode_set_rounds_to_resolution() {
        // 10 * (123.46 + 360) = 4834.6 -> 4835
        let packet = Command::Set {
            azimuth: 123.46,
            elevation: 45.0,
        }
        .encode(res(10))
        .unwrap();

        assert_eq!(packet.wire_position(), Some((4835, 4050)));
        assert_eq!(packet.as_bytes()[5], 10);
        assert_eq!(packet.as_bytes()[10], 10);
    }

    #[test]
    fn test_set_round_trip_on_device_grid() {
        for ppd in Resolution::VALID {
            let step = 1.0 / f64::from(ppd);
            for (az_steps, el_steps) in [(0i32, 0i32), (1, 3), (-180 * ppd as i32, -15), (540 * ppd as i32, 195)] {
                let az = f64::from(az_steps) * step;
                let el = f64::from(el_steps) * step;
                let packet = Command::Set {
                    azimuth: az,
                    elevation: el,
                }
                .encode(res(ppd))
                .unwrap();

                let expected_h = (f64::from(ppd) * (az + 360.0)).round() as u16;
                let expected_v = (f64::from(ppd) * (el + 360.0)).round() as u16;
                assert_eq!(packet.wire_position(), Some((expected_h, expected_v)));

                let (back_az, back_el) = packet.target().unwrap();
                assert!((back_az - az).abs() <= 0.05, "az {az} -> {back_az} at {ppd}");
                assert!((back_el - el).abs() <= 0.05, "el {el} -> {back_el} at {ppd}");
            }
        }
    }

    #[test]
    fn test_encode_set_rejects_unencodable_position() {
        let err = Command::Set {
            azimuth: -400.0,
            elevation: 0.0,
        }
        .encode(res(1))
        .unwrap_err();
        assert!(matches!(err, RotorError::Unencodable { value: -40 }));

        let err = Command::Set {
            azimuth: 700.0,
            elevation: 0.0,
        }
        .encode(res(10))
        .unwrap_err();
        assert!(matches!(err, RotorError::Unencodable { .. }));
    }

    #[test]
    fn test_encode_set_rejects_non_finite_angles() {
        for (azimuth, elevation) in [
            (f64::NAN, 0.0),
            (0.0, f64::NAN),
            (f64::INFINITY, 0.0),
            (0.0, f64::NEG_INFINITY),
        ] {
            let err = Command::Set { azimuth, elevation }
                .encode(res(1))
                .unwrap_err();
            assert!(
                matches!(err, RotorError::NonFiniteAngle { .. }),
                "({azimuth}, {elevation}) gave {err:?}"
            );
        }
    }

    #[test]
    fn test_fixed_commands_are_zero_filled() {
        for (command, opcode) in [
            (Command::Stop, 0x0F),
            (Command::Status, 0x1F),
            (Command::ClearSettings, 0xF8),
        ] {
            let packet = command.encode(res(4)).unwrap();
            let bytes = packet.as_bytes();
            assert_eq!(bytes[0], 0x57);
            assert!(bytes[1..11].iter().all(|b| *b == 0), "{command:?}");
            assert_eq!(bytes[11], opcode);
            assert_eq!(bytes[12], 0x20);
        }
    }

    #[test]
    fn test_jog_direction_table() {
        let expected = [0x01, 0x02, 0x04, 0x08, 0x05, 0x06, 0x0A, 0x09];
        for (direction, code) in JogDirection::ALL.iter().zip(expected) {
            let packet = Command::Jog(*direction).encode(res(2)).unwrap();
            assert_eq!(
                packet.as_bytes(),
                &[0x57, code, 0, 0, 0, 2, 0, 0, 0, 0, 2, 0x14, 0x20]
            );
        }

        let stop = Command::JogStop.encode(res(2)).unwrap();
        assert_eq!(
            stop.as_bytes(),
            &[0x57, 0, 0, 0, 0, 2, 0, 0, 0, 0, 2, 0x14, 0x20]
        );
    }

    #[test]
    fn test_motor_power_packet() {
        let packet = Command::MotorPower {
            motor1: 50,
            motor2: 100,
        }
        .encode(res(1))
        .unwrap();
        assert_eq!(
            packet.as_bytes(),
            &[0x57, 0, 0, 0, 0, 50, 0, 0, 0, 0, 100, 0xF7, 0x20]
        );
    }

    #[test]
    fn test_jog_direction_parsing() {
        assert_eq!("left".parse::<JogDirection>(), Ok(JogDirection::Left));
        assert_eq!("Right-Up".parse::<JogDirection>(), Ok(JogDirection::RightUp));
        assert_eq!("left_down".parse::<JogDirection>(), Ok(JogDirection::LeftDown));
        assert!("sideways".parse::<JogDirection>().is_err());
    }

    #[test]
    fn test_decode_status_response() {
        // 3,7,2,5 -> 372.5 - 360 = 12.5 ; 4,0,5,0 -> 405.0 - 360 = 45.0
        let bytes = [0x57, 3, 7, 2, 5, 2, 4, 0, 5, 0, 2, 0x20];
        let response = decode(&bytes).unwrap();

        assert_eq!(response.azimuth, 12.5);
        assert_eq!(response.elevation, 45.0);
        assert_eq!(response.resolution.pulses_per_degree(), 2);
    }

    #[test]
    fn test_decode_negative_angles() {
        let bytes = response_bytes(-12.3, -5.0, res(10));
        let response = decode(&bytes).unwrap();
        assert_eq!(response.azimuth, -12.3);
        assert_eq!(response.elevation, -5.0);
    }

    #[test]
    fn test_decode_empty_is_timeout() {
        assert!(matches!(decode(&[]), Err(RotorError::ReadTimeout)));
    }

    #[test]
    fn test_decode_short_is_packet_error() {
        let bytes = [0x57, 3, 6, 0, 0, 1];
        assert!(matches!(decode(&bytes), Err(RotorError::Packet(_))));
    }

    #[test]
    fn test_decode_rejects_bad_resolution() {
        let mut mismatched = response_bytes(0.0, 0.0, res(2));
        mismatched[10] = 4;
        assert!(matches!(decode(&mismatched), Err(RotorError::Packet(_))));

        let mut invalid = response_bytes(0.0, 0.0, res(1));
        invalid[5] = 3;
        invalid[10] = 3;
        assert!(matches!(decode(&invalid), Err(RotorError::Packet(_))));
    }

    #[test]
    fn test_resolution_validation() {
        for ppd in [1, 2, 4, 10] {
            assert_eq!(res(ppd).pulses_per_degree(), ppd);
        }
        assert!(Resolution::try_from(0).is_err());
        assert!(Resolution::try_from(5).is_err());
        assert_eq!(Resolution::default().pulses_per_degree(), 1);
    }

    #[test]
    fn test_response_expectations() {
        assert!(Command::Status.expects_response());
        assert!(Command::Stop.expects_response());
        assert!(Command::Jog(JogDirection::Up).expects_response());
        assert!(Command::JogStop.expects_response());
        assert!(!Command::Set {
            azimuth: 0.0,
            elevation: 0.0
        }
        .expects_response());
        assert!(!Command::ClearSettings.expects_response());
    }
}
