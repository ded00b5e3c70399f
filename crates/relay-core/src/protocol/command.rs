//! Roomba Open Interface command frames.
//!
//! Wire format (all multi-byte integers are big-endian, two's complement):
//! ```text
//! Start  [0x80]
//! Safe   [0x83]
//! Full   [0x84]
//! Drive  [0x89][velocity:2][radius:2]
//! ```
//!
//! # Drive semantics
//!
//! `velocity` is the average wheel speed in mm/s (−500..=500, negative drives
//! backwards).  `radius` is the turn radius in mm (−2000..=2000).  A handful of
//! radius values are special:
//!
//! | Radius   | Meaning                          |
//! |----------|----------------------------------|
//! | `0x8000` | drive straight                   |
//! | `0x7FFF` | drive straight (alternate form)  |
//! | `-1`     | spin in place clockwise          |
//! | `1`      | spin in place counter-clockwise  |
//!
//! The relay itself treats frames as opaque bytes; this module only exists so
//! the operator console can build valid frames.

use thiserror::Error;

pub const OPCODE_START: u8 = 0x80;
pub const OPCODE_SAFE: u8 = 0x83;
pub const OPCODE_FULL: u8 = 0x84;
pub const OPCODE_DRIVE: u8 = 0x89;

/// Maximum absolute drive velocity in mm/s.
pub const MAX_VELOCITY_MM_S: i16 = 500;
/// Maximum absolute turn radius in mm (special values excluded).
pub const MAX_RADIUS_MM: i16 = 2000;

pub const RADIUS_STRAIGHT: i16 = i16::MIN;
pub const RADIUS_STRAIGHT_ALT: i16 = i16::MAX;
pub const RADIUS_SPIN_CLOCKWISE: i16 = -1;
pub const RADIUS_SPIN_COUNTER_CLOCKWISE: i16 = 1;

/// Frame sent to every device immediately after its connection is accepted.
///
/// Decodes as `Drive { velocity: 500, radius: 0 }`, which sets the robot
/// rotating at full speed so an operator can see that it joined the relay.
pub const HANDSHAKE_FRAME: [u8; 5] = [OPCODE_DRIVE, 0x01, 0xF4, 0x00, 0x00];

/// Errors raised while building a command frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The requested velocity is outside −500..=500 mm/s.
    #[error("velocity {0} mm/s is outside -500..=500")]
    VelocityOutOfRange(i16),

    /// The requested radius is outside −2000..=2000 mm and is not a special value.
    #[error("radius {0} mm is outside -2000..=2000")]
    RadiusOutOfRange(i16),
}

/// A single Open Interface command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OiCommand {
    /// Starts the Open Interface (passive mode).
    Start,
    /// Enters safe mode: cliff and wheel-drop sensors still stop the robot.
    Safe,
    /// Enters full mode: all safety features disabled.
    Full,
    /// Drives the wheels.
    Drive { velocity: i16, radius: i16 },
    /// Stops the wheels.  Encoded as a zero-velocity, zero-radius drive.
    Stop,
}

impl OiCommand {
    /// Builds a validated [`OiCommand::Drive`].
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::VelocityOutOfRange`] or
    /// [`CommandError::RadiusOutOfRange`] when either argument cannot be
    /// represented on the wire.
    pub fn drive(velocity: i16, radius: i16) -> Result<Self, CommandError> {
        if !(-MAX_VELOCITY_MM_S..=MAX_VELOCITY_MM_S).contains(&velocity) {
            return Err(CommandError::VelocityOutOfRange(velocity));
        }
        let special = matches!(radius, RADIUS_STRAIGHT | RADIUS_STRAIGHT_ALT);
        if !special && !(-MAX_RADIUS_MM..=MAX_RADIUS_MM).contains(&radius) {
            return Err(CommandError::RadiusOutOfRange(radius));
        }
        Ok(Self::Drive { velocity, radius })
    }

    /// Drive straight ahead (or backwards for negative velocity).
    pub fn straight(velocity: i16) -> Result<Self, CommandError> {
        Self::drive(velocity, RADIUS_STRAIGHT)
    }

    /// Spin in place; positive velocity turns counter-clockwise.
    pub fn spin(velocity: i16) -> Result<Self, CommandError> {
        if velocity < 0 {
            Self::drive(velocity.saturating_neg(), RADIUS_SPIN_CLOCKWISE)
        } else {
            Self::drive(velocity, RADIUS_SPIN_COUNTER_CLOCKWISE)
        }
    }

    /// The command that [`HANDSHAKE_FRAME`] encodes.
    pub fn handshake() -> Self {
        Self::Drive {
            velocity: 500,
            radius: 0,
        }
    }

    /// Returns the opcode byte that starts this command's frame.
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Start => OPCODE_START,
            Self::Safe => OPCODE_SAFE,
            Self::Full => OPCODE_FULL,
            Self::Drive { .. } | Self::Stop => OPCODE_DRIVE,
        }
    }

    /// Total frame length in bytes, opcode included.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Start | Self::Safe | Self::Full => 1,
            Self::Drive { .. } | Self::Stop => 5,
        }
    }

    /// Appends the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.opcode());
        let (velocity, radius) = match *self {
            Self::Drive { velocity, radius } => (velocity, radius),
            Self::Stop => (0, 0),
            Self::Start | Self::Safe | Self::Full => return,
        };
        buf.extend_from_slice(&velocity.to_be_bytes());
        buf.extend_from_slice(&radius.to_be_bytes());
    }

    /// Encodes the command into a freshly allocated frame.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use relay_core::{OiCommand, HANDSHAKE_FRAME};
    ///
    /// assert_eq!(OiCommand::handshake().encode(), HANDSHAKE_FRAME);
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }
}

/// Encodes a sequence of commands back to back into a single frame buffer.
///
/// Devices execute the commands in order, so a script such as
/// `[Start, Safe, Drive]` can be broadcast in one write.
pub fn encode_script(commands: &[OiCommand]) -> Vec<u8> {
    let len = commands.iter().map(OiCommand::encoded_len).sum();
    let mut buf = Vec::with_capacity(len);
    for cmd in commands {
        cmd.encode_into(&mut buf);
    }
    buf
}

// ── Tests ─────────────────────────────────────────────────────────────────────
