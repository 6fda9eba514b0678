// Serial servo bus protocol
//
// Half-duplex register protocol for the smart servos driving each wheel's
// azimuth and drive motors. Packet format:
// [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for the servo bus
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// Register addresses
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // EEPROM area (persists across power cycles)
    ModelNumber = 3, // 2 bytes, read-only
    Id = 5,          // 1 byte

    // RAM area (volatile)
    OperatingMode = 11,    // 1 byte: 0=position, 1=velocity, 2=PWM
    TorqueEnable = 24,     // 1 byte: 0=off, 1=on
    GoalPosition = 26,     // 4 bytes signed, multi-turn
    GoalVelocity = 30,     // 2 bytes signed
    GoalPwm = 32,          // 2 bytes signed, -1000..1000 per mille
    PositionReset = 36,    // 4 bytes signed: re-homes the relative encoder
    PresentPosition = 40,  // 4 bytes signed, read-only, multi-turn
    AbsolutePosition = 46, // 2 bytes, read-only, 12-bit magnetic encoder
}

/// Operating modes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
}

/// Error types for servo bus communication
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned fault status: 0x{status:02X}")]
    Fault { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// Servo bus - handles serial communication with the wheel servos
pub struct ServoBus {
    port: Box<dyn SerialPort>,
}

impl ServoBus {
    /// Open a new connection to the servo bus
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        // Checksum over id, length, instruction, params
        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a response packet, returning its parameter bytes.
    ///
    /// A nonzero status byte in the response is a servo fault and is
    /// returned as an error.
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                MotorError::Timeout { id: expected_id }
            } else {
                MotorError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(MotorError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(MotorError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        // Remaining bytes: status + params + checksum
        let mut remaining = vec![0u8; length];
        self.port.read_exact(&mut remaining)?;

        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        let expected_checksum = Self::checksum(&checksum_data);
        let received_checksum = remaining[remaining.len() - 1];

        if expected_checksum != received_checksum {
            return Err(MotorError::ChecksumMismatch { id });
        }

        let status = remaining[0];
        if status != 0 {
            return Err(MotorError::Fault { id, status });
        }

        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Ping a servo to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(MotorError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a single byte to a register
    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to servo {}: reg={:?}, value={}", id, register, value);
        self.write_registers(id, register, &[value])
    }

    /// Write a signed 16-bit value (little-endian) to a register
    pub fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        debug!("Write i16 to servo {}: reg={:?}, value={}", id, register, value);
        self.write_registers(id, register, &value.to_le_bytes())
    }

    /// Write a signed 32-bit value (little-endian) to a register
    pub fn write_i32(&mut self, id: u8, register: Register, value: i32) -> Result<()> {
        debug!("Write i32 to servo {}: reg={:?}, value={}", id, register, value);
        self.write_registers(id, register, &value.to_le_bytes())
    }

    fn write_registers(&mut self, id: u8, register: Register, data: &[u8]) -> Result<()> {
        let mut params = vec![register as u8];
        params.extend_from_slice(data);
        let packet = Self::build_packet(id, Instruction::Write, &params);
        self.send_packet(&packet)?;

        // Status response; a fault surfaces here
        let _ = self.read_response(id)?;
        Ok(())
    }

    fn read_registers(&mut self, id: u8, register: Register, count: u8) -> Result<Vec<u8>> {
        let params = [register as u8, count];
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < count as usize {
            return Err(MotorError::InvalidResponse {
                id,
                reason: format!("Expected {} bytes, got {}", count, response.len()),
            });
        }
        Ok(response)
    }

    /// Read a single byte from a register
    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let response = self.read_registers(id, register, 1)?;
        Ok(response[0])
    }

    /// Read two bytes (little-endian) from a register
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let response = self.read_registers(id, register, 2)?;
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    /// Read a signed 32-bit value (little-endian) from a register
    pub fn read_i32(&mut self, id: u8, register: Register) -> Result<i32> {
        let response = self.read_registers(id, register, 4)?;
        Ok(i32::from_le_bytes([
            response[0],
            response[1],
            response[2],
            response[3],
        ]))
    }

    // === High-level convenience methods ===

    /// Enable torque on a servo
    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)
    }

    /// Disable torque on a servo (required before changing operating mode)
    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)
    }

    /// Set operating mode (must disable torque first)
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Set goal position in ticks (position mode)
    pub fn set_goal_position(&mut self, id: u8, ticks: i32) -> Result<()> {
        self.write_i32(id, Register::GoalPosition, ticks)
    }

    /// Set goal velocity (velocity mode)
    pub fn set_goal_velocity(&mut self, id: u8, velocity: i16) -> Result<()> {
        self.write_i16(id, Register::GoalVelocity, velocity)
    }

    /// Set PWM duty in per mille, -1000 to 1000 (PWM mode)
    pub fn set_goal_pwm(&mut self, id: u8, duty: i16) -> Result<()> {
        self.write_i16(id, Register::GoalPwm, duty.clamp(-1000, 1000))
    }

    /// Re-home the relative encoder to `ticks`.
    ///
    /// The servo acknowledges with its status byte; a rejection comes back
    /// as `MotorError::Fault`.
    pub fn reset_position(&mut self, id: u8, ticks: i32) -> Result<()> {
        self.write_i32(id, Register::PositionReset, ticks)
    }

    /// Read the multi-turn relative position in ticks
    pub fn present_position(&mut self, id: u8) -> Result<i32> {
        self.read_i32(id, Register::PresentPosition)
    }

    /// Read the masked absolute encoder position, 0-4095
    pub fn absolute_position(&mut self, id: u8) -> Result<u16> {
        let raw = self.read_u16(id, Register::AbsolutePosition)?;
        Ok(raw & 0xFFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        let checksum = ServoBus::checksum(&data);
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(checksum, 215);
    }

    #[test]
    fn test_build_ping_packet() {
        let packet = ServoBus::build_packet(1, Instruction::Ping, &[]);
        // Header (2) + ID (1) + Length (1) + Instruction (1) + Checksum (1)
        assert_eq!(packet.len(), 6);
        assert_eq!(packet[0], 0xFF);
        assert_eq!(packet[1], 0xFF);
        assert_eq!(packet[2], 1); // ID
        assert_eq!(packet[3], 2); // Length (instruction + checksum)
        assert_eq!(packet[4], 0x01); // PING instruction
    }

    #[test]
    fn test_build_write_i32_packet() {
        let value: i32 = -2048;
        let mut params = vec![Register::GoalPosition as u8];
        params.extend_from_slice(&value.to_le_bytes());
        let packet = ServoBus::build_packet(10, Instruction::Write, &params);

        // Header (2) + ID (1) + Length (1) + Instruction (1) + Addr (1)
        // + Data (4) + Checksum (1)
        assert_eq!(packet.len(), 11);
        assert_eq!(packet[2], 10);
        assert_eq!(packet[3], 7); // addr + 4 data + instruction + checksum
        assert_eq!(packet[5], Register::GoalPosition as u8);
        assert_eq!(
            i32::from_le_bytes([packet[6], packet[7], packet[8], packet[9]]),
            -2048
        );

        // packet verifies against its own checksum
        let body = &packet[2..packet.len() - 1];
        assert_eq!(ServoBus::checksum(body), packet[packet.len() - 1]);
    }

}
