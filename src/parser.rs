//! State-package parser for the robot's secondary interface
//!
//! A frame's payload starts with a fixed 5-byte header, followed by
//! sub-packages laid out as `i32 size | u8 type | body[size - 5]`, all
//! big-endian. The parser walks sub-packages until it finds the requested
//! type, then decodes its fixed binary layout. Any inconsistency (declared
//! size overflowing the buffer, truncated fixed layout) yields `None` for
//! the whole frame rather than a partial decode.

use crate::codec;
use serde::{Deserialize, Serialize};

/// Bytes of opaque payload header preceding the first sub-package.
const PAYLOAD_HEADER_LEN: usize = 5;

/// Sub-package header: 4-byte size plus 1-byte type tag.
const SUB_HEADER_LEN: usize = 5;

/// Per-joint record stride inside a JointData body. The angle is the first
/// 8 bytes; the rest of the record holds velocities, currents and
/// temperatures this subsystem does not use.
const JOINT_STRIDE: usize = 41;

/// Sub-package type tags from the robot state protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PackageType {
    JointData = 1,
    ToolData = 2,
    CartesianInfo = 4,
}

/// Joint angles in radians, one per axis, base to wrist.
pub type JointPositions = [f64; 6];

/// Actual TCP pose plus the currently configured TCP offset.
///
/// Positions are meters, rotations are radians (axis-angle).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    /// Configured TCP offset, same field order as the pose.
    pub tcp_offset: [f64; 6],
}

/// Tool I/O state, 32-byte fixed layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolData {
    pub analog_input_range0: u8,
    pub analog_input_range1: u8,
    pub analog_input0: f64,
    pub analog_input1: f64,
    pub tool_voltage_48v: f32,
    pub tool_output_voltage: u8,
    pub tool_current: f32,
    pub tool_temperature: f32,
    pub tool_mode: u8,
}

/// Extract joint angles from a frame payload.
///
/// Finds the JointData sub-package and reads one double per 41-byte joint
/// record. Returns `None` if no JointData sub-package is present or any
/// joint's 8-byte window would run past the buffer.
pub fn parse_joint_positions(payload: &[u8]) -> Option<JointPositions> {
    extract(payload, PackageType::JointData, |body| {
        let mut joints = [0.0f64; 6];
        for (i, joint) in joints.iter_mut().enumerate() {
            *joint = codec::read_f64(body, i * JOINT_STRIDE)?;
        }
        Some(joints)
    })
}

/// Extract the TCP pose and offset from a frame payload.
///
/// The CartesianInfo body is 12 big-endian doubles: pose X/Y/Z/Rx/Ry/Rz,
/// then the TCP offset in the same order.
pub fn parse_cartesian_positions(payload: &[u8]) -> Option<CartesianPose> {
    extract(payload, PackageType::CartesianInfo, |body| {
        if body.len() < 96 {
            return None;
        }
        let mut fields = [0.0f64; 12];
        for (i, field) in fields.iter_mut().enumerate() {
            *field = codec::read_f64(body, i * 8)?;
        }
        Some(CartesianPose {
            x: fields[0],
            y: fields[1],
            z: fields[2],
            rx: fields[3],
            ry: fields[4],
            rz: fields[5],
            tcp_offset: [
                fields[6], fields[7], fields[8], fields[9], fields[10], fields[11],
            ],
        })
    })
}

/// Extract tool I/O data from a frame payload.
pub fn parse_tool_data(payload: &[u8]) -> Option<ToolData> {
    extract(payload, PackageType::ToolData, |body| {
        if body.len() < 32 {
            return None;
        }
        Some(ToolData {
            analog_input_range0: body[0],
            analog_input_range1: body[1],
            analog_input0: codec::read_f64(body, 2)?,
            analog_input1: codec::read_f64(body, 10)?,
            tool_voltage_48v: codec::read_f32(body, 18)?,
            tool_output_voltage: body[22],
            tool_current: codec::read_f32(body, 23)?,
            tool_temperature: codec::read_f32(body, 27)?,
            tool_mode: body[31],
        })
    })
}

/// Shared sub-package walk.
///
/// All three extraction paths go through here so corrupt-size and truncation
/// handling cannot drift between them. The decoder is handed everything from
/// the matching body's first byte to the end of the payload; its own length
/// checks therefore run against the full remaining buffer. A decoder miss on
/// a matched tag abandons the frame.
fn extract<T>(
    payload: &[u8],
    wanted: PackageType,
    decode: impl Fn(&[u8]) -> Option<T>,
) -> Option<T> {
    if payload.len() < PAYLOAD_HEADER_LEN {
        return None;
    }

    let mut offset = PAYLOAD_HEADER_LEN;
    while offset + SUB_HEADER_LEN <= payload.len() {
        let declared = codec::read_i32(payload, offset)?;
        let tag = payload[offset + 4];

        // Declared size covers its own 5-byte sub-header.
        if declared < SUB_HEADER_LEN as i32 {
            return None;
        }
        let body_len = declared as usize - SUB_HEADER_LEN;
        let body_start = offset + SUB_HEADER_LEN;
        if body_start + body_len > payload.len() {
            return None;
        }

        if tag == wanted as u8 {
            return decode(&payload[body_start..]);
        }

        offset = body_start + body_len;
    }

    None
}
