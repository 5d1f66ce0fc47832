//! Command frames
//!
//! An outbound unit: a command type tag plus an opaque byte body.
//!
//! ## Text Form (default wire form)
//! ```text
//! KEYWORD [SP body] CRLF
//! ```
//!
//! ## Legacy Binary Form
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Len (2)  │ Type (2) │            Body             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```

use bytes::{Bytes, BytesMut, BufMut};

use crate::error::{CtlError, Result};
use super::codec;

/// Binary header size: 2 bytes body length + 2 bytes type code
pub const BINARY_HEADER_SIZE: usize = 4;

/// Command type tags
///
/// Tags are not validated; `Raw` carries any keyword the server may accept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandType {
    SetConf,
    GetConf,
    SetEvents,
    Authenticate,
    SaveConf,
    Signal,
    MapAddress,
    GetInfo,
    ExtendCircuit,
    AttachStream,
    PostDescriptor,
    RedirectStream,
    CloseStream,
    CloseCircuit,
    Quit,
    Raw(String),
}

impl CommandType {
    /// Keyword written at the start of the text form
    pub fn keyword(&self) -> &str {
        match self {
            CommandType::SetConf => "SETCONF",
            CommandType::GetConf => "GETCONF",
            CommandType::SetEvents => "SETEVENTS",
            CommandType::Authenticate => "AUTHENTICATE",
            CommandType::SaveConf => "SAVECONF",
            CommandType::Signal => "SIGNAL",
            CommandType::MapAddress => "MAPADDRESS",
            CommandType::GetInfo => "GETINFO",
            CommandType::ExtendCircuit => "EXTENDCIRCUIT",
            CommandType::AttachStream => "ATTACHSTREAM",
            CommandType::PostDescriptor => "POSTDESCRIPTOR",
            CommandType::RedirectStream => "REDIRECTSTREAM",
            CommandType::CloseStream => "CLOSESTREAM",
            CommandType::CloseCircuit => "CLOSECIRCUIT",
            CommandType::Quit => "QUIT",
            CommandType::Raw(keyword) => keyword,
        }
    }

    /// Numeric tag used by the legacy binary framing
    ///
    /// Commands that only exist in the text protocol have no code.
    pub fn code(&self) -> Option<u16> {
        let code = match self {
            CommandType::SetConf => 0x0002,
            CommandType::GetConf => 0x0003,
            CommandType::SetEvents => 0x0005,
            CommandType::Authenticate => 0x0007,
            CommandType::SaveConf => 0x0008,
            CommandType::Signal => 0x0009,
            CommandType::MapAddress => 0x000A,
            CommandType::GetInfo => 0x000B,
            CommandType::ExtendCircuit => 0x000D,
            CommandType::AttachStream => 0x000E,
            CommandType::PostDescriptor => 0x000F,
            CommandType::RedirectStream => 0x0012,
            CommandType::CloseStream => 0x0013,
            CommandType::CloseCircuit => 0x0014,
            CommandType::Quit | CommandType::Raw(_) => return None,
        };
        Some(code)
    }

    /// Reverse of [`CommandType::code`]
    pub fn from_code(code: u16) -> Option<Self> {
        let command_type = match code {
            0x0002 => CommandType::SetConf,
            0x0003 => CommandType::GetConf,
            0x0005 => CommandType::SetEvents,
            0x0007 => CommandType::Authenticate,
            0x0008 => CommandType::SaveConf,
            0x0009 => CommandType::Signal,
            0x000A => CommandType::MapAddress,
            0x000B => CommandType::GetInfo,
            0x000D => CommandType::ExtendCircuit,
            0x000E => CommandType::AttachStream,
            0x000F => CommandType::PostDescriptor,
            0x0012 => CommandType::RedirectStream,
            0x0013 => CommandType::CloseStream,
            0x0014 => CommandType::CloseCircuit,
            _ => return None,
        };
        Some(command_type)
    }
}

/// One outbound command
///
/// The body length is fixed at construction; `body_mut` allows filling a
/// pre-sized body in place but never resizing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    command_type: CommandType,
    body: Box<[u8]>,
}

impl CommandFrame {
    /// Create a frame with an explicit body
    pub fn new(command_type: CommandType, body: impl Into<Vec<u8>>) -> Self {
        Self {
            command_type,
            body: body.into().into_boxed_slice(),
        }
    }

    /// Create a frame with a zero-filled body of `len` bytes
    pub fn with_len(command_type: CommandType, len: usize) -> Self {
        Self {
            command_type,
            body: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Create a frame with no body
    pub fn empty(command_type: CommandType) -> Self {
        Self::new(command_type, Vec::new())
    }

    pub fn command_type(&self) -> &CommandType {
        &self.command_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Mutable view of the body for in-place fill
    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.body
    }

    /// Encode to the text wire form
    pub fn encode(&self) -> Bytes {
        let keyword = self.command_type.keyword();
        let mut buf = BytesMut::with_capacity(keyword.len() + 1 + self.body.len() + 2);
        buf.put_slice(keyword.as_bytes());
        if !self.body.is_empty() {
            buf.put_u8(b' ');
            buf.put_slice(&self.body);
        }
        buf.put_slice(b"\r\n");
        buf.freeze()
    }

    /// Encode to the legacy binary form
    ///
    /// Format: body_len (2) + type_code (2) + body
    pub fn encode_binary(&self) -> Result<Bytes> {
        let code = self.command_type.code().ok_or_else(|| {
            CtlError::InvalidCommand(format!(
                "{} has no binary type code",
                self.command_type.keyword()
            ))
        })?;

        let len = u16::try_from(self.body.len()).map_err(|_| {
            CtlError::InvalidCommand(format!(
                "Body too large for binary framing: {} bytes (max {})",
                self.body.len(),
                u16::MAX
            ))
        })?;

        let mut buf = BytesMut::with_capacity(BINARY_HEADER_SIZE + self.body.len());
        codec::put_u16(&mut buf, len);
        codec::put_u16(&mut buf, code);
        buf.put_slice(&self.body);
        Ok(buf.freeze())
    }

    /// Decode one frame from the legacy binary form
    ///
    /// Returns the frame and number of bytes consumed
    pub fn decode_binary(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut cursor = bytes;
        let len = codec::get_u16(&mut cursor)? as usize;
        let code = codec::get_u16(&mut cursor)?;

        if cursor.len() < len {
            return Err(CtlError::BufferUnderflow {
                needed: len,
                available: cursor.len(),
            });
        }

        let command_type = CommandType::from_code(code).ok_or_else(|| {
            CtlError::InvalidCommand(format!("Unknown command type: 0x{:04x}", code))
        })?;

        let frame = Self::new(command_type, &cursor[..len]);
        Ok((frame, BINARY_HEADER_SIZE + len))
    }
}
