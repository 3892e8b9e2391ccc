use std::{
    io::{self, Read, Write},
    time::Duration,
};

use serialport::{FlowControl, SerialPort};

use crate::{config::LinkSettings, error::TransportError};

const EOL: u8 = b'\n';

/// Byte-level access to the physical link. Implemented by [`SerialLink`] for
/// real hardware and by in-memory wires for replay and tests.
pub trait Transport: Send {
    fn is_open(&self) -> bool;

    /// Bytes buffered on the inbound side.
    fn bytes_waiting(&mut self) -> Result<u32, TransportError>;

    /// One byte, or `None` when the read timed out with nothing available.
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError>;

    /// Everything currently buffered, without waiting for more.
    fn read_available(&mut self) -> Result<Vec<u8>, TransportError>;

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Releases the connection. Safe to call more than once.
    fn close(&mut self);

    /// Reads until a line feed or until the stream stops yielding bytes. A
    /// partial line is returned as-is; the terminator is kept when present.
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut line = Vec::new();
        while let Some(byte) = self.read_byte()? {
            line.push(byte);
            if byte == EOL {
                break;
            }
        }
        Ok(line)
    }

    /// Buffered inbound data as text. Empty on no data and on decode or
    /// read faults, which are swallowed here.
    fn receive_available(&mut self) -> String {
        match self.read_available() {
            Ok(bytes) => String::from_utf8(bytes).unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.write_bytes(text.as_bytes())
    }
}

pub struct SerialLink {
    port_name: String,
    baud: u32,
    port: Option<Box<dyn SerialPort>>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SerialLink {
    pub fn open(port: &str, baud: u32, settings: &LinkSettings) -> Result<Self, TransportError> {
        let serial = serialport::new(port, baud)
            .timeout(settings.read_timeout)
            .flow_control(FlowControl::Software)
            .open()
            .map_err(|err| TransportError::Open {
                port: port.to_string(),
                baud,
                reason: err.to_string(),
            })?;

        Ok(Self {
            port_name: port.to_string(),
            baud,
            port: Some(serial),
            read_timeout: settings.read_timeout,
            write_timeout: settings.write_timeout,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

impl Transport for SerialLink {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn bytes_waiting(&mut self) -> Result<u32, TransportError> {
        self.port_mut()?
            .bytes_to_read()
            .map_err(|err| TransportError::Read(err.to_string()))
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        let port = self.port_mut()?;
        let mut buf = [0u8; 1];
        match port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(err) if is_timeout(&err) => Ok(None),
            Err(err) => Err(TransportError::Read(err.to_string())),
        }
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let waiting = self.bytes_waiting()? as usize;
        let port = self.port_mut()?;
        let mut buf = vec![0u8; waiting];
        let mut filled = 0;
        while filled < waiting {
            match port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if is_timeout(&err) => break,
                Err(err) => return Err(TransportError::Read(err.to_string())),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let write_timeout = self.write_timeout;
        let read_timeout = self.read_timeout;
        let port = self.port_mut()?;

        // serialport has one timeout for both directions; widen it for the
        // write and restore the read timeout afterwards.
        port.set_timeout(write_timeout)
            .map_err(|err| TransportError::Write(err.to_string()))?;
        let written = port.write_all(data).and_then(|()| port.flush());
        let restored = port.set_timeout(read_timeout);

        match written {
            Ok(()) => {}
            Err(err) if is_timeout(&err) => return Err(TransportError::WriteTimeout),
            Err(err) => return Err(TransportError::Write(err.to_string())),
        }
        restored.map_err(|err| TransportError::Write(err.to_string()))
    }

    fn close(&mut self) {
        self.port = None;
    }
}
