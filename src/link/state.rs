use crate::{config::is_supported_baud, error::LinkStateError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortSettings {
    pub port: String,
    pub baud: u32,
}

/// Configured/connected bookkeeping for the one serial link. Settings must be
/// chosen before a connection is attempted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkState {
    settings: Option<PortSettings>,
    connected: bool,
}

impl LinkState {
    pub fn configure(&mut self, port: &str, baud: u32) -> Result<(), LinkStateError> {
        if !is_supported_baud(baud) {
            return Err(LinkStateError::UnsupportedBaud(baud));
        }
        if port.trim().is_empty() {
            return Err(LinkStateError::NotConfigured);
        }
        self.settings = Some(PortSettings {
            port: port.to_string(),
            baud,
        });
        Ok(())
    }

    pub fn settings(&self) -> Option<&PortSettings> {
        self.settings.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Configured and open.
    pub fn is_ready(&self) -> bool {
        self.is_configured() && self.connected
    }

    /// Checks that a connection may be opened and returns the settings to
    /// open it with.
    pub fn begin_connect(&self) -> Result<&PortSettings, LinkStateError> {
        if self.connected {
            return Err(LinkStateError::AlreadyConnected);
        }
        self.settings.as_ref().ok_or(LinkStateError::NotConfigured)
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
    }

    pub fn mark_disconnected(&mut self) -> Result<(), LinkStateError> {
        if !self.connected {
            return Err(LinkStateError::NotConnected);
        }
        self.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_requires_configuration() {
        let state = LinkState::default();
        assert_eq!(state.begin_connect(), Err(LinkStateError::NotConfigured));
    }

    #[test]
    fn only_enumerated_bauds_are_accepted() {
        let mut state = LinkState::default();
        assert_eq!(
            state.configure("/dev/ttyACM0", 57600),
            Err(LinkStateError::UnsupportedBaud(57600))
        );
        assert!(state.configure("/dev/ttyACM0", 9600).is_ok());
        assert_eq!(state.settings().map(|s| s.baud), Some(9600));
    }

    #[test]
    fn open_and_close_alternate() {
        let mut state = LinkState::default();
        state.configure("COM3", 115200).expect("valid settings");
        assert!(state.begin_connect().is_ok());
        state.mark_connected();
        assert!(state.is_ready());
        assert_eq!(state.begin_connect(), Err(LinkStateError::AlreadyConnected));
        assert!(state.mark_disconnected().is_ok());
        assert_eq!(state.mark_disconnected(), Err(LinkStateError::NotConnected));
    }
}
