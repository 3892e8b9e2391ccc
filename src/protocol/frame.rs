use core::fmt;

use crate::{config::PinMap, error::FrameError, types::ValveId};

pub const FRAME_LEN: usize = 8;
pub const PAD: char = '0';
pub const LINE_TERMINATOR: char = '\n';

/// Single-character commands understood by the stand controller outside the
/// pin-toggle family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReservedCommand {
    Abort,
    MainValveFire,
    Ignite,
}

impl ReservedCommand {
    pub fn as_char(self) -> char {
        match self {
            Self::Abort => 'a',
            Self::MainValveFire => 'm',
            Self::Ignite => 'i',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'a' => Some(Self::Abort),
            'm' => Some(Self::MainValveFire),
            'i' => Some(Self::Ignite),
            _ => None,
        }
    }

    pub fn frame(self) -> CommandFrame {
        let mut text = String::with_capacity(FRAME_LEN);
        text.push(self.as_char());
        pad_to_frame(&mut text);
        CommandFrame(text)
    }
}

/// Eight wire characters: physical pin digits followed by `'0'` padding, or a
/// reserved command letter followed by padding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommandFrame(String);

impl CommandFrame {
    /// Frame with no pins set; toggles nothing.
    pub fn empty() -> Self {
        Self(PAD.to_string().repeat(FRAME_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Frame text plus the line terminator, as written to the wire.
    pub fn wire_line(&self) -> String {
        let mut line = String::with_capacity(FRAME_LEN + 1);
        line.push_str(&self.0);
        line.push(LINE_TERMINATOR);
        line
    }

    /// Non-pad characters in transmission order.
    pub fn pins(&self) -> Vec<char> {
        self.0.chars().filter(|c| *c != PAD).collect()
    }

    pub fn reserved(&self) -> Option<ReservedCommand> {
        let mut chars = self.0.chars();
        let first = chars.next()?;
        if chars.all(|c| c == PAD) {
            ReservedCommand::from_char(first)
        } else {
            None
        }
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn pad_to_frame(text: &mut String) {
    while text.len() < FRAME_LEN {
        text.push(PAD);
    }
}

/// Builds a frame from physical pin digits. A lone reserved command letter is
/// framed the same way.
pub fn encode_command(pins: &str) -> Result<CommandFrame, FrameError> {
    let mut seen = Vec::with_capacity(FRAME_LEN);
    for c in pins.chars() {
        if seen.contains(&c) {
            return Err(FrameError::DuplicatePin(c));
        }
        seen.push(c);
    }

    if seen.len() > FRAME_LEN {
        return Err(FrameError::TooLong {
            len: seen.len(),
            max: FRAME_LEN,
        });
    }

    if let [only] = seen.as_slice() {
        if let Some(command) = ReservedCommand::from_char(*only) {
            return Ok(command.frame());
        }
    }

    if let Some(&bad) = seen.iter().find(|c| !matches!(**c, '1'..='9')) {
        return Err(FrameError::InvalidChar(bad));
    }

    let mut text: String = seen.into_iter().collect();
    pad_to_frame(&mut text);
    Ok(CommandFrame(text))
}

/// Frame toggling the given logical valves through the pin map.
pub fn encode_valves(valves: &[ValveId], pin_map: &PinMap) -> Result<CommandFrame, FrameError> {
    let mut pins = String::with_capacity(valves.len());
    for valve in valves {
        let pin = pin_map
            .physical_pin(*valve)
            .ok_or(FrameError::UnknownValve(valve.0))?;
        pins.push(char::from(b'0' + pin));
    }
    encode_command(&pins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_eight_characters() {
        let frame = encode_command("123").expect("distinct pins encode");
        assert_eq!(frame.as_str(), "12300000");
        assert_eq!(frame.wire_line(), "12300000\n");
        assert_eq!(frame.pins(), vec!['1', '2', '3']);
    }

    #[test]
    fn empty_input_is_all_pad() {
        assert_eq!(encode_command("").expect("empty encodes"), CommandFrame::empty());
    }

    #[test]
    fn duplicate_pin_is_rejected() {
        assert_eq!(encode_command("1231"), Err(FrameError::DuplicatePin('1')));
    }

    #[test]
    fn duplicate_wins_over_length() {
        assert_eq!(
            encode_command("1234567899"),
            Err(FrameError::DuplicatePin('9'))
        );
    }

    #[test]
    fn nine_distinct_pins_do_not_fit() {
        assert_eq!(
            encode_command("123456789"),
            Err(FrameError::TooLong { len: 9, max: 8 })
        );
    }

    #[test]
    fn pad_digit_and_letters_inside_frames_are_rejected() {
        assert_eq!(encode_command("10"), Err(FrameError::InvalidChar('0')));
        assert_eq!(encode_command("1a"), Err(FrameError::InvalidChar('a')));
        assert_eq!(encode_command("x"), Err(FrameError::InvalidChar('x')));
    }

    #[test]
    fn reserved_commands_frame_like_single_pins() {
        assert_eq!(ReservedCommand::Abort.frame().as_str(), "a0000000");
        assert_eq!(ReservedCommand::MainValveFire.frame().as_str(), "m0000000");
        assert_eq!(ReservedCommand::Ignite.frame().as_str(), "i0000000");
        let frame = encode_command("i").expect("reserved letter encodes");
        assert_eq!(frame.reserved(), Some(ReservedCommand::Ignite));
        assert_eq!(encode_command("5").expect("pin").reserved(), None);
    }

    #[test]
    fn valves_are_translated_through_pin_map() {
        let frame = encode_valves(&[ValveId(7), ValveId(1)], &PinMap::default())
            .expect("valid valves");
        assert_eq!(frame.as_str(), "81000000");
        assert_eq!(
            encode_valves(&[ValveId(12)], &PinMap::default()),
            Err(FrameError::UnknownValve(12))
        );
    }
}
