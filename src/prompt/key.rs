//! Raw terminal bytes to key events.
//!
//! Input arrives in arbitrary chunks: a single keystroke, a pasted line, or a pasted line
//! followed by its terminator. [`decode`] splits a chunk into key presses so that text runs and
//! control keys are fed to the editor in order.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,

    ControlA,
    ControlB,
    ControlC,
    ControlD,
    ControlE,
    ControlF,
    ControlG,
    ControlH,
    ControlK,
    ControlL,
    ControlN,
    ControlO,
    ControlP,
    ControlQ,
    ControlR,
    ControlS,
    ControlT,
    ControlU,
    ControlV,
    ControlW,
    ControlX,
    ControlY,
    ControlZ,

    ControlSpace,
    ControlBackslash,
    ControlSquareClose,
    ControlCircumflex,
    ControlUnderscore,

    ControlLeft,
    ControlRight,
    ControlUp,
    ControlDown,

    Up,
    Down,
    Right,
    Left,

    ShiftLeft,
    ShiftUp,
    ShiftDown,
    ShiftRight,

    Home,
    End,
    Delete,
    ShiftDelete,
    ControlDelete,
    PageUp,
    PageDown,
    BackTab,
    Insert,
    Backspace,

    Tab,
    Enter,

    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,

    /// Printable text, or a sequence with no entry in the key table.
    NotDefined,
}

/// One decoded key together with the bytes that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub bytes: Vec<u8>,
}

impl KeyPress {
    fn new(key: Key, bytes: &[u8]) -> Self {
        Self {
            key,
            bytes: bytes.to_vec(),
        }
    }

    /// Text carried by a `NotDefined` press, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

const ESC: u8 = 0x1b;

static SEQUENCES: &[(&[u8], Key)] = &[
    (b"\x1b", Key::Escape),
    (b"\x00", Key::ControlSpace),
    (b"\x01", Key::ControlA),
    (b"\x02", Key::ControlB),
    (b"\x03", Key::ControlC),
    (b"\x04", Key::ControlD),
    (b"\x05", Key::ControlE),
    (b"\x06", Key::ControlF),
    (b"\x07", Key::ControlG),
    (b"\x08", Key::ControlH),
    (b"\x09", Key::Tab),
    (b"\x0a", Key::Enter),
    (b"\x0b", Key::ControlK),
    (b"\x0c", Key::ControlL),
    (b"\x0d", Key::Enter),
    (b"\x0e", Key::ControlN),
    (b"\x0f", Key::ControlO),
    (b"\x10", Key::ControlP),
    (b"\x11", Key::ControlQ),
    (b"\x12", Key::ControlR),
    (b"\x13", Key::ControlS),
    (b"\x14", Key::ControlT),
    (b"\x15", Key::ControlU),
    (b"\x16", Key::ControlV),
    (b"\x17", Key::ControlW),
    (b"\x18", Key::ControlX),
    (b"\x19", Key::ControlY),
    (b"\x1a", Key::ControlZ),
    (b"\x1c", Key::ControlBackslash),
    (b"\x1d", Key::ControlSquareClose),
    (b"\x1e", Key::ControlCircumflex),
    (b"\x1f", Key::ControlUnderscore),
    (b"\x7f", Key::Backspace),
    (b"\x1b[A", Key::Up),
    (b"\x1b[B", Key::Down),
    (b"\x1b[C", Key::Right),
    (b"\x1b[D", Key::Left),
    (b"\x1bOA", Key::Up),
    (b"\x1bOB", Key::Down),
    (b"\x1bOC", Key::Right),
    (b"\x1bOD", Key::Left),
    (b"\x1b[H", Key::Home),
    (b"\x1b[F", Key::End),
    (b"\x1bOH", Key::Home),
    (b"\x1bOF", Key::End),
    (b"\x1b[1~", Key::Home),
    (b"\x1b[7~", Key::Home),
    (b"\x1b[4~", Key::End),
    (b"\x1b[8~", Key::End),
    (b"\x1b[2~", Key::Insert),
    (b"\x1b[3~", Key::Delete),
    (b"\x1b[3;2~", Key::ShiftDelete),
    (b"\x1b[3;5~", Key::ControlDelete),
    (b"\x1b[5~", Key::PageUp),
    (b"\x1b[6~", Key::PageDown),
    (b"\x1b[Z", Key::BackTab),
    (b"\x1b[1;5A", Key::ControlUp),
    (b"\x1b[1;5B", Key::ControlDown),
    (b"\x1b[1;5C", Key::ControlRight),
    (b"\x1b[1;5D", Key::ControlLeft),
    (b"\x1b[5A", Key::ControlUp),
    (b"\x1b[5B", Key::ControlDown),
    (b"\x1b[5C", Key::ControlRight),
    (b"\x1b[5D", Key::ControlLeft),
    (b"\x1b[1;2A", Key::ShiftUp),
    (b"\x1b[1;2B", Key::ShiftDown),
    (b"\x1b[1;2C", Key::ShiftRight),
    (b"\x1b[1;2D", Key::ShiftLeft),
    (b"\x1bOP", Key::F1),
    (b"\x1bOQ", Key::F2),
    (b"\x1bOR", Key::F3),
    (b"\x1bOS", Key::F4),
    (b"\x1b[11~", Key::F1),
    (b"\x1b[12~", Key::F2),
    (b"\x1b[13~", Key::F3),
    (b"\x1b[14~", Key::F4),
    (b"\x1b[15~", Key::F5),
    (b"\x1b[17~", Key::F6),
    (b"\x1b[18~", Key::F7),
    (b"\x1b[19~", Key::F8),
    (b"\x1b[20~", Key::F9),
    (b"\x1b[21~", Key::F10),
    (b"\x1b[23~", Key::F11),
    (b"\x1b[24~", Key::F12),
];

/// Classify a whole chunk by exact table match.
pub fn get_key(bytes: &[u8]) -> Key {
    SEQUENCES
        .iter()
        .find(|(seq, _)| *seq == bytes)
        .map(|(_, key)| *key)
        .unwrap_or(Key::NotDefined)
}

fn is_control(byte: u8) -> bool {
    byte < 0x20 || byte == 0x7f
}

/// Length of the escape sequence starting at `input[0] == ESC`.
fn escape_len(input: &[u8]) -> usize {
    match input.get(1) {
        None => 1,
        Some(b'[') => {
            // CSI: parameter/intermediate bytes then one final byte in 0x40..=0x7e.
            let mut end = 2;
            while let Some(&byte) = input.get(end) {
                end += 1;
                if (0x40..=0x7e).contains(&byte) {
                    return end;
                }
            }
            input.len()
        }
        Some(b'O') => input.len().min(3),
        Some(&next) if next == ESC => 1,
        Some(_) => 2,
    }
}

/// Split a raw chunk into key presses.
pub fn decode(input: &[u8]) -> Vec<KeyPress> {
    let mut presses = Vec::new();
    let mut i = 0;
    while i < input.len() {
        let byte = input[i];
        if byte == ESC {
            let len = escape_len(&input[i..]);
            let seq = &input[i..i + len];
            presses.push(KeyPress::new(get_key(seq), seq));
            i += len;
        } else if byte == b'\r' && input.get(i + 1) == Some(&b'\n') {
            presses.push(KeyPress::new(Key::Enter, &input[i..i + 2]));
            i += 2;
        } else if is_control(byte) {
            presses.push(KeyPress::new(get_key(&input[i..=i]), &input[i..=i]));
            i += 1;
        } else {
            let start = i;
            while i < input.len() && !is_control(input[i]) {
                i += 1;
            }
            presses.push(KeyPress::new(Key::NotDefined, &input[start..i]));
        }
    }
    presses
}

/// Length of a UTF-8 sequence cut off at the end of `bytes`, if any.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xc0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

/// Stateful [`decode`] for a chunked stream: a multi-byte character split across chunks is
/// held back until its remaining bytes arrive.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    pending: Vec<u8>,
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> Vec<KeyPress> {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);
        let complete = input.len() - incomplete_utf8_tail(&input);
        self.pending = input.split_off(complete);
        decode(&input)
    }

    /// Bytes held back from the last chunk.
    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(input: &[u8]) -> Vec<Key> {
        decode(input).into_iter().map(|press| press.key).collect()
    }

    #[test]
    fn single_control_bytes() {
        assert_eq!(get_key(b"\x03"), Key::ControlC);
        assert_eq!(get_key(b"\x04"), Key::ControlD);
        assert_eq!(get_key(b"\x09"), Key::Tab);
        assert_eq!(get_key(b"\r"), Key::Enter);
        assert_eq!(get_key(b"\n"), Key::Enter);
        assert_eq!(get_key(b"\x7f"), Key::Backspace);
        assert_eq!(get_key(b"\x1b[Z"), Key::BackTab);
        assert_eq!(get_key(b"a"), Key::NotDefined);
    }

    #[test]
    fn split_multibyte_character_is_reassembled() {
        let text = "get pod héllo-ü";
        let bytes = text.as_bytes();
        let split = text.find('é').unwrap() + 1;
        let mut decoder = KeyDecoder::new();
        let first = decoder.decode(&bytes[..split]);
        let second = decoder.decode(&bytes[split..]);
        let joined: String = first.iter().chain(second.iter()).map(KeyPress::text).collect();
        assert_eq!(joined, text);
        assert!(!joined.contains('\u{fffd}'));
        assert!(decoder.take_pending().is_empty());
    }

    #[test]
    fn held_bytes_wait_for_the_next_chunk() {
        let euro = "€".as_bytes();
        let mut decoder = KeyDecoder::new();
        assert!(decoder.decode(&euro[..1]).is_empty());
        assert!(decoder.decode(&euro[1..2]).is_empty());
        let presses = decoder.decode(&[euro[2], b'\r']);
        assert_eq!(presses[0].text(), "€");
        assert_eq!(presses[1].key, Key::Enter);
        assert_eq!(decoder.decode(&euro[..2]).len(), 0);
        assert_eq!(decoder.take_pending(), euro[..2].to_vec());
    }

    #[test]
    fn pasted_line_splits_text_and_enter() {
        let presses = decode(b"get pods\n");
        assert_eq!(presses.len(), 2);
        assert_eq!(presses[0].key, Key::NotDefined);
        assert_eq!(presses[0].text(), "get pods");
        assert_eq!(presses[1].key, Key::Enter);
    }

    #[test]
    fn crlf_collapses_to_one_enter() {
        assert_eq!(keys(b"ls\r\n"), vec![Key::NotDefined, Key::Enter]);
        assert_eq!(keys(b"\r\r"), vec![Key::Enter, Key::Enter]);
    }

    #[test]
    fn arrow_sequences_in_both_modes() {
        assert_eq!(
            keys(b"\x1b[A\x1bOB\x1b[C\x1b[D"),
            vec![Key::Up, Key::Down, Key::Right, Key::Left]
        );
        assert_eq!(keys(b"\x1b[1;5C"), vec![Key::ControlRight]);
        assert_eq!(keys(b"\x1b[3~x"), vec![Key::Delete, Key::NotDefined]);
    }

    #[test]
    fn unknown_escape_sequence_is_literal() {
        let presses = decode(b"\x1b[99;99qab");
        assert_eq!(presses[0].key, Key::NotDefined);
        assert_eq!(presses[0].bytes, b"\x1b[99;99q".to_vec());
        assert_eq!(presses[1].text(), "ab");
    }

    #[test]
    fn multibyte_text_stays_in_one_run() {
        let presses = decode("héllo wörld".as_bytes());
        assert_eq!(presses.len(), 1);
        assert_eq!(presses[0].text(), "héllo wörld");
    }

    #[test]
    fn lone_escape_at_end_of_chunk() {
        assert_eq!(keys(b"a\x1b"), vec![Key::NotDefined, Key::Escape]);
    }
}
