//! Key bindings, evaluated in tiers: common, then the selected mode, then caller bindings.

use clap::ValueEnum;

use super::buffer::Buffer;
use super::key::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum KeyBindMode {
    #[default]
    Common,
    Emacs,
}

pub type KeyBindFn = Box<dyn Fn(&mut Buffer) + Send>;

pub struct KeyBind {
    pub key: Key,
    pub handler: KeyBindFn,
}

impl KeyBind {
    pub fn new(key: Key, handler: impl Fn(&mut Buffer) + Send + 'static) -> Self {
        Self {
            key,
            handler: Box::new(handler),
        }
    }
}

/// Binding matched against the exact bytes of an otherwise undefined key.
pub struct AsciiCodeBind {
    pub code: Vec<u8>,
    pub handler: KeyBindFn,
}

impl AsciiCodeBind {
    pub fn new(code: &[u8], handler: impl Fn(&mut Buffer) + Send + 'static) -> Self {
        Self {
            code: code.to_vec(),
            handler: Box::new(handler),
        }
    }
}

fn common_bindings() -> Vec<KeyBind> {
    vec![
        KeyBind::new(Key::End, Buffer::go_line_end),
        KeyBind::new(Key::Home, Buffer::go_line_beginning),
        KeyBind::new(Key::Delete, |buf| {
            buf.delete(1);
        }),
        KeyBind::new(Key::Backspace, |buf| {
            buf.delete_before_cursor(1);
        }),
        KeyBind::new(Key::Right, |buf| buf.cursor_right(1)),
        KeyBind::new(Key::Left, |buf| buf.cursor_left(1)),
        KeyBind::new(Key::ControlLeft, Buffer::cursor_word_left),
        KeyBind::new(Key::ControlRight, Buffer::cursor_word_right),
    ]
}

fn emacs_bindings() -> Vec<KeyBind> {
    vec![
        KeyBind::new(Key::ControlA, Buffer::go_line_beginning),
        KeyBind::new(Key::ControlE, Buffer::go_line_end),
        KeyBind::new(Key::ControlF, |buf| buf.cursor_right(1)),
        KeyBind::new(Key::ControlB, |buf| buf.cursor_left(1)),
        KeyBind::new(Key::ControlK, |buf| {
            buf.kill_line_after_cursor();
        }),
        KeyBind::new(Key::ControlU, |buf| {
            buf.kill_line_before_cursor();
        }),
        KeyBind::new(Key::ControlD, |buf| {
            buf.delete(1);
        }),
        KeyBind::new(Key::ControlH, |buf| {
            buf.delete_before_cursor(1);
        }),
        KeyBind::new(Key::ControlW, |buf| {
            buf.delete_word_before_cursor();
        }),
    ]
}

/// Ordered binding tiers for one session.
pub struct KeyBindings {
    common: Vec<KeyBind>,
    mode: Vec<KeyBind>,
    custom: Vec<KeyBind>,
    ascii: Vec<AsciiCodeBind>,
}

impl KeyBindings {
    pub fn new(mode: KeyBindMode) -> Self {
        Self {
            common: common_bindings(),
            mode: match mode {
                KeyBindMode::Common => Vec::new(),
                KeyBindMode::Emacs => emacs_bindings(),
            },
            custom: Vec::new(),
            ascii: Vec::new(),
        }
    }

    pub fn add(&mut self, bind: KeyBind) {
        self.custom.push(bind);
    }

    pub fn add_ascii(&mut self, bind: AsciiCodeBind) {
        self.ascii.push(bind);
    }

    /// Run every handler bound to `key`, tier by tier.
    pub fn apply(&self, key: Key, buf: &mut Buffer) {
        for bind in self
            .common
            .iter()
            .chain(self.mode.iter())
            .chain(self.custom.iter())
        {
            if bind.key == key {
                (bind.handler)(buf);
            }
        }
    }

    /// Run handlers bound to exactly `bytes`. Returns whether any matched.
    pub fn apply_ascii(&self, bytes: &[u8], buf: &mut Buffer) -> bool {
        let mut matched = false;
        for bind in &self.ascii {
            if bind.code == bytes {
                (bind.handler)(buf);
                matched = true;
            }
        }
        matched
    }
}
