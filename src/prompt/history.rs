use super::buffer::Buffer;

/// Past inputs with up/down navigation.
///
/// `working` mirrors `entries` plus one trailing slot for the line being edited. Navigation
/// stashes the current buffer text into the slot it leaves, so walking back to the end restores
/// exactly what was typed.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<String>,
    working: Vec<String>,
    selected: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            working: vec![String::new()],
            selected: 0,
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Append an entry (empty strings are ignored) and reset navigation.
    pub fn add(&mut self, input: &str) {
        if input.is_empty() {
            return;
        }
        self.entries.push(input.to_string());
        self.reset_navigation();
    }

    /// Drop every entry and reset navigation.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.reset_navigation();
    }

    /// Discard navigation edits without touching stored entries.
    pub fn reset_navigation(&mut self) {
        self.working = self.entries.clone();
        self.working.push(String::new());
        self.selected = self.working.len() - 1;
    }

    /// Step toward the oldest entry. Returns `None` when already there.
    pub fn older(&mut self, buf: &Buffer) -> Option<Buffer> {
        if self.working.len() == 1 || self.selected == 0 {
            return None;
        }
        self.working[self.selected] = buf.text().to_string();
        self.selected -= 1;
        Some(self.selected_buffer())
    }

    /// Step toward the line being edited. Returns `None` when already there.
    pub fn newer(&mut self, buf: &Buffer) -> Option<Buffer> {
        if self.selected + 1 >= self.working.len() {
            return None;
        }
        self.working[self.selected] = buf.text().to_string();
        self.selected += 1;
        Some(self.selected_buffer())
    }

    fn selected_buffer(&self) -> Buffer {
        let mut buf = Buffer::new();
        buf.insert_text(&self.working[self.selected], false, true);
        buf
    }
}
