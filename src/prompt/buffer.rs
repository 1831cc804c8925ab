use super::document::{byte_offset, Document};
use super::key::Key;

/// Text under edit plus a cursor measured in characters. The cursor never leaves
/// `0..=char_len`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    text: String,
    cursor_position: usize,
    last_key: Option<Key>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor_position(&self) -> usize {
        self.cursor_position
    }

    pub fn last_key(&self) -> Option<Key> {
        self.last_key
    }

    pub(crate) fn set_last_key(&mut self, key: Key) {
        self.last_key = Some(key);
    }

    pub fn document(&self) -> Document<'_> {
        Document::new(&self.text, self.cursor_position).with_last_key(self.last_key)
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Insert `text` at the cursor. With `overwrite` the same number of characters after the
    /// cursor are replaced; with `move_cursor` the cursor ends up after the inserted text.
    pub fn insert_text(&mut self, text: &str, overwrite: bool, move_cursor: bool) {
        let at = byte_offset(&self.text, self.cursor_position);
        let inserted = text.chars().count();
        if overwrite {
            let after = &self.text[at..];
            let end = at + byte_offset(after, inserted);
            self.text.replace_range(at..end, text);
        } else {
            self.text.insert_str(at, text);
        }
        if move_cursor {
            self.cursor_position += inserted;
        }
    }

    pub fn cursor_left(&mut self, count: usize) {
        self.cursor_position = self.cursor_position.saturating_sub(count);
    }

    pub fn cursor_right(&mut self, count: usize) {
        self.cursor_position = (self.cursor_position + count).min(self.char_len());
    }

    pub fn go_line_beginning(&mut self) {
        self.cursor_position = 0;
    }

    pub fn go_line_end(&mut self) {
        self.cursor_position = self.char_len();
    }

    pub fn cursor_word_left(&mut self) {
        self.cursor_position = self.document().find_start_of_previous_word_with_space();
    }

    pub fn cursor_word_right(&mut self) {
        self.cursor_position = self.document().find_end_of_current_word_with_space();
    }

    /// Delete up to `count` characters before the cursor and return them.
    pub fn delete_before_cursor(&mut self, count: usize) -> String {
        let count = count.min(self.cursor_position);
        if count == 0 {
            return String::new();
        }
        let start = byte_offset(&self.text, self.cursor_position - count);
        let end = byte_offset(&self.text, self.cursor_position);
        let deleted = self.text[start..end].to_string();
        self.text.replace_range(start..end, "");
        self.cursor_position -= count;
        deleted
    }

    /// Delete up to `count` characters after the cursor and return them.
    pub fn delete(&mut self, count: usize) -> String {
        let start = byte_offset(&self.text, self.cursor_position);
        let after = &self.text[start..];
        let end = start + byte_offset(after, count);
        let deleted = self.text[start..end].to_string();
        self.text.replace_range(start..end, "");
        deleted
    }

    pub fn delete_word_before_cursor(&mut self) -> String {
        let word = self
            .document()
            .get_word_before_cursor_with_space()
            .chars()
            .count();
        self.delete_before_cursor(word)
    }

    pub fn kill_line_after_cursor(&mut self) -> String {
        let count = self.document().text_after_cursor().chars().count();
        self.delete(count)
    }

    pub fn kill_line_before_cursor(&mut self) -> String {
        let count = self.cursor_position;
        self.delete_before_cursor(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(text: &str) -> Buffer {
        let mut buf = Buffer::new();
        buf.insert_text(text, false, true);
        buf
    }

    #[test]
    fn insert_moves_cursor_by_characters() {
        let mut buf = buffer_with("héllo");
        assert_eq!(buf.cursor_position(), 5);
        buf.cursor_left(3);
        buf.insert_text("XY", false, true);
        assert_eq!(buf.text(), "héXYllo");
        assert_eq!(buf.cursor_position(), 4);
        buf.insert_text("__", false, false);
        assert_eq!(buf.text(), "héXY__llo");
        assert_eq!(buf.cursor_position(), 4);
    }

    #[test]
    fn overwrite_replaces_following_characters() {
        let mut buf = buffer_with("abcdef");
        buf.cursor_left(4);
        buf.insert_text("XY", true, true);
        assert_eq!(buf.text(), "abXYef");
        buf.go_line_end();
        buf.insert_text("ZZ", true, true);
        assert_eq!(buf.text(), "abXYefZZ");
    }

    #[test]
    fn delete_before_cursor_at_start_is_noop() {
        let mut buf = buffer_with("abc");
        buf.go_line_beginning();
        assert_eq!(buf.delete_before_cursor(2), "");
        assert_eq!(buf.text(), "abc");
        assert_eq!(buf.cursor_position(), 0);
    }

    #[test]
    fn delete_before_cursor_clamps_count() {
        let mut buf = buffer_with("abc");
        assert_eq!(buf.delete_before_cursor(10), "abc");
        assert_eq!(buf.text(), "");
        assert_eq!(buf.cursor_position(), 0);
    }

    #[test]
    fn delete_after_cursor() {
        let mut buf = buffer_with("abcdef");
        buf.cursor_left(3);
        assert_eq!(buf.delete(2), "de");
        assert_eq!(buf.text(), "abcf");
        assert_eq!(buf.delete(9), "f");
        assert_eq!(buf.cursor_position(), 3);
    }

    #[test]
    fn word_operations() {
        let mut buf = buffer_with("get pods  ");
        assert_eq!(buf.delete_word_before_cursor(), "pods  ");
        assert_eq!(buf.text(), "get ");

        let mut buf = buffer_with("describe pod web");
        buf.cursor_word_left();
        assert_eq!(buf.cursor_position(), 13);
        buf.cursor_word_left();
        assert_eq!(buf.cursor_position(), 9);
        buf.go_line_beginning();
        buf.cursor_word_right();
        assert_eq!(buf.cursor_position(), 8);
    }

    #[test]
    fn kill_line_halves() {
        let mut buf = buffer_with("logs -f web");
        buf.cursor_left(4);
        assert_eq!(buf.kill_line_after_cursor(), " web");
        assert_eq!(buf.text(), "logs -f");
        buf.cursor_left(3);
        assert_eq!(buf.kill_line_before_cursor(), "logs");
        assert_eq!(buf.text(), " -f");
        assert_eq!(buf.cursor_position(), 0);
    }

    #[test]
    fn cursor_stays_in_bounds_over_mixed_edits() {
        let mut buf = Buffer::new();
        let ops: [fn(&mut Buffer); 8] = [
            |b| b.insert_text("ab", false, true),
            |b| b.cursor_right(5),
            |b| {
                b.delete_before_cursor(3);
            },
            |b| b.cursor_left(7),
            |b| b.insert_text("ünï", true, true),
            |b| {
                b.delete(4);
            },
            |b| {
                b.delete_word_before_cursor();
            },
            |b| b.cursor_word_right(),
        ];
        for round in 0..40 {
            ops[round % ops.len()](&mut buf);
            ops[(round * 3 + 1) % ops.len()](&mut buf);
            let len = buf.text().chars().count();
            assert!(buf.cursor_position() <= len, "round {round}: {buf:?}");
        }
    }
}
