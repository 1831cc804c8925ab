use unicode_width::UnicodeWidthStr;

use super::key::Key;

/// Read-only view of the edited text. Positions are in characters, not bytes.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    text: &'a str,
    cursor_position: usize,
    last_key: Option<Key>,
}

/// Byte offset of the `index`-th character (or the end of the string).
pub(crate) fn byte_offset(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

impl<'a> Document<'a> {
    pub fn new(text: &'a str, cursor_position: usize) -> Self {
        let len = text.chars().count();
        Self {
            text,
            cursor_position: cursor_position.min(len),
            last_key: None,
        }
    }

    pub(crate) fn with_last_key(mut self, key: Option<Key>) -> Self {
        self.last_key = key;
        self
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn cursor_position(&self) -> usize {
        self.cursor_position
    }

    /// Key that produced the current state, if any.
    pub fn last_key_stroke(&self) -> Option<Key> {
        self.last_key
    }

    /// Terminal cell column of the cursor.
    pub fn display_cursor_position(&self) -> usize {
        self.text_before_cursor().width()
    }

    pub fn text_before_cursor(&self) -> &'a str {
        &self.text[..byte_offset(self.text, self.cursor_position)]
    }

    pub fn text_after_cursor(&self) -> &'a str {
        &self.text[byte_offset(self.text, self.cursor_position)..]
    }

    pub fn char_at_cursor(&self) -> Option<char> {
        self.text_after_cursor().chars().next()
    }

    /// Word before the cursor; empty when the cursor follows a space.
    pub fn get_word_before_cursor(&self) -> &'a str {
        let before = self.text_before_cursor();
        &before[self.find_start_of_previous_word_bytes()..]
    }

    /// Word before the cursor including the spaces that follow it.
    pub fn get_word_before_cursor_with_space(&self) -> &'a str {
        let before = self.text_before_cursor();
        &before[self.find_start_of_previous_word_with_space_bytes()..]
    }

    /// Word before the cursor, delimited by any character in `separators`.
    pub fn get_word_before_cursor_until_separator(&self, separators: &str) -> &'a str {
        let before = self.text_before_cursor();
        &before[self.find_start_of_previous_word_until_separator_bytes(separators)..]
    }

    pub fn get_word_after_cursor(&self) -> &'a str {
        let after = self.text_after_cursor();
        match after.find(' ') {
            Some(end) => &after[..end],
            None => after,
        }
    }

    /// Character index where the word before the cursor starts.
    pub fn find_start_of_previous_word(&self) -> usize {
        self.char_index(self.find_start_of_previous_word_bytes())
    }

    pub fn find_start_of_previous_word_until_separator(&self, separators: &str) -> usize {
        if separators.is_empty() {
            return self.find_start_of_previous_word();
        }
        self.char_index(self.find_start_of_previous_word_until_separator_bytes(separators))
    }

    /// Character index where the word before the cursor starts, skipping trailing spaces.
    pub fn find_start_of_previous_word_with_space(&self) -> usize {
        self.char_index(self.find_start_of_previous_word_with_space_bytes())
    }

    /// Character index just past the end of the word after the cursor.
    pub fn find_end_of_current_word(&self) -> usize {
        self.cursor_position + self.get_word_after_cursor().chars().count()
    }

    /// Character index past the next word, skipping leading spaces.
    pub fn find_end_of_current_word_with_space(&self) -> usize {
        let after = self.text_after_cursor();
        let leading = after.chars().take_while(|ch| *ch == ' ').count();
        let rest = &after[byte_offset(after, leading)..];
        let word = rest.find(' ').map(|end| &rest[..end]).unwrap_or(rest);
        self.cursor_position + leading + word.chars().count()
    }

    fn char_index(&self, byte: usize) -> usize {
        self.text[..byte].chars().count()
    }

    fn find_start_of_previous_word_bytes(&self) -> usize {
        let before = self.text_before_cursor();
        before.rfind(' ').map(|idx| idx + 1).unwrap_or(0)
    }

    fn find_start_of_previous_word_with_space_bytes(&self) -> usize {
        let before = self.text_before_cursor();
        let trimmed = before.trim_end_matches(' ');
        trimmed.rfind(' ').map(|idx| idx + 1).unwrap_or(0)
    }

    fn find_start_of_previous_word_until_separator_bytes(&self, separators: &str) -> usize {
        let before = self.text_before_cursor();
        if separators.is_empty() {
            return self.find_start_of_previous_word_bytes();
        }
        before
            .char_indices()
            .rev()
            .find(|(_, ch)| separators.contains(*ch))
            .map(|(idx, ch)| idx + ch.len_utf8())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_around_cursor_by_character() {
        let doc = Document::new("héllo wörld", 7);
        assert_eq!(doc.text_before_cursor(), "héllo w");
        assert_eq!(doc.text_after_cursor(), "örld");
        assert_eq!(doc.char_at_cursor(), Some('ö'));
    }

    #[test]
    fn remembers_the_last_key() {
        assert_eq!(Document::new("get", 3).last_key_stroke(), None);
        let doc = Document::new("get", 3).with_last_key(Some(Key::Tab));
        assert_eq!(doc.last_key_stroke(), Some(Key::Tab));
    }

    #[test]
    fn cursor_is_clamped_to_text_length() {
        let doc = Document::new("abc", 10);
        assert_eq!(doc.cursor_position(), 3);
        assert_eq!(doc.text_after_cursor(), "");
    }

    #[test]
    fn word_before_cursor_variants() {
        let doc = Document::new("get pods ", 9);
        assert_eq!(doc.get_word_before_cursor(), "");
        assert_eq!(doc.get_word_before_cursor_with_space(), "pods ");
        assert_eq!(doc.find_start_of_previous_word_with_space(), 4);

        let doc = Document::new("apply -f ./manifests/dep", 24);
        assert_eq!(doc.get_word_before_cursor(), "./manifests/dep");
        assert_eq!(doc.get_word_before_cursor_until_separator(" /"), "dep");
        assert_eq!(doc.find_start_of_previous_word_until_separator(" /"), 21);
        assert_eq!(doc.get_word_before_cursor_until_separator(""), "./manifests/dep");
    }

    #[test]
    fn word_after_cursor() {
        let doc = Document::new("describe pod web-0", 9);
        assert_eq!(doc.get_word_after_cursor(), "pod");
        assert_eq!(doc.find_end_of_current_word(), 12);
        let doc = Document::new("a   bc d", 1);
        assert_eq!(doc.find_end_of_current_word_with_space(), 6);
    }

    #[test]
    fn display_position_counts_wide_cells() {
        let doc = Document::new("日本x", 2);
        assert_eq!(doc.display_cursor_position(), 4);
    }
}
