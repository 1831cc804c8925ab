//! Suggestion window: filtering, cycling and selection.

use super::document::Document;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Suggestion {
    pub text: String,
    pub description: String,
}

impl Suggestion {
    pub fn new(text: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            description: description.into(),
        }
    }
}

/// Produces suggestions for the current document.
pub trait Completer: Send {
    fn complete(&self, doc: &Document<'_>) -> Vec<Suggestion>;
}

impl<F> Completer for F
where
    F: Fn(&Document<'_>) -> Vec<Suggestion> + Send,
{
    fn complete(&self, doc: &Document<'_>) -> Vec<Suggestion> {
        self(doc)
    }
}

fn filter_by(
    suggestions: Vec<Suggestion>,
    sub: &str,
    ignore_case: bool,
    matches: fn(&str, &str) -> bool,
) -> Vec<Suggestion> {
    if sub.is_empty() {
        return suggestions;
    }
    if ignore_case {
        let sub = sub.to_uppercase();
        suggestions
            .into_iter()
            .filter(|s| matches(&s.text.to_uppercase(), &sub))
            .collect()
    } else {
        suggestions
            .into_iter()
            .filter(|s| matches(&s.text, sub))
            .collect()
    }
}

/// Keep suggestions whose text starts with `prefix`, preserving order.
pub fn filter_has_prefix(
    suggestions: Vec<Suggestion>,
    prefix: &str,
    ignore_case: bool,
) -> Vec<Suggestion> {
    filter_by(suggestions, prefix, ignore_case, |text, sub| {
        text.starts_with(sub)
    })
}

pub fn filter_has_suffix(
    suggestions: Vec<Suggestion>,
    suffix: &str,
    ignore_case: bool,
) -> Vec<Suggestion> {
    filter_by(suggestions, suffix, ignore_case, |text, sub| text.ends_with(sub))
}

pub fn filter_contains(
    suggestions: Vec<Suggestion>,
    sub: &str,
    ignore_case: bool,
) -> Vec<Suggestion> {
    filter_by(suggestions, sub, ignore_case, |text, sub| text.contains(sub))
}

/// Current suggestion list and the selection cursor over it.
pub struct CompletionManager {
    completer: Box<dyn Completer>,
    suggestions: Vec<Suggestion>,
    /// `None` means nothing selected.
    selected: Option<usize>,
    max_visible: u16,
    vertical_scroll: usize,
    word_separator: String,
    show_at_start: bool,
}

impl CompletionManager {
    pub fn new(completer: Box<dyn Completer>, max_visible: u16) -> Self {
        Self {
            completer,
            suggestions: Vec::new(),
            selected: None,
            max_visible: max_visible.max(1),
            vertical_scroll: 0,
            word_separator: String::new(),
            show_at_start: false,
        }
    }

    pub fn with_word_separator(mut self, separator: impl Into<String>) -> Self {
        self.word_separator = separator.into();
        self
    }

    pub fn with_show_at_start(mut self, show: bool) -> Self {
        self.show_at_start = show;
        self
    }

    pub fn word_separator(&self) -> &str {
        &self.word_separator
    }

    pub fn show_at_start(&self) -> bool {
        self.show_at_start
    }

    pub fn max_visible(&self) -> u16 {
        self.max_visible
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn vertical_scroll(&self) -> usize {
        self.vertical_scroll
    }

    /// Whether a suggestion is currently selected.
    pub fn completing(&self) -> bool {
        self.selected.is_some()
    }

    pub fn selected_suggestion(&self) -> Option<&Suggestion> {
        self.selected.and_then(|idx| self.suggestions.get(idx))
    }

    /// Recompute suggestions. The selection survives only when the list is unchanged, which
    /// keeps Tab cycling stable across re-renders.
    pub fn update(&mut self, doc: &Document<'_>) {
        let next = self.completer.complete(doc);
        if next != self.suggestions {
            self.suggestions = next;
            self.selected = None;
            self.vertical_scroll = 0;
        }
    }

    /// Clear suggestions and selection.
    pub fn reset(&mut self) {
        self.suggestions.clear();
        self.selected = None;
        self.vertical_scroll = 0;
    }

    fn visible_rows(&self) -> usize {
        self.suggestions.len().min(self.max_visible as usize)
    }

    /// Select the next suggestion; past the last one the selection returns to none.
    pub fn next(&mut self) {
        if self.suggestions.is_empty() {
            return;
        }
        let next = self.selected.map_or(0, |idx| idx + 1);
        if next >= self.suggestions.len() {
            self.selected = None;
            self.vertical_scroll = 0;
            return;
        }
        if next >= self.vertical_scroll + self.visible_rows() {
            self.vertical_scroll = next + 1 - self.visible_rows();
        }
        self.selected = Some(next);
    }

    /// Select the previous suggestion; before the first one the selection returns to none, and
    /// from none it wraps to the last entry.
    pub fn previous(&mut self) {
        if self.suggestions.is_empty() {
            return;
        }
        match self.selected {
            None => {
                let last = self.suggestions.len() - 1;
                self.selected = Some(last);
                self.vertical_scroll = self.suggestions.len() - self.visible_rows();
            }
            Some(0) => {
                self.selected = None;
                self.vertical_scroll = 0;
            }
            Some(idx) => {
                let prev = idx - 1;
                if prev < self.vertical_scroll {
                    self.vertical_scroll = prev;
                }
                self.selected = Some(prev);
            }
        }
    }

    /// Rows currently inside the visible window.
    pub fn visible(&self) -> &[Suggestion] {
        let end = (self.vertical_scroll + self.visible_rows()).min(self.suggestions.len());
        &self.suggestions[self.vertical_scroll..end]
    }
}
