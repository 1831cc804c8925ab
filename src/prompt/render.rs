//! Buffer + completion state to VT100 output.
//!
//! Every frame starts by returning to the prompt origin and erasing downward, so the previous
//! frame (wrapped input rows and the dropdown beneath them) is gone before anything is drawn.
//! The origin is assumed to sit at column 0.

use std::io::{self, Write};

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::buffer::Buffer;
use super::completion::{CompletionManager, Suggestion};

const HIDE_CURSOR: &[u8] = b"\x1b[?25l";
const SHOW_CURSOR: &[u8] = b"\x1b[?25h";
const ERASE_DOWN: &[u8] = b"\x1b[J";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Default,
    Black,
    DarkRed,
    DarkGreen,
    Brown,
    DarkBlue,
    Purple,
    Cyan,
    LightGray,
    DarkGray,
    Red,
    Green,
    Yellow,
    Blue,
    Fuchsia,
    Turquoise,
    White,
}

impl Color {
    fn foreground(self) -> u8 {
        match self {
            Color::Default => 39,
            Color::Black => 30,
            Color::DarkRed => 31,
            Color::DarkGreen => 32,
            Color::Brown => 33,
            Color::DarkBlue => 34,
            Color::Purple => 35,
            Color::Cyan => 36,
            Color::LightGray => 37,
            Color::DarkGray => 90,
            Color::Red => 91,
            Color::Green => 92,
            Color::Yellow => 93,
            Color::Blue => 94,
            Color::Fuchsia => 95,
            Color::Turquoise => 96,
            Color::White => 97,
        }
    }

    fn background(self) -> u8 {
        self.foreground() + 10
    }
}

/// Colors for each part of the frame as (foreground, background) pairs.
#[derive(Debug, Clone, Copy)]
pub struct RenderStyle {
    pub prefix: Color,
    pub input: Color,
    pub preview: Color,
    pub suggestion: (Color, Color),
    pub selected_suggestion: (Color, Color),
    pub description: (Color, Color),
    pub selected_description: (Color, Color),
    pub scrollbar_thumb: Color,
    pub scrollbar_track: Color,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            prefix: Color::Blue,
            input: Color::Default,
            preview: Color::Green,
            suggestion: (Color::White, Color::Cyan),
            selected_suggestion: (Color::Black, Color::Turquoise),
            description: (Color::Black, Color::Turquoise),
            selected_description: (Color::White, Color::Cyan),
            scrollbar_thumb: Color::DarkGray,
            scrollbar_track: Color::Cyan,
        }
    }
}

fn set_color(out: &mut Vec<u8>, fg: Color, bg: Color, bold: bool) {
    let weight = if bold { 1 } else { 22 };
    let _ = write!(
        out,
        "\x1b[{weight};{};{}m",
        fg.foreground(),
        bg.background()
    );
}

fn reset_color(out: &mut Vec<u8>) {
    set_color(out, Color::Default, Color::Default, false);
}

fn cursor_up(out: &mut Vec<u8>, rows: usize) {
    if rows > 0 {
        let _ = write!(out, "\x1b[{rows}A");
    }
}

fn cursor_forward(out: &mut Vec<u8>, cols: usize) {
    if cols > 0 {
        let _ = write!(out, "\x1b[{cols}C");
    }
}

/// Truncate to `width` cells, marking the cut with "...".
fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width <= 3 {
        return ".".repeat(width);
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width - 3 {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push_str("...");
    out
}

fn pad_cell(text: &str, width: usize) -> String {
    let inner = truncate_to_width(text, width.saturating_sub(2));
    let pad = width.saturating_sub(inner.width() + 1);
    format!(" {inner}{}", " ".repeat(pad))
}

/// Lay out dropdown rows within `max_width` cells. Returns padded (text, description) cells
/// and the total row width excluding the scrollbar.
fn format_suggestions(suggestions: &[Suggestion], max_width: usize) -> (Vec<(String, String)>, usize) {
    let mut text_width = suggestions
        .iter()
        .map(|s| s.text.width() + 2)
        .max()
        .unwrap_or(0);
    let mut desc_width = suggestions
        .iter()
        .filter(|s| !s.description.is_empty())
        .map(|s| s.description.width() + 2)
        .max()
        .unwrap_or(0);

    if text_width + desc_width > max_width {
        desc_width = max_width.saturating_sub(text_width);
        if desc_width < 5 {
            desc_width = 0;
        }
        text_width = text_width.min(max_width.saturating_sub(desc_width));
    }

    let rows = suggestions
        .iter()
        .map(|s| {
            let desc = if desc_width == 0 {
                String::new()
            } else {
                pad_cell(&s.description, desc_width)
            };
            (pad_cell(&s.text, text_width), desc)
        })
        .collect();
    (rows, text_width + desc_width)
}

pub struct Renderer<W: Write> {
    out: W,
    prefix: String,
    title: Option<String>,
    style: RenderStyle,
    rows: u16,
    cols: u16,
    /// Cell offset of the cursor from the prompt origin after the last frame.
    previous_cursor: usize,
    rendered_lines: usize,
    torn_down: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, rows: u16, cols: u16) -> Self {
        Self {
            out,
            prefix: "> ".to_string(),
            title: None,
            style: RenderStyle::default(),
            rows,
            cols,
            previous_cursor: 0,
            rendered_lines: 0,
            torn_down: false,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_style(mut self, style: RenderStyle) -> Self {
        self.style = style;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Rows occupied by the last frame, dropdown included.
    pub fn rendered_lines(&self) -> usize {
        self.rendered_lines
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    fn flush(&mut self, frame: Vec<u8>) -> io::Result<()> {
        self.out.write_all(&frame)?;
        self.out.flush()
    }

    pub fn setup(&mut self) -> io::Result<()> {
        let Some(title) = self.title.as_deref() else {
            return Ok(());
        };
        let clean: String = title.chars().filter(|ch| !ch.is_control()).collect();
        let frame = format!("\x1b]2;{clean}\x07").into_bytes();
        self.flush(frame)
    }

    /// Restore cursor visibility and colors. Only the first call writes anything.
    pub fn tear_down(&mut self) -> io::Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        let mut frame = Vec::new();
        reset_color(&mut frame);
        frame.extend_from_slice(SHOW_CURSOR);
        self.flush(frame)
    }

    fn move_to_origin(&self, out: &mut Vec<u8>) {
        let cols = self.cols as usize;
        cursor_up(out, self.previous_cursor / cols);
        out.push(b'\r');
    }

    fn write_prefix(&self, out: &mut Vec<u8>) {
        set_color(out, self.style.prefix, Color::Default, false);
        out.extend_from_slice(self.prefix.as_bytes());
        reset_color(out);
    }

    pub fn render(&mut self, buf: &Buffer, completion: &CompletionManager) -> io::Result<()> {
        if self.cols == 0 {
            return Ok(());
        }
        let cols = self.cols as usize;
        let doc = buf.document();
        let prefix_width = self.prefix.width();

        let mut out = Vec::new();
        out.extend_from_slice(HIDE_CURSOR);
        self.move_to_origin(&mut out);
        out.extend_from_slice(ERASE_DOWN);
        self.write_prefix(&mut out);

        let before = doc.text_before_cursor();
        let after = doc.text_after_cursor();
        let word = doc.get_word_before_cursor_until_separator(completion.word_separator());
        let word_start = &before[..before.len() - word.len()];
        let anchor = prefix_width + word_start.width();

        let (cursor, end) = match completion.selected_suggestion() {
            Some(selected) => {
                set_color(&mut out, self.style.input, Color::Default, false);
                out.extend_from_slice(word_start.as_bytes());
                set_color(&mut out, self.style.preview, Color::Default, false);
                out.extend_from_slice(selected.text.as_bytes());
                set_color(&mut out, self.style.input, Color::Default, false);
                out.extend_from_slice(after.as_bytes());
                let cursor = anchor + selected.text.width();
                (cursor, cursor + after.width())
            }
            None => {
                set_color(&mut out, self.style.input, Color::Default, false);
                out.extend_from_slice(doc.text().as_bytes());
                (
                    prefix_width + doc.display_cursor_position(),
                    prefix_width + doc.text().width(),
                )
            }
        };
        reset_color(&mut out);
        if end > 0 && end % cols == 0 {
            out.extend_from_slice(b"\r\n");
        }
        let last_row = end / cols;

        let dropdown = self.render_completion(&mut out, completion, anchor % cols, last_row);

        out.push(b'\r');
        cursor_up(&mut out, last_row + dropdown - cursor / cols);
        cursor_forward(&mut out, cursor % cols);
        out.extend_from_slice(SHOW_CURSOR);

        self.previous_cursor = cursor;
        self.rendered_lines = last_row + 1 + dropdown;
        self.flush(out)
    }

    /// Draw the dropdown below the input. Returns the number of rows drawn.
    fn render_completion(
        &self,
        out: &mut Vec<u8>,
        completion: &CompletionManager,
        anchor_col: usize,
        input_last_row: usize,
    ) -> usize {
        let cols = self.cols as usize;
        let visible = completion.visible();
        let room = (self.rows as usize).saturating_sub(input_last_row + 1);
        let height = visible.len().min(room);
        if height == 0 || cols < 4 {
            return 0;
        }

        let max_width = cols.saturating_sub(self.prefix.width()).saturating_sub(1).max(3);
        let (formatted, width) = format_suggestions(&visible[..height], max_width);
        let width = width + 1;
        let x = anchor_col.min(cols.saturating_sub(width));

        let total = completion.suggestions().len();
        let scroll = completion.vertical_scroll();
        let thumb_height = ((height * height) / total).clamp(1, height);
        let thumb_top = (height * scroll) / total;
        let selected = completion
            .selected_index()
            .and_then(|idx| idx.checked_sub(scroll));

        for (row, (text, desc)) in formatted.iter().enumerate() {
            out.extend_from_slice(b"\r\n");
            cursor_forward(out, x);
            let is_selected = selected == Some(row);
            let (fg, bg) = if is_selected {
                self.style.selected_suggestion
            } else {
                self.style.suggestion
            };
            set_color(out, fg, bg, is_selected);
            out.extend_from_slice(text.as_bytes());
            let (fg, bg) = if is_selected {
                self.style.selected_description
            } else {
                self.style.description
            };
            set_color(out, fg, bg, false);
            out.extend_from_slice(desc.as_bytes());
            let bar = if (thumb_top..thumb_top + thumb_height).contains(&row) {
                self.style.scrollbar_thumb
            } else {
                self.style.scrollbar_track
            };
            set_color(out, Color::Default, bar, false);
            out.push(b' ');
            reset_color(out);
        }
        height
    }

    /// Redraw the accepted line without the dropdown and move to a fresh line.
    pub fn break_line(&mut self, buf: &Buffer) -> io::Result<()> {
        let mut out = Vec::new();
        if self.cols > 0 {
            self.move_to_origin(&mut out);
        }
        out.extend_from_slice(ERASE_DOWN);
        self.write_prefix(&mut out);
        set_color(&mut out, self.style.input, Color::Default, false);
        out.extend_from_slice(buf.text().as_bytes());
        reset_color(&mut out);
        out.extend_from_slice(b"\r\n");
        self.previous_cursor = 0;
        self.rendered_lines = 0;
        self.flush(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::completion::Completer;
    use crate::prompt::document::Document;

    fn manager(texts: &'static [(&'static str, &'static str)]) -> CompletionManager {
        let completer: Box<dyn Completer> = Box::new(move |_: &Document<'_>| {
            texts
                .iter()
                .map(|(text, desc)| Suggestion::new(*text, *desc))
                .collect::<Vec<_>>()
        });
        CompletionManager::new(completer, 3).with_word_separator(" /")
    }

    fn buffer_with(text: &str) -> Buffer {
        let mut buf = Buffer::new();
        buf.insert_text(text, false, true);
        buf
    }

    fn frame(renderer: &mut Renderer<Vec<u8>>) -> String {
        let text = String::from_utf8_lossy(renderer.get_ref()).into_owned();
        renderer.get_mut().clear();
        text
    }

    #[test]
    fn first_frame_writes_prefix_and_input() {
        let mut renderer = Renderer::new(Vec::new(), 24, 80).with_prefix("kubectl ");
        let completion = manager(&[]);
        renderer.render(&buffer_with("get"), &completion).unwrap();
        let out = frame(&mut renderer);
        assert!(out.contains("kubectl "));
        assert!(out.contains("get"));
        assert!(out.contains("\x1b[J"));
        assert_eq!(renderer.rendered_lines(), 1);
    }

    #[test]
    fn second_frame_returns_over_wrapped_rows() {
        let mut renderer = Renderer::new(Vec::new(), 24, 10).with_prefix("> ");
        let completion = manager(&[]);
        renderer
            .render(&buffer_with("abcdefghijklmnop"), &completion)
            .unwrap();
        assert_eq!(renderer.rendered_lines(), 2);
        frame(&mut renderer);
        renderer.render(&buffer_with("x"), &completion).unwrap();
        let out = frame(&mut renderer);
        assert!(out.starts_with("\x1b[?25l\x1b[1A\r\x1b[J"));
    }

    #[test]
    fn exact_wrap_moves_to_next_row() {
        let mut renderer = Renderer::new(Vec::new(), 24, 10).with_prefix("> ");
        let completion = manager(&[]);
        renderer.render(&buffer_with("12345678"), &completion).unwrap();
        let out = frame(&mut renderer);
        assert!(out.contains("12345678\x1b[22;39;49m\r\n"));
        assert_eq!(renderer.rendered_lines(), 2);
    }

    #[test]
    fn dropdown_is_capped_and_counted() {
        let mut renderer = Renderer::new(Vec::new(), 24, 80).with_prefix("kubectl ");
        let mut completion = manager(&[
            ("get", "Display resources"),
            ("describe", "Show details"),
            ("delete", "Delete resources"),
            ("logs", "Print logs"),
        ]);
        let buf = buffer_with("");
        completion.update(&buf.document());
        renderer.render(&buf, &completion).unwrap();
        let out = frame(&mut renderer);
        assert!(out.contains(" describe "));
        assert!(!out.contains(" logs "));
        assert_eq!(renderer.rendered_lines(), 4);
    }

    #[test]
    fn selected_suggestion_is_previewed_inline() {
        let mut renderer = Renderer::new(Vec::new(), 24, 80).with_prefix("kubectl ");
        let mut completion = manager(&[("pods", ""), ("services", "")]);
        let buf = buffer_with("get po");
        completion.update(&buf.document());
        completion.next();
        renderer.render(&buf, &completion).unwrap();
        let out = frame(&mut renderer);
        let preview = format!("\x1b[22;{};49mpods", Color::Green.foreground());
        assert!(out.contains(&preview));
    }

    #[test]
    fn break_line_resets_origin() {
        let mut renderer = Renderer::new(Vec::new(), 24, 80).with_prefix("kubectl ");
        let completion = manager(&[]);
        renderer.render(&buffer_with("get pods"), &completion).unwrap();
        frame(&mut renderer);
        renderer.break_line(&buffer_with("get pods")).unwrap();
        let out = frame(&mut renderer);
        assert!(out.ends_with("\r\n"));
        renderer.render(&Buffer::new(), &completion).unwrap();
        let out = frame(&mut renderer);
        assert!(out.starts_with("\x1b[?25l\r\x1b[J"));
    }

    #[test]
    fn tear_down_writes_once() {
        let mut renderer = Renderer::new(Vec::new(), 24, 80);
        renderer.tear_down().unwrap();
        assert!(!frame(&mut renderer).is_empty());
        renderer.tear_down().unwrap();
        assert!(frame(&mut renderer).is_empty());
    }

    #[test]
    fn title_is_set_without_control_characters() {
        let mut renderer = Renderer::new(Vec::new(), 24, 80).with_title("kube\x07prompt");
        renderer.setup().unwrap();
        assert_eq!(frame(&mut renderer), "\x1b]2;kubeprompt\x07");
    }

    #[test]
    fn truncation_marks_cut_text() {
        assert_eq!(truncate_to_width("deployments", 8), "deplo...");
        assert_eq!(truncate_to_width("pods", 8), "pods");
        assert_eq!(pad_cell("pods", 8), " pods   ");
    }
}
