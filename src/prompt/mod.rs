//! Line editor with history and completion, driven by raw terminal bytes.

mod buffer;
mod completion;
mod document;
mod history;
pub mod key;
mod keybind;
mod path_completer;
mod render;
mod session;

pub use buffer::Buffer;
pub use completion::{
    filter_contains, filter_has_prefix, filter_has_suffix, Completer, CompletionManager,
    Suggestion,
};
pub use document::Document;
pub use history::History;
pub use key::{Key, KeyDecoder, KeyPress};
pub use keybind::{AsciiCodeBind, KeyBind, KeyBindFn, KeyBindMode, KeyBindings};
pub use path_completer::{PathCompleter, FILE_PATH_SEPARATOR};
pub use render::{Color, RenderStyle, Renderer};
pub use session::{ConsoleInput, ExitChecker, ExitReason, Executor, Prompt};
