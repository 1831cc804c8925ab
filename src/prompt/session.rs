//! The editing loop: input chunks in, key handling, rendering, and executor dispatch.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};

use super::buffer::Buffer;
use super::completion::CompletionManager;
use super::history::History;
use super::key::{Key, KeyDecoder, KeyPress};
use super::keybind::{AsciiCodeBind, KeyBind, KeyBindMode, KeyBindings};
use super::render::Renderer;
use crate::cancel::CancelToken;
use crate::telemetry::content_logging_enabled;

const INPUT_POLL: Duration = Duration::from_millis(50);

/// Blocking source of raw input chunks.
pub trait ConsoleInput: Send + Sync {
    /// Wait up to `timeout` for the next chunk. `Ok(None)` means nothing arrived in time;
    /// an error means the source is gone for good.
    fn read_chunk(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>>;
}

/// Runs an accepted line. Failures are reported to the user by the executor itself.
pub trait Executor: Send {
    fn execute(&mut self, cancel: &CancelToken, command: &str);
}

impl<F> Executor for F
where
    F: FnMut(&CancelToken, &str) + Send,
{
    fn execute(&mut self, cancel: &CancelToken, command: &str) {
        self(cancel, command)
    }
}

/// `(text, breakline)`: called after every edit with `false` and after every execution with
/// `true`. Returning true ends the loop.
pub type ExitChecker = Box<dyn Fn(&str, bool) -> bool + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Cancelled,
    ExitRequested,
    TransportClosed,
}

enum Feed {
    Continue,
    Exit,
    Execute(String),
}

type ReadResult = io::Result<Vec<u8>>;

/// Background reader forwarding chunks through a single-slot channel.
struct InputReader {
    stop: Arc<AtomicBool>,
    chunks: Receiver<ReadResult>,
    handle: Option<JoinHandle<Option<ReadResult>>>,
}

impl InputReader {
    fn spawn(input: Arc<dyn ConsoleInput>, poll: Duration) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded(1);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("prompt-input".into())
            .spawn(move || read_loop(input.as_ref(), &thread_stop, &tx, poll))?;
        Ok(Self {
            stop,
            chunks: rx,
            handle: Some(handle),
        })
    }

    /// Stop the thread and hand back chunks it read but the loop never consumed, oldest first.
    fn stop(&mut self) -> Vec<Vec<u8>> {
        self.stop.store(true, Ordering::Release);
        let leftover = self
            .handle
            .take()
            .and_then(|handle| handle.join().ok())
            .flatten();
        let mut pending = Vec::new();
        while let Ok(msg) = self.chunks.try_recv() {
            if let Ok(chunk) = msg {
                pending.push(chunk);
            }
        }
        if let Some(Ok(chunk)) = leftover {
            pending.push(chunk);
        }
        pending
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn read_loop(
    input: &dyn ConsoleInput,
    stop: &AtomicBool,
    tx: &Sender<ReadResult>,
    poll: Duration,
) -> Option<ReadResult> {
    loop {
        if stop.load(Ordering::Acquire) {
            return None;
        }
        let mut msg = match input.read_chunk(poll) {
            Ok(None) => continue,
            // A lone NUL is what some clients send as a heartbeat.
            Ok(Some(chunk)) if chunk.is_empty() || chunk == [0] => continue,
            Ok(Some(chunk)) => Ok(chunk),
            Err(err) => Err(err),
        };
        let failed = msg.is_err();
        loop {
            match tx.send_timeout(msg, poll) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(back)) => {
                    if stop.load(Ordering::Acquire) {
                        return Some(back);
                    }
                    msg = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return None,
            }
        }
        if failed {
            return None;
        }
    }
}

enum Next {
    Chunk(Vec<u8>),
    Cancelled,
    Closed,
}

pub struct Prompt<W: Write> {
    input: Arc<dyn ConsoleInput>,
    buf: Buffer,
    renderer: Renderer<W>,
    executor: Box<dyn Executor>,
    history: History,
    completion: CompletionManager,
    bindings: KeyBindings,
    completion_on_down: bool,
    exit_checker: Option<ExitChecker>,
    poll: Duration,
    backlog: VecDeque<Vec<u8>>,
    decoder: KeyDecoder,
}

impl<W: Write> Prompt<W> {
    pub fn new(
        input: Arc<dyn ConsoleInput>,
        renderer: Renderer<W>,
        executor: impl Executor + 'static,
        completion: CompletionManager,
    ) -> Self {
        Self {
            input,
            buf: Buffer::new(),
            renderer,
            executor: Box::new(executor),
            history: History::new(),
            completion,
            bindings: KeyBindings::new(KeyBindMode::Common),
            completion_on_down: false,
            exit_checker: None,
            poll: INPUT_POLL,
            backlog: VecDeque::new(),
            decoder: KeyDecoder::new(),
        }
    }

    pub fn with_key_bind_mode(mut self, mode: KeyBindMode) -> Self {
        self.bindings = KeyBindings::new(mode);
        self
    }

    pub fn with_key_bind(mut self, bind: KeyBind) -> Self {
        self.bindings.add(bind);
        self
    }

    pub fn with_ascii_code_bind(mut self, bind: AsciiCodeBind) -> Self {
        self.bindings.add_ascii(bind);
        self
    }

    /// Let Down open the dropdown selection even when nothing is selected yet.
    pub fn with_completion_on_down(mut self, enabled: bool) -> Self {
        self.completion_on_down = enabled;
        self
    }

    pub fn with_exit_checker(mut self, checker: impl Fn(&str, bool) -> bool + Send + 'static) -> Self {
        self.exit_checker = Some(Box::new(checker));
        self
    }

    pub fn with_history(mut self, entries: &[String]) -> Self {
        for entry in entries {
            self.history.add(entry);
        }
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buf
    }

    /// Run until cancelled, an exit is requested, or the input goes away.
    pub fn run(&mut self, cancel: &CancelToken) -> ExitReason {
        self.start(cancel, None)
    }

    /// Execute `command` as if typed, then continue like [`Prompt::run`].
    pub fn run_preset(&mut self, cancel: &CancelToken, command: &str) -> ExitReason {
        self.start(cancel, Some(command))
    }

    fn start(&mut self, cancel: &CancelToken, preset: Option<&str>) -> ExitReason {
        let reason = self.start_inner(cancel, preset);
        if let Err(err) = self.renderer.tear_down() {
            tracing::debug!(error = %err, "renderer teardown failed");
        }
        tracing::debug!(?reason, "prompt loop finished");
        reason
    }

    fn start_inner(&mut self, cancel: &CancelToken, preset: Option<&str>) -> ExitReason {
        if self.renderer.setup().is_err() {
            return ExitReason::TransportClosed;
        }
        if self.completion.show_at_start() {
            self.completion.update(&self.buf.document());
        }
        if let Some(command) = preset {
            self.log_command(command);
            self.executor.execute(cancel, command);
            self.completion.update(&self.buf.document());
        }
        if self.render().is_err() {
            return ExitReason::TransportClosed;
        }
        if cancel.is_cancelled() {
            return ExitReason::Cancelled;
        }
        self.event_loop(cancel)
    }

    fn spawn_reader(&self) -> Option<InputReader> {
        match InputReader::spawn(Arc::clone(&self.input), self.poll) {
            Ok(reader) => Some(reader),
            Err(err) => {
                tracing::warn!(error = %err, "failed to spawn input reader");
                None
            }
        }
    }

    fn event_loop(&mut self, cancel: &CancelToken) -> ExitReason {
        let Some(mut reader) = self.spawn_reader() else {
            return ExitReason::TransportClosed;
        };

        loop {
            let next = match self.backlog.pop_front() {
                Some(chunk) if !cancel.is_cancelled() => Next::Chunk(chunk),
                Some(_) => Next::Cancelled,
                None => select! {
                    recv(cancel.done()) -> _ => Next::Cancelled,
                    recv(reader.chunks) -> msg => match msg {
                        Ok(Ok(chunk)) => Next::Chunk(chunk),
                        Ok(Err(err)) => {
                            tracing::debug!(error = %err, "input closed");
                            Next::Closed
                        }
                        Err(_) => Next::Closed,
                    },
                },
            };
            let chunk = match next {
                Next::Chunk(chunk) => chunk,
                Next::Cancelled => {
                    reader.stop();
                    return ExitReason::Cancelled;
                }
                Next::Closed => {
                    reader.stop();
                    return ExitReason::TransportClosed;
                }
            };

            let mut presses = self.decoder.decode(&chunk).into_iter();
            let mut executed = false;
            while let Some(press) = presses.next() {
                match self.feed(&press) {
                    Feed::Continue => {}
                    Feed::Exit => {
                        reader.stop();
                        let _ = self.renderer.break_line(&self.buf);
                        return ExitReason::ExitRequested;
                    }
                    Feed::Execute(command) => {
                        // No reads may race the executor; it may take over the input itself.
                        let pending = reader.stop();
                        let mut rest: Vec<u8> = presses.by_ref().flat_map(|p| p.bytes).collect();
                        rest.extend(self.decoder.take_pending());
                        if !rest.is_empty() {
                            self.backlog.push_front(rest);
                        }
                        self.backlog.extend(pending);

                        self.log_command(&command);
                        self.executor.execute(cancel, &command);
                        self.completion.update(&self.buf.document());
                        if self.render().is_err() {
                            return ExitReason::TransportClosed;
                        }
                        if self.check_exit(&command, true) {
                            return ExitReason::ExitRequested;
                        }
                        if cancel.is_cancelled() {
                            return ExitReason::Cancelled;
                        }
                        reader = match self.spawn_reader() {
                            Some(reader) => reader,
                            None => return ExitReason::TransportClosed,
                        };
                        executed = true;
                        break;
                    }
                }
            }
            if !executed {
                self.completion.update(&self.buf.document());
                if self.render().is_err() {
                    reader.stop();
                    return ExitReason::TransportClosed;
                }
            }
        }
    }

    fn log_command(&self, command: &str) {
        if content_logging_enabled() {
            tracing::debug!(command, "executing");
        } else {
            tracing::debug!(len = command.len(), "executing");
        }
    }

    fn render(&mut self) -> io::Result<()> {
        self.renderer
            .render(&self.buf, &self.completion)
            .inspect_err(|err| tracing::debug!(error = %err, "render failed"))
    }

    fn check_exit(&self, text: &str, breakline: bool) -> bool {
        self.exit_checker
            .as_ref()
            .is_some_and(|checker| checker(text, breakline))
    }

    fn handle_completion_key(&mut self, key: Key, completing: bool) {
        match key {
            Key::Down => {
                if completing || self.completion_on_down {
                    self.completion.next();
                }
            }
            Key::Tab => self.completion.next(),
            Key::Up => {
                if completing {
                    self.completion.previous();
                }
            }
            Key::BackTab => self.completion.previous(),
            _ => {
                if let Some(selected) = self.completion.selected_suggestion() {
                    let text = selected.text.clone();
                    let word = self
                        .buf
                        .document()
                        .get_word_before_cursor_until_separator(self.completion.word_separator())
                        .chars()
                        .count();
                    if word > 0 {
                        self.buf.delete_before_cursor(word);
                    }
                    self.buf.insert_text(&text, false, true);
                }
                self.completion.reset();
            }
        }
    }

    fn feed(&mut self, press: &KeyPress) -> Feed {
        let key = press.key;
        self.buf.set_last_key(key);
        let completing = self.completion.completing();
        self.handle_completion_key(key, completing);

        let mut exec = None;
        match key {
            Key::Enter => {
                let _ = self.renderer.break_line(&self.buf);
                let input = std::mem::take(&mut self.buf).text().to_string();
                if !input.is_empty() {
                    self.history.add(&input);
                    exec = Some(input);
                }
            }
            Key::ControlC => {
                let _ = self.renderer.break_line(&self.buf);
                self.buf = Buffer::new();
                self.history.clear();
            }
            Key::Up | Key::ControlP if !completing => {
                if let Some(buf) = self.history.older(&self.buf) {
                    self.buf = buf;
                }
            }
            Key::Down | Key::ControlN if !completing => {
                if let Some(buf) = self.history.newer(&self.buf) {
                    self.buf = buf;
                }
                return Feed::Continue;
            }
            Key::ControlD if self.buf.text().is_empty() => return Feed::Exit,
            Key::NotDefined => {
                if self.bindings.apply_ascii(&press.bytes, &mut self.buf) {
                    return Feed::Continue;
                }
                self.buf.insert_text(&press.text(), false, true);
            }
            _ => {}
        }

        self.bindings.apply(key, &mut self.buf);
        if self.check_exit(self.buf.text(), false) {
            return Feed::Exit;
        }
        match exec {
            Some(command) => Feed::Execute(command),
            None => Feed::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::completion::{filter_has_prefix, Completer, Suggestion};
    use crate::prompt::document::Document;
    use crossbeam_channel::{unbounded, RecvTimeoutError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    struct ScriptedInput {
        rx: Receiver<Vec<u8>>,
    }

    impl ConsoleInput for ScriptedInput {
        fn read_chunk(&self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
            match self.rx.recv_timeout(timeout) {
                Ok(chunk) => Ok(Some(chunk)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"))
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedOutput {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn no_completion() -> CompletionManager {
        let completer: Box<dyn Completer> = Box::new(|_: &Document<'_>| Vec::new());
        CompletionManager::new(completer, 6)
    }

    fn verb_completion() -> CompletionManager {
        let completer: Box<dyn Completer> = Box::new(|doc: &Document<'_>| {
            let all = vec![Suggestion::new("pods", ""), Suggestion::new("services", "")];
            let word = doc.get_word_before_cursor();
            if word.is_empty() {
                return Vec::new();
            }
            filter_has_prefix(all, word, false)
        });
        CompletionManager::new(completer, 6).with_word_separator(" /")
    }

    struct Harness {
        tx: Sender<Vec<u8>>,
        commands: Arc<Mutex<Vec<String>>>,
        prompt: Prompt<SharedOutput>,
    }

    fn harness(completion: CompletionManager) -> Harness {
        let (tx, rx) = unbounded();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&commands);
        let executor = move |_: &CancelToken, command: &str| {
            recorded.lock().unwrap().push(command.to_string());
        };
        let renderer = Renderer::new(SharedOutput::default(), 24, 80).with_prefix("kubectl ");
        let prompt = Prompt::new(Arc::new(ScriptedInput { rx }), renderer, executor, completion);
        Harness {
            tx,
            commands,
            prompt,
        }
    }

    fn send(tx: &Sender<Vec<u8>>, chunks: &[&[u8]]) {
        for chunk in chunks {
            tx.send(chunk.to_vec()).unwrap();
        }
    }

    #[test]
    fn enter_executes_and_ctrl_d_exits() {
        let mut h = harness(no_completion());
        send(&h.tx, &[b"get pods\n", b"\x04"]);
        let reason = h.prompt.run(&CancelToken::new());
        assert_eq!(reason, ExitReason::ExitRequested);
        assert_eq!(*h.commands.lock().unwrap(), vec!["get pods"]);
        assert_eq!(h.prompt.history().entries(), ["get pods".to_string()]);
    }

    #[test]
    fn keystrokes_after_enter_in_one_chunk_are_kept() {
        let mut h = harness(no_completion());
        send(&h.tx, &[b"get ns\r\ndescribe ns\r\n\x04"]);
        assert_eq!(h.prompt.run(&CancelToken::new()), ExitReason::ExitRequested);
        assert_eq!(*h.commands.lock().unwrap(), vec!["get ns", "describe ns"]);
    }

    #[test]
    fn character_split_across_chunks_is_not_mangled() {
        let mut h = harness(no_completion());
        let bytes = "get ns ü".as_bytes();
        let (head, tail) = bytes.split_at(bytes.len() - 1);
        send(&h.tx, &[head, tail, b"\n", b"\x04"]);
        h.prompt.run(&CancelToken::new());
        assert_eq!(*h.commands.lock().unwrap(), vec!["get ns ü"]);
    }

    #[test]
    fn empty_enter_does_not_execute() {
        let mut h = harness(no_completion());
        send(&h.tx, &[b"\r", b"\r", b"\x04"]);
        assert_eq!(h.prompt.run(&CancelToken::new()), ExitReason::ExitRequested);
        assert!(h.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn history_recall_with_arrow_keys() {
        let mut h = harness(no_completion());
        send(&h.tx, &[b"a\n", b"b\n", b"\x1b[A", b"\x1b[A", b"\n", b"\x04"]);
        h.prompt.run(&CancelToken::new());
        assert_eq!(*h.commands.lock().unwrap(), vec!["a", "b", "a"]);
    }

    #[test]
    fn ctrl_c_discards_line_and_history() {
        let mut h = harness(no_completion());
        send(&h.tx, &[b"get pods\n", b"delete pod web\x03", b"\x1b[A", b"\x04"]);
        h.prompt.run(&CancelToken::new());
        assert_eq!(*h.commands.lock().unwrap(), vec!["get pods"]);
        assert!(h.prompt.history().entries().is_empty());
        assert_eq!(h.prompt.buffer().text(), "");
    }

    #[test]
    fn ctrl_d_with_text_does_not_exit() {
        let mut h = harness(no_completion());
        send(&h.tx, &[b"abc", b"\x04", b"\x7f\x7f\x7f", b"\x04"]);
        assert_eq!(h.prompt.run(&CancelToken::new()), ExitReason::ExitRequested);
    }

    #[test]
    fn tab_selection_replaces_word_on_next_key() {
        let mut h = harness(verb_completion());
        send(&h.tx, &[b"get po", b"\t", b" ", b"\n", b"\x04"]);
        h.prompt.run(&CancelToken::new());
        assert_eq!(*h.commands.lock().unwrap(), vec!["get pods "]);
    }

    #[test]
    fn preset_runs_before_input() {
        let mut h = harness(no_completion());
        send(&h.tx, &[b"get ns\n", b"\x04"]);
        h.prompt.run_preset(&CancelToken::new(), "logs web-0");
        assert_eq!(*h.commands.lock().unwrap(), vec!["logs web-0", "get ns"]);
        assert_eq!(h.prompt.history().entries(), ["get ns".to_string()]);
    }

    #[test]
    fn exit_checker_after_execution() {
        let Harness {
            tx,
            commands,
            prompt,
        } = harness(no_completion());
        let mut prompt = prompt.with_exit_checker(|text, breakline| breakline && text == "exit");
        send(&tx, &[b"exit\n"]);
        assert_eq!(prompt.run(&CancelToken::new()), ExitReason::ExitRequested);
        assert_eq!(*commands.lock().unwrap(), vec!["exit"]);
    }

    #[test]
    fn closed_input_ends_loop() {
        let Harness {
            tx,
            commands,
            mut prompt,
        } = harness(no_completion());
        send(&tx, &[b"get pods\n"]);
        drop(tx);
        assert_eq!(prompt.run(&CancelToken::new()), ExitReason::TransportClosed);
        assert_eq!(*commands.lock().unwrap(), vec!["get pods"]);
    }

    #[test]
    fn cancellation_stops_blocked_loop() {
        let Harness { tx, mut prompt, .. } = harness(no_completion());
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });
        let started = Instant::now();
        assert_eq!(prompt.run(&cancel), ExitReason::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();
        drop(tx);
    }

    #[test]
    fn seeded_history_is_recalled() {
        let Harness {
            tx,
            commands,
            prompt,
        } = harness(no_completion());
        let mut prompt = prompt.with_history(&["get ns".to_string()]);
        send(&tx, &[b"\x1b[A", b"\n", b"\x04"]);
        prompt.run(&CancelToken::new());
        assert_eq!(*commands.lock().unwrap(), vec!["get ns"]);
    }

    #[test]
    fn down_opens_selection_only_when_enabled() {
        let mut h = harness(verb_completion());
        send(&h.tx, &[b"get po", b"\x1b[B", b" ", b"\n", b"\x04"]);
        h.prompt.run(&CancelToken::new());
        assert_eq!(*h.commands.lock().unwrap(), vec!["get po "]);

        let Harness {
            tx,
            commands,
            prompt,
        } = harness(verb_completion());
        let mut prompt = prompt.with_completion_on_down(true);
        send(&tx, &[b"get po", b"\x1b[B", b" ", b"\n", b"\x04"]);
        prompt.run(&CancelToken::new());
        assert_eq!(*commands.lock().unwrap(), vec!["get pods "]);
    }

    #[test]
    fn show_at_start_completes_before_first_key() {
        fn counting(show: bool) -> (CompletionManager, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);
            let completer: Box<dyn Completer> = Box::new(move |_: &Document<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            });
            (CompletionManager::new(completer, 6).with_show_at_start(show), calls)
        }

        for (show, expected) in [(false, 0), (true, 1)] {
            let (completion, calls) = counting(show);
            let mut h = harness(completion);
            send(&h.tx, &[b"\x04"]);
            assert_eq!(h.prompt.run(&CancelToken::new()), ExitReason::ExitRequested);
            assert_eq!(calls.load(Ordering::SeqCst), expected, "show_at_start={show}");
        }
    }

    #[test]
    fn caller_bindings_run_on_their_keys() {
        let Harness {
            tx,
            commands,
            prompt,
        } = harness(no_completion());
        let mut prompt = prompt
            .with_key_bind(KeyBind::new(Key::ControlG, |buf| {
                buf.insert_text("get ", false, true)
            }))
            .with_ascii_code_bind(AsciiCodeBind::new(b"\x1bb", Buffer::cursor_word_left));
        send(&tx, &[b"\x07", b"pods", b"\x1bb", b"-A ", b"\n", b"\x04"]);
        prompt.run(&CancelToken::new());
        assert_eq!(*commands.lock().unwrap(), vec!["get -A pods"]);
    }

    #[test]
    fn emacs_mode_applies_control_bindings() {
        let Harness {
            tx,
            commands,
            prompt,
        } = harness(no_completion());
        let mut prompt = prompt.with_key_bind_mode(KeyBindMode::Emacs);
        send(&tx, &[b"pods", b"\x01", b"get ", b"\n", b"\x04"]);
        prompt.run(&CancelToken::new());
        assert_eq!(*commands.lock().unwrap(), vec!["get pods"]);
    }
}
