//! Wrappers around various side effects.

use bstr::ByteSlice;
use std::fmt::{Display, Write};
use std::io::{self, stderr, stdout, Stderr, Stdout, Write as WriteIo};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, warn};

use crate::core::formatting::Glyphs;

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationType {
    FetchRemotes,
    PushShelf(Arc<String>),
    RunGitCommand(Arc<String>),
    VerifyRemote(Arc<String>),
}

impl Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::FetchRemotes => write!(f, "Fetching remotes"),
            OperationType::PushShelf(remote) => write!(f, "Pushing shelf to {remote}"),
            OperationType::RunGitCommand(command) => write!(f, "Running Git command: {command}"),
            OperationType::VerifyRemote(remote) => write!(f, "Checking remote {remote}"),
        }
    }
}

#[derive(Clone, Debug)]
enum OutputDest {
    Stdout,
    BufferForTest {
        stdout: Arc<Mutex<Vec<u8>>>,
        stderr: Arc<Mutex<Vec<u8>>>,
    },
}

/// The spinner currently on screen, if any. Only the outermost operation owns
/// a spinner; nested operations update its message.
type SpinnerSlot = Arc<Mutex<Option<ProgressBar>>>;

/// Wrapper around side-effectful operations, such as output and progress
/// indicators.
#[derive(Clone)]
pub struct Effects {
    glyphs: Glyphs,
    dest: OutputDest,
    operation_key: Vec<OperationType>,
    spinner: SpinnerSlot,
}

impl std::fmt::Debug for Effects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Output fancy={}>",
            self.glyphs.should_write_ansi_escape_codes
        )
    }
}

impl Effects {
    /// Constructor. Writes to stdout.
    pub fn new(glyphs: Glyphs) -> Self {
        Effects {
            glyphs,
            dest: OutputDest::Stdout,
            operation_key: Default::default(),
            spinner: Default::default(),
        }
    }

    /// Constructor. Writes to the provided buffer.
    pub fn new_from_buffer_for_test(
        glyphs: Glyphs,
        stdout: &Arc<Mutex<Vec<u8>>>,
        stderr: &Arc<Mutex<Vec<u8>>>,
    ) -> Self {
        Effects {
            glyphs,
            dest: OutputDest::BufferForTest {
                stdout: Arc::clone(stdout),
                stderr: Arc::clone(stderr),
            },
            operation_key: Default::default(),
            spinner: Default::default(),
        }
    }

    /// Start reporting progress for the specified operation type.
    ///
    /// On an attended terminal, a spinner is shown on stderr until the
    /// returned `ProgressHandle` is dropped. Output written through the
    /// returned `Effects` while the spinner is visible is printed above it.
    ///
    /// Operations nest: starting an operation while another is still alive
    /// replaces the spinner message until the inner handle is dropped.
    pub fn start_operation(&self, operation_type: OperationType) -> (Effects, ProgressHandle<'_>) {
        debug!(operation = %operation_type, "Starting operation");
        let operation_key = {
            let mut result = self.operation_key.clone();
            result.push(operation_type.clone());
            result
        };
        let effects = Effects {
            operation_key: operation_key.clone(),
            ..self.clone()
        };
        let mut progress = ProgressHandle {
            effects: self,
            operation_key,
            owns_spinner: false,
        };

        match self.dest {
            OutputDest::Stdout => {}
            OutputDest::BufferForTest { .. } => return (effects, progress),
        }
        if !console::user_attended_stderr() {
            return (effects, progress);
        }

        let mut spinner = lock_spinner(&self.spinner);
        match spinner.as_ref() {
            Some(progress_bar) => progress_bar.set_message(operation_type.to_string()),
            None => {
                let progress_bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
                match ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
                    Ok(style) => progress_bar.set_style(style),
                    Err(err) => warn!(?err, "Could not parse progress template"),
                }
                progress_bar.set_message(operation_type.to_string());
                progress_bar.enable_steady_tick(Duration::from_millis(100));
                *spinner = Some(progress_bar);
                progress.owns_spinner = true;
            }
        }
        drop(spinner);
        (effects, progress)
    }

    /// Get the set of glyphs associated with the output.
    pub fn get_glyphs(&self) -> &Glyphs {
        &self.glyphs
    }

    /// Create a stream that can be written to. The output might go to stdout or
    /// be rendered above the progress spinner.
    pub fn get_output_stream(&self) -> OutputStream {
        OutputStream {
            dest: self.dest.clone(),
            buffer: Default::default(),
            spinner: Arc::clone(&self.spinner),
        }
    }

    /// Create a stream that error output can be written to, rather than regular
    /// output.
    pub fn get_error_stream(&self) -> ErrorStream {
        ErrorStream {
            dest: self.dest.clone(),
            buffer: Default::default(),
            spinner: Arc::clone(&self.spinner),
        }
    }
}

fn lock_spinner(spinner: &SpinnerSlot) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
    // A poisoned lock only means that some writer panicked; the spinner
    // itself is still usable.
    spinner
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

trait WriteProgress {
    type Stream: WriteIo;
    fn get_stream() -> Self::Stream;
    fn get_buffer(&mut self) -> &mut String;
    fn get_spinner(&self) -> SpinnerSlot;

    /// Write out all completely-written lines. If `all` is set, also write out
    /// any trailing partial line.
    fn flush_lines(&mut self, all: bool) {
        let output = {
            let buffer = self.get_buffer();
            let split_at = if all {
                buffer.len()
            } else {
                match buffer.rfind('\n') {
                    Some(index) => index + 1,
                    None => return,
                }
            };
            let rest = buffer.split_off(split_at);
            std::mem::replace(buffer, rest)
        };
        if output.is_empty() {
            return;
        }

        let spinner = self.get_spinner();
        let spinner = lock_spinner(&spinner);
        let write_output = || {
            let mut stream = Self::get_stream();
            // Nowhere to report a failure to write to the terminal.
            let _ = write!(stream, "{output}");
            let _ = stream.flush();
        };
        match spinner.as_ref() {
            Some(progress_bar) => progress_bar.suspend(write_output),
            None => write_output(),
        }
    }
}

/// A handle to stdout, but doesn't overwrite interactive progress notifications.
pub struct OutputStream {
    dest: OutputDest,
    buffer: String,
    spinner: SpinnerSlot,
}

impl WriteProgress for OutputStream {
    type Stream = Stdout;

    fn get_stream() -> Self::Stream {
        stdout()
    }

    fn get_buffer(&mut self) -> &mut String {
        &mut self.buffer
    }

    fn get_spinner(&self) -> SpinnerSlot {
        Arc::clone(&self.spinner)
    }
}

impl Write for OutputStream {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        match &self.dest {
            OutputDest::Stdout => {
                self.buffer.push_str(s);
                self.flush_lines(false);
            }

            OutputDest::BufferForTest { stdout, stderr: _ } => {
                let mut buffer = stdout.lock().map_err(|_| std::fmt::Error)?;
                buffer.extend_from_slice(s.as_bytes());
            }
        }
        Ok(())
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.flush_lines(true);
    }
}

/// A handle to stderr, but doesn't overwrite interactive progress notifications.
pub struct ErrorStream {
    dest: OutputDest,
    buffer: String,
    spinner: SpinnerSlot,
}

impl WriteProgress for ErrorStream {
    type Stream = Stderr;

    fn get_stream() -> Self::Stream {
        stderr()
    }

    fn get_buffer(&mut self) -> &mut String {
        &mut self.buffer
    }

    fn get_spinner(&self) -> SpinnerSlot {
        Arc::clone(&self.spinner)
    }
}

impl Write for ErrorStream {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        match &self.dest {
            OutputDest::Stdout => {
                self.buffer.push_str(s);
                self.flush_lines(false);
            }

            OutputDest::BufferForTest { stdout: _, stderr } => {
                let mut buffer = stderr.lock().map_err(|_| std::fmt::Error)?;
                buffer.extend_from_slice(s.as_bytes());
            }
        }
        Ok(())
    }
}

/// You probably don't want this. This implementation is only for `tracing`'s `fmt_layer`, because
/// it needs a writer of type `io::Write`, but `Effects` normally uses its implementation of
/// `fmt::Write`.
impl io::Write for ErrorStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.dest {
            OutputDest::Stdout => {
                self.buffer.push_str(buf.to_str_lossy().as_ref());
                Ok(buf.len())
            }
            OutputDest::BufferForTest { stdout: _, stderr } => {
                let mut buffer = stderr
                    .lock()
                    .map_err(|_| io::Error::new(io::ErrorKind::Other, "poisoned buffer"))?;
                buffer.write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_lines(true);
        Ok(())
    }
}

impl Drop for ErrorStream {
    fn drop(&mut self) {
        self.flush_lines(true);
    }
}

/// A handle to an operation in progress. This object should be kept live while
/// the operation is underway.
#[derive(Debug)]
pub struct ProgressHandle<'a> {
    effects: &'a Effects,
    operation_key: Vec<OperationType>,
    owns_spinner: bool,
}

impl Drop for ProgressHandle<'_> {
    fn drop(&mut self) {
        let mut spinner = lock_spinner(&self.effects.spinner);
        if self.owns_spinner {
            if let Some(progress_bar) = spinner.take() {
                progress_bar.finish_and_clear();
            }
        } else if let Some(progress_bar) = spinner.as_ref() {
            let parent = self
                .operation_key
                .len()
                .checked_sub(2)
                .and_then(|index| self.operation_key.get(index));
            if let Some(parent) = parent {
                progress_bar.set_message(parent.to_string());
            }
        }
        debug!(operation_key = ?self.operation_key, "Finished operation");
    }
}
