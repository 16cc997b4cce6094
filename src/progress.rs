use std::io::{self, IsTerminal, Write};
use std::sync::Mutex;
use std::time::Instant;

use crossterm::cursor::MoveToColumn;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;

use crate::app::{ProgressEvent, ProgressSink};

const BAR_WIDTH: usize = 30;

struct BarState {
    stage: &'static str,
    total: usize,
    current: usize,
    started: Instant,
}

/// Renders one in-place progress bar per stage on stderr when attached to a
/// terminal. Off a terminal this sink stays quiet; the per-item tracing
/// output is the progress report there.
pub struct TerminalProgress {
    state: Mutex<Option<BarState>>,
    interactive: bool,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            interactive: io::stderr().is_terminal(),
        }
    }

    fn draw(state: &BarState, postfix: &str) {
        let fraction = if state.total == 0 {
            1.0
        } else {
            state.current as f64 / state.total as f64
        };
        let filled = (fraction * BAR_WIDTH as f64).round() as usize;
        let bar: String = "#".repeat(filled) + &" ".repeat(BAR_WIDTH - filled.min(BAR_WIDTH));
        let elapsed = state.started.elapsed().as_secs();
        let line = format!(
            "{} [{}] {:3.0}% | {}/{} | {}s | {}",
            state.stage,
            bar,
            fraction * 100.0,
            state.current,
            state.total,
            elapsed,
            postfix,
        );

        let mut stderr = io::stderr();
        let _ = stderr
            .queue(MoveToColumn(0))
            .and_then(|out| out.queue(Clear(ClearType::CurrentLine)))
            .and_then(|out| out.queue(Print(line)));
        let _ = stderr.flush();
    }

    fn finish_line(&self) {
        if self.interactive {
            let mut stderr = io::stderr();
            let _ = stderr.queue(Print("\n"));
            let _ = stderr.flush();
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn event(&self, event: ProgressEvent) {
        if !self.interactive {
            return;
        }
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match event {
            ProgressEvent::StageStart { stage, total } => {
                if guard.is_some() {
                    drop(guard);
                    self.finish_line();
                    guard = self
                        .state
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                let state = BarState {
                    stage,
                    total,
                    current: 0,
                    started: Instant::now(),
                };
                Self::draw(&state, "");
                *guard = Some(state);
            }
            ProgressEvent::Tick { postfix } => {
                if let Some(state) = guard.as_mut() {
                    state.current += 1;
                    Self::draw(state, &postfix);
                }
            }
        }
    }
}
