//! Live progress rendering.
//!
//! On a terminal, the tail of the work log is redrawn in place on every work event and
//! every 100 ms tick. Anywhere else, one block is printed per finished visible item.

use std::collections::HashSet;
use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use forge_engine::Workstream;
use forge_types::WorkItem;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::tail::{item_lines, render_tail, spinner};

const TICK: Duration = Duration::from_millis(100);

/// Redraws the tail of the work log in place.
pub struct Screen<W: Write> {
    out: W,
    /// Lines drawn by the previous frame; the cursor sits just below them.
    drawn: u16,
    ticks: usize,
}

impl<W: Write> Screen<W> {
    pub fn new(out: W) -> Self {
        Self { out, drawn: 0, ticks: 0 }
    }

    pub fn tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
    }

    /// Replaces the previous frame with the newest lines that fit in `width`×`height`.
    pub fn draw(&mut self, items: &[WorkItem], width: u16, height: u16) -> io::Result<()> {
        let lines = render_tail(items, usize::from(height.max(1)), spinner(self.ticks));

        queue!(self.out, MoveToColumn(0))?;
        if self.drawn > 0 {
            queue!(self.out, MoveUp(self.drawn))?;
        }
        for line in &lines {
            let clipped: String = line.chars().take(usize::from(width)).collect();
            queue!(self.out, Print(clipped), Clear(ClearType::UntilNewLine), Print("\r\n"))?;
        }
        queue!(self.out, Clear(ClearType::FromCursorDown))?;
        self.out.flush()?;

        self.drawn = u16::try_from(lines.len()).unwrap_or(u16::MAX);
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Prints each finished visible item once, in log order.
pub struct Transcript<W: Write> {
    out: W,
    printed: HashSet<u64>,
}

impl<W: Write> Transcript<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: HashSet::new(),
        }
    }

    pub fn flush_finished(&mut self, items: &[WorkItem]) -> io::Result<()> {
        for item in items {
            if !item.is_finished() || !item.visible || !self.printed.insert(item.id) {
                continue;
            }
            for line in item_lines(item, ' ') {
                writeln!(self.out, "{line}")?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

enum Output {
    Live(Screen<io::Stdout>),
    Plain(Transcript<io::Stdout>),
}

impl Output {
    fn refresh(&mut self, workstream: &Workstream) -> io::Result<()> {
        let items = workstream.items();
        match self {
            Output::Live(screen) => {
                let (width, height) = terminal::size().unwrap_or((80, 24));
                screen.draw(&items, width, height)
            }
            Output::Plain(transcript) => transcript.flush_finished(&items),
        }
    }
}

/// Background task that keeps the progress view current until stopped.
pub struct ProgressRenderer {
    stop: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl ProgressRenderer {
    /// Starts rendering `workstream` to stdout, live when stdout is a terminal.
    pub fn spawn(workstream: Workstream) -> Self {
        let output = if io::stdout().is_terminal() {
            Output::Live(Screen::new(io::stdout()))
        } else {
            Output::Plain(Transcript::new(io::stdout()))
        };
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run(workstream, output, stopped));
        Self { stop, task }
    }

    /// Draws a final frame and waits for the renderer to exit.
    pub async fn stop(self) -> Result<()> {
        // The task may already have exited on its own.
        let _ = self.stop.send(());
        self.task.await??;
        Ok(())
    }
}

async fn run(workstream: Workstream, mut output: Output, mut stopped: oneshot::Receiver<()>) -> io::Result<()> {
    let mut events = workstream.subscribe();
    let mut ticker = time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    output.refresh(&workstream)?;
    loop {
        tokio::select! {
            _ = &mut stopped => break,
            event = events.recv() => match event {
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "progress renderer lagged; redrawing from snapshot");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                if let Output::Live(screen) = &mut output {
                    screen.tick();
                }
            }
        }
        output.refresh(&workstream)?;
    }
    output.refresh(&workstream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_types::ItemKind;

    fn finished(id: u64, summary: &str, ok: bool, visible: bool) -> WorkItem {
        let mut item = WorkItem::new(id, ItemKind::Command, summary, visible, false);
        item.append("details\n");
        let code = if ok { 0 } else { 1 };
        item.finish(ok, Some(code), if ok { "ok".to_string() } else { format!("error({code})") });
        item
    }

    #[test]
    fn second_frame_moves_over_the_first() {
        let mut screen = Screen::new(Vec::new());
        let items = vec![finished(1, "docker build", true, true), finished(2, "docker push", true, true)];

        screen.draw(&items, 80, 24).expect("first frame");
        let first = String::from_utf8(screen.into_inner()).expect("utf8");
        assert!(first.contains("command[ok]: docker build"));
        assert!(first.contains("command[ok]: docker push"));

        let mut screen = Screen::new(Vec::new());
        screen.draw(&items, 80, 24).expect("first frame");
        screen.draw(&items, 80, 24).expect("second frame");
        let frames = String::from_utf8(screen.into_inner()).expect("utf8");
        // CSI 2 A: cursor up over the two lines drawn before.
        assert!(frames.contains("\u{1b}[2A"));
    }

    #[test]
    fn long_lines_are_clipped_to_the_terminal_width() {
        let mut screen = Screen::new(Vec::new());
        screen
            .draw(&[finished(1, "docker build . -t registry.example/acme/web:0123456789", true, true)], 20, 24)
            .expect("frame");
        let frame = String::from_utf8(screen.into_inner()).expect("utf8");
        assert!(frame.contains("command[ok]: docker "));
        assert!(!frame.contains("registry.example"));
    }

    #[test]
    fn transcript_prints_each_finished_item_once() {
        let mut transcript = Transcript::new(Vec::new());
        let running = WorkItem::new(3, ItemKind::Command, "kubectl apply", true, false);
        let items = vec![
            finished(1, "docker push web", true, true),
            finished(2, "GET https://r.example/v2/", false, false),
            running,
        ];

        transcript.flush_finished(&items).expect("flush");
        transcript.flush_finished(&items).expect("flush again");

        let text = String::from_utf8(transcript.into_inner()).expect("utf8");
        assert_eq!(text, "command[ok]: docker push web\n");
    }

    #[test]
    fn transcript_shows_failure_output() {
        let mut transcript = Transcript::new(Vec::new());
        transcript
            .flush_finished(&[finished(1, "docker push db", false, true)])
            .expect("flush");
        let text = String::from_utf8(transcript.into_inner()).expect("utf8");
        assert_eq!(text, "command[error(1)]: docker push db\n  details\n");
    }
}
