use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal was resized, redraw
  Resize,
  /// Periodic tick for query polling and connectivity checks
  Tick,
}

/// Produces events from terminal input and a tick timer
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm polling blocks the thread
    tokio::task::spawn_blocking(move || loop {
      let Some(event) = next_event(tick_rate, event::poll, event::read) else {
        continue;
      };
      if tx.send(event).is_err() {
        break;
      }
    });

    Self { rx }
  }

  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

/// Wait up to `tick_rate` for terminal input. `None` means nothing worth
/// forwarding arrived.
fn next_event<P, R>(tick_rate: Duration, poll: P, read: R) -> Option<Event>
where
  P: FnOnce(Duration) -> io::Result<bool>,
  R: FnOnce() -> io::Result<CrosstermEvent>,
{
  match poll(tick_rate) {
    Ok(true) => match read() {
      Ok(CrosstermEvent::Key(key)) if key.kind == KeyEventKind::Press => Some(Event::Key(key)),
      Ok(CrosstermEvent::Resize(..)) => Some(Event::Resize),
      Ok(_) => None,
      Err(err) => {
        debug!(error = %err, "terminal read failed");
        None
      }
    },
    Ok(false) => Some(Event::Tick),
    Err(err) => {
      // poll returned without waiting; keep the tick rate
      debug!(error = %err, "terminal poll failed");
      std::thread::sleep(tick_rate);
      Some(Event::Tick)
    }
  }
}
