use crate::config::Config;
use crate::connectivity::Connectivity;
use crate::event::{Event, EventHandler};
use crate::query::Query;
use crate::repository::{MobileDataUsage, UsageRepository};
use crate::ui;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::YearlyUsageView;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::convert::Infallible;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const TICK_RATE: Duration = Duration::from_millis(250);
const CONNECTIVITY_CHECK_EVERY: Duration = Duration::from_secs(5);

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  repository: UsageRepository,

  /// Periodic reachability check for the header indicator
  online: Query<bool, Infallible>,

  api_url: String,

  should_quit: bool,
}

impl App {
  /// Must be called inside a tokio runtime; the first fetch starts immediately.
  pub fn new(
    config: &Config,
    repository: UsageRepository,
    connectivity: Arc<dyn Connectivity>,
  ) -> Self {
    let root = YearlyUsageView::new(repository.clone(), config.cache.max_age());

    let mut online = Query::new(move || {
      let connectivity = connectivity.clone();
      async move { Ok::<_, Infallible>(connectivity.is_online().await) }
    })
    .with_stale_time(CONNECTIVITY_CHECK_EVERY);
    online.fetch();

    Self {
      view_stack: vec![Box::new(root)],
      repository,
      online,
      api_url: repository_url(config),
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(TICK_RATE);
    info!(url = %self.api_url, "started");

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Restore the terminal even when drawing failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Resize => {} // Redrawn on the next loop iteration
      Event::Tick => self.tick(),
    }
  }

  fn tick(&mut self) {
    self.online.poll();
    if self.online.is_stale() {
      self.online.fetch();
    }

    for view in self.view_stack.iter_mut() {
      view.tick();
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => return,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
      ViewAction::Quit => self.should_quit = true,
    }
  }

  // Accessors for UI rendering
  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn api_url(&self) -> &str {
    &self.api_url
  }

  pub fn online(&self) -> Option<bool> {
    self.online.data().copied()
  }

  pub fn latest(&self) -> Option<Arc<MobileDataUsage>> {
    self.repository.latest()
  }

  /// Error from the root view, which owns the dataset fetch
  pub fn current_error(&self) -> Option<String> {
    self.view_stack.first().and_then(|view| view.error())
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .view_stack
      .last()
      .map(|view| view.shortcuts())
      .unwrap_or_default()
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }
}

fn repository_url(config: &Config) -> String {
  config.api.base_url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::NoopStorage;
  use crate::connectivity::FixedConnectivity;
  use crate::datastore::DatastoreClient;
  use wiremock::matchers::method;
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn app(server: &MockServer) -> App {
    let mut config = Config::default();
    config.api.base_url = format!("{}/", server.uri());
    let connectivity: Arc<dyn Connectivity> = Arc::new(FixedConnectivity(true));
    let client =
      DatastoreClient::with_storage(&config, connectivity.clone(), Arc::new(NoopStorage)).unwrap();
    App::new(&config, UsageRepository::new(client), connectivity)
  }

  async fn settle(app: &mut App) {
    for _ in 0..50 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      app.tick();
      if app.online().is_some() && app.latest().is_some() {
        // Let views pick up the published value
        app.tick();
        return;
      }
    }
  }

  #[tokio::test]
  async fn test_navigation_and_quit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_string(
        r#"{"success": true, "result": {"records": [
          {"_id": 1, "quarter": "2018-Q1", "volume_of_mobile_data": "5.0"}
        ]}}"#,
      ))
      .mount(&server)
      .await;

    let mut app = app(&server).await;
    assert_eq!(app.api_url(), server.uri());
    settle(&mut app).await;

    assert_eq!(app.online(), Some(true));
    assert!(app.latest().is_some());
    assert!(app.current_error().is_none());

    // The root view selects nothing until it is first rendered
    app.handle_key(KeyEvent::from(KeyCode::Down));
    app.handle_key(KeyEvent::from(KeyCode::Enter));
    assert_eq!(app.view_breadcrumb(), vec!["Yearly", "2018"]);

    app.handle_key(KeyEvent::from(KeyCode::Esc));
    assert_eq!(app.view_breadcrumb(), vec!["Yearly"]);
    assert!(!app.should_quit());

    app.handle_key(KeyEvent::from(KeyCode::Char('q')));
    assert!(app.should_quit());
  }

  #[tokio::test]
  async fn test_ctrl_c_quits_from_any_view() {
    let server = MockServer::start().await;
    let mut app = app(&server).await;
    app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(app.should_quit());
  }
}
