use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};
use tokio::sync::watch;
use tracing::warn;

use crate::datastore::{FetchError, YearUsage};
use crate::query::{Query, QueryState};
use crate::repository::{MobileDataUsage, UsageRepository};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{decrease_color, format_volume};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::YearDetailView;

/// Root view: total mobile data volume per year
pub struct YearlyUsageView {
  query: Query<Arc<MobileDataUsage>, FetchError>,
  latest: watch::Receiver<Option<Arc<MobileDataUsage>>>,
  shown: Option<Arc<MobileDataUsage>>,
  table_state: TableState,
}

impl YearlyUsageView {
  /// Starts the first fetch immediately. Must be called inside a tokio runtime.
  pub fn new(repository: UsageRepository, refresh_after: Duration) -> Self {
    let latest = repository.subscribe();
    let shown = latest.borrow().clone();

    let mut query = Query::new(move || {
      let repository = repository.clone();
      async move { repository.refresh().await }
    })
    .with_stale_time(refresh_after);
    query.fetch();

    Self {
      query,
      latest,
      shown,
      table_state: TableState::default(),
    }
  }

  fn years(&self) -> &[YearUsage] {
    self
      .shown
      .as_ref()
      .map(|usage| usage.yearly.years.as_slice())
      .unwrap_or(&[])
  }

  fn move_selection(&mut self, delta: i32) {
    let len = self.years().len();
    if len == 0 {
      return;
    }
    let current = self.table_state.selected().unwrap_or(0);
    let next = (current as i32 + delta).rem_euclid(len as i32) as usize;
    self.table_state.select(Some(next));
  }

  fn title(&self) -> String {
    match self.query.state() {
      QueryState::Loading => " Mobile data usage (loading...) ".to_string(),
      QueryState::Error(e) => format!(" Mobile data usage ({}) ", e.message()),
      QueryState::Cancelled => " Mobile data usage (cancelled) ".to_string(),
      _ => format!(" Mobile data usage ({} years) ", self.years().len()),
    }
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.years().len();
    ensure_valid_selection(&mut self.table_state, len);

    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 {
      let content = match self.query.state() {
        QueryState::Loading | QueryState::Idle => "Loading...",
        QueryState::Error(_) | QueryState::Cancelled => "Failed to load data. Press 'r' to retry.",
        QueryState::Success(_) => "No records found.",
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let rows: Vec<Row> = self
      .years()
      .iter()
      .map(|year| {
        let color = decrease_color(year.has_decrease);
        Row::new(vec![
          Cell::from(year.year.to_string()).style(Style::default().fg(Color::Cyan)),
          Cell::from(format_volume(year.total_volume)).style(Style::default().fg(color)),
          Cell::from(year.quarters.len().to_string()),
          Cell::from(if year.has_decrease { "▼ decrease" } else { "" })
            .style(Style::default().fg(Color::Red)),
        ])
      })
      .collect();

    let header = Row::new(vec!["Year", "Total (PB)", "Quarters", ""])
      .style(Style::default().fg(Color::Yellow).bold());

    let table = Table::new(
      rows,
      [
        Constraint::Length(6),
        Constraint::Length(14),
        Constraint::Length(9),
        Constraint::Min(10),
      ],
    )
    .header(header)
    .block(block)
    .row_highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut self.table_state);
  }
}

impl View for YearlyUsageView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
      KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Enter => {
        if let Some(year) = self
          .table_state
          .selected()
          .and_then(|idx| self.years().get(idx))
        {
          return ViewAction::Push(Box::new(YearDetailView::new(year.clone())));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Quit,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_table(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Yearly".to_string()
  }

  fn tick(&mut self) {
    if self.query.poll() {
      if let Some(err) = self.query.error() {
        warn!(category = ?err.category, status = ?err.status, "refresh failed: {}", err);
      }
    }

    if self.latest.has_changed().unwrap_or(false) {
      self.shown = self.latest.borrow_and_update().clone();
    }

    if self.query.is_stale() {
      self.query.fetch();
    }
  }

  fn error(&self) -> Option<String> {
    self.query.error().map(|e| e.message().to_string())
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("j/k", "nav").with_priority(10),
      ShortcutInfo::new("enter", "quarters").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(30),
      ShortcutInfo::new("q", "quit").with_priority(40),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::NoopStorage;
  use crate::config::Config;
  use crate::connectivity::FixedConnectivity;
  use crate::datastore::{DatastoreClient, ErrorCategory};
  use wiremock::matchers::method;
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn repository(server: &MockServer) -> UsageRepository {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    let client = DatastoreClient::with_storage(
      &config,
      Arc::new(FixedConnectivity(true)),
      Arc::new(NoopStorage),
    )
    .unwrap();
    UsageRepository::new(client)
  }

  async fn wait_for_result(view: &mut YearlyUsageView) {
    for _ in 0..100 {
      view.tick();
      if !view.query.is_loading() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("query did not finish");
  }

  #[tokio::test]
  async fn test_loads_and_opens_year() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_string(
        r#"{"success": true, "result": {"records": [
          {"_id": 1, "quarter": "2015-Q1", "volume_of_mobile_data": "3.0"},
          {"_id": 2, "quarter": "2016-Q1", "volume_of_mobile_data": "4.0"}
        ]}}"#,
      ))
      .mount(&server)
      .await;

    let repo = repository(&server).await;
    let mut view = YearlyUsageView::new(repo, Duration::from_secs(60));
    wait_for_result(&mut view).await;

    assert_eq!(view.years().len(), 2);
    assert!(view.error().is_none());

    view.move_selection(1);
    match view.handle_key(KeyEvent::from(KeyCode::Enter)) {
      ViewAction::Push(detail) => assert_eq!(detail.breadcrumb_label(), "2016"),
      _ => panic!("expected detail view"),
    }

    // Wraps around
    view.move_selection(1);
    assert_eq!(view.table_state.selected(), Some(0));
  }

  #[tokio::test]
  async fn test_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(500).set_body_string(
        r#"{"status": "INTERNAL_SERVER_ERROR", "message": "boom"}"#,
      ))
      .mount(&server)
      .await;

    let repo = repository(&server).await;
    let mut view = YearlyUsageView::new(repo, Duration::from_secs(60));
    wait_for_result(&mut view).await;

    assert_eq!(
      view.query.error().map(|e| e.category),
      Some(ErrorCategory::InternalServerError)
    );
    assert_eq!(view.error().as_deref(), Some("Internal server error"));
    assert!(view.years().is_empty());
    assert!(matches!(
      view.handle_key(KeyEvent::from(KeyCode::Enter)),
      ViewAction::None
    ));
  }

  #[tokio::test]
  async fn test_auto_refresh_continues_after_error() {
    let server = MockServer::start().await;
    let ok = r#"{"success": true, "result": {"records": [
      {"_id": 1, "quarter": "2015-Q1", "volume_of_mobile_data": "3.0"}
    ]}}"#;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_string(ok))
      .up_to_n_times(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(500).set_body_string(
        r#"{"status": "INTERNAL_SERVER_ERROR", "message": "boom"}"#,
      ))
      .up_to_n_times(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(200).set_body_string(ok))
      .mount(&server)
      .await;

    let repo = repository(&server).await;
    let mut view = YearlyUsageView::new(repo, Duration::from_millis(50));

    let mut saw_error = false;
    for _ in 0..100 {
      view.tick();
      saw_error |= view.error().is_some();
      tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let requests = server.received_requests().await.unwrap().len();
    assert!(saw_error);
    assert!(requests >= 3, "only {} requests", requests);
    // The failed refresh never cleared the published data
    assert_eq!(view.years().len(), 1);
  }

  #[tokio::test]
  async fn test_quit_key() {
    let server = MockServer::start().await;
    let repo = repository(&server).await;
    let mut view = YearlyUsageView::new(repo, Duration::from_secs(60));
    assert!(matches!(
      view.handle_key(KeyEvent::from(KeyCode::Char('q'))),
      ViewAction::Quit
    ));
  }
}
