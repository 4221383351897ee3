use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Row, Table};

use crate::datastore::YearUsage;
use crate::ui::renderfns::{decrease_color, format_volume};
use crate::ui::view::{View, ViewAction};

/// Quarter by quarter breakdown of a single year
pub struct YearDetailView {
  year: YearUsage,
}

impl YearDetailView {
  pub fn new(year: YearUsage) -> Self {
    Self { year }
  }

  fn rows(&self) -> Vec<Row<'static>> {
    let mut previous: Option<f64> = None;
    self
      .year
      .quarters
      .iter()
      .map(|quarter| {
        let dropped = previous.is_some_and(|p| quarter.volume < p);
        let change = match previous {
          Some(p) => format!("{:+.6}", quarter.volume - p),
          None => "-".to_string(),
        };
        previous = Some(quarter.volume);

        Row::new(vec![
          Cell::from(quarter.label()),
          Cell::from(format_volume(quarter.volume)),
          Cell::from(change).style(Style::default().fg(decrease_color(dropped))),
          Cell::from(if dropped { "▼" } else { "" }).style(Style::default().fg(Color::Red)),
        ])
      })
      .collect()
  }
}

impl View for YearDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('q') | KeyCode::Esc | KeyCode::Backspace => ViewAction::Pop,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = format!(
      " {} │ total {} PB ",
      self.year.year,
      format_volume(self.year.total_volume)
    );
    let border = if self.year.has_decrease {
      Color::Red
    } else {
      Color::Blue
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(border));

    let header = Row::new(vec!["Quarter", "Volume (PB)", "Change", ""])
      .style(Style::default().fg(Color::Yellow).bold());

    let table = Table::new(
      self.rows(),
      [
        Constraint::Length(8),
        Constraint::Length(14),
        Constraint::Length(14),
        Constraint::Length(2),
      ],
    )
    .header(header)
    .block(block);

    frame.render_widget(table, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.year.year.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::datastore::QuarterUsage;
  use crate::ui::view::ShortcutInfo;
  use ratatui::backend::TestBackend;

  fn year() -> YearUsage {
    let quarters = vec![
      QuarterUsage {
        year: 2012,
        quarter: 1,
        volume: 2.0,
      },
      QuarterUsage {
        year: 2012,
        quarter: 2,
        volume: 1.5,
      },
    ];
    YearUsage {
      year: 2012,
      total_volume: 3.5,
      quarters,
      has_decrease: true,
    }
  }

  fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
    terminal
      .backend()
      .buffer()
      .content()
      .iter()
      .map(|cell| cell.symbol())
      .collect()
  }

  #[test]
  fn test_renders_quarters_and_decrease() {
    let mut view = YearDetailView::new(year());
    let mut terminal = Terminal::new(TestBackend::new(60, 8)).unwrap();
    terminal
      .draw(|frame| view.render(frame, frame.area()))
      .unwrap();

    let text = buffer_text(&terminal);
    assert!(text.contains("2012"));
    assert!(text.contains("Q1"));
    assert!(text.contains("Q2"));
    assert!(text.contains("-0.500000"));
    assert!(text.contains("▼"));
  }

  #[test]
  fn test_back_keys_pop() {
    let mut view = YearDetailView::new(year());
    assert!(matches!(
      view.handle_key(KeyEvent::from(KeyCode::Esc)),
      ViewAction::Pop
    ));
    assert!(matches!(
      view.handle_key(KeyEvent::from(KeyCode::Char('x'))),
      ViewAction::None
    ));
    assert_eq!(view.breadcrumb_label(), "2012");
  }

  #[test]
  fn test_shortcuts_default_to_back() {
    let view = YearDetailView::new(year());
    let shortcuts: Vec<ShortcutInfo> = view.shortcuts();
    assert_eq!(shortcuts[0].key, "q");
  }
}
