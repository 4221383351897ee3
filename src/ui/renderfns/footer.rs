use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use super::utils::{format_cached_at, source_color};
use crate::repository::MobileDataUsage;

/// Draw the footer bar with view breadcrumb and where the shown data came from
pub fn draw_footer(
  frame: &mut Frame,
  area: Rect,
  breadcrumb: &[String],
  latest: Option<&MobileDataUsage>,
  error: Option<&str>,
) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i == breadcrumb.len() - 1 {
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };

    spans.push(Span::styled(part.clone(), style));
  }

  if let Some(usage) = latest {
    spans.push(Span::styled("   │ ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
      usage.source.label(),
      Style::default().fg(source_color(usage.source)),
    ));
    if usage.cached_at.is_some() {
      spans.push(Span::styled(
        format!(" @ {}", format_cached_at(usage.cached_at)),
        Style::default().fg(Color::DarkGray),
      ));
    }
  }

  if let Some(message) = error {
    spans.push(Span::styled("   │ ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
      message.to_string(),
      Style::default().fg(Color::Red).bold(),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::datastore::{DatastoreResponse, YearlyUsage};
  use chrono::{TimeZone, Utc};
  use ratatui::backend::TestBackend;

  fn usage(source: CacheSource) -> MobileDataUsage {
    MobileDataUsage {
      response: DatastoreResponse {
        help: String::new(),
        success: true,
        result: None,
      },
      yearly: YearlyUsage::default(),
      source,
      cached_at: Some(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()),
    }
  }

  fn rendered(latest: Option<&MobileDataUsage>, error: Option<&str>) -> String {
    let breadcrumb = vec!["Yearly".to_string(), "2012".to_string()];
    let mut terminal = Terminal::new(TestBackend::new(120, 1)).unwrap();
    terminal
      .draw(|frame| draw_footer(frame, frame.area(), &breadcrumb, latest, error))
      .unwrap();
    terminal
      .backend()
      .buffer()
      .content()
      .iter()
      .map(|cell| cell.symbol())
      .collect()
  }

  #[test]
  fn test_footer_shows_breadcrumb_source_and_error() {
    let latest = usage(CacheSource::Offline);
    let text = rendered(Some(&latest), Some("Connection error"));

    assert!(text.contains("Yearly > 2012"));
    assert!(text.contains("offline cache @ 2024-05-0"));
    assert!(text.contains("Connection error"));
  }

  #[test]
  fn test_footer_without_data() {
    let text = rendered(None, None);
    assert!(text.contains("Yearly > 2012"));
    assert!(!text.contains("cache"));
    assert!(!text.contains("error"));
  }
}
