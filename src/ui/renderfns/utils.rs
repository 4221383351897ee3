use chrono::{DateTime, Local, Utc};
use ratatui::prelude::Color;

use crate::cache::CacheSource;

/// Format a volume in petabytes with a fixed number of decimals
pub fn format_volume(volume: f64) -> String {
  if volume.abs() < 0.01 && volume != 0.0 {
    format!("{:.6}", volume)
  } else {
    format!("{:.2}", volume)
  }
}

/// Human readable time a cached response was stored, in local time
pub fn format_cached_at(cached_at: Option<DateTime<Utc>>) -> String {
  match cached_at {
    Some(at) => at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    None => "-".to_string(),
  }
}

/// Color for where a dataset came from
pub fn source_color(source: CacheSource) -> Color {
  match source {
    CacheSource::Network | CacheSource::Revalidated => Color::Green,
    CacheSource::CacheFresh => Color::Cyan,
    CacheSource::CacheStale | CacheSource::Offline => Color::Yellow,
  }
}

/// Color for a row depending on whether volume dropped
pub fn decrease_color(has_decrease: bool) -> Color {
  if has_decrease {
    Color::Red
  } else {
    Color::White
  }
}
