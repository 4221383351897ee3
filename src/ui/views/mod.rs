mod year_detail;
mod yearly;

pub use year_detail::YearDetailView;
pub use yearly::YearlyUsageView;
