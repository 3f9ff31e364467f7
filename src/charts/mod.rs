//! Charts module - Chart rendering

mod renderer;

pub use renderer::{shorten_label, BarChart, ChartError, StaticChartRenderer, LIGHT_GREEN, SALMON, SKY_BLUE};
