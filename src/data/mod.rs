//! Time series containers consumed by the trainer
//!
//! - [`TimeSeriesFrame`] - a collection of item series with optional covariates
//! - [`Forecast`] - point forecasts for every item over the prediction horizon

mod forecast;
mod frame;

pub use forecast::Forecast;
pub use frame::{TimeSeries, TimeSeriesFrame};
