//! small dsp building blocks used for level metering

pub mod peak_detector;
pub mod smoothing_filter;
