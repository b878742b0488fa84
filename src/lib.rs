//! Fish-growth forecasting service.
//!
//! A request flows rate limiter -> validator -> feature encoder -> sequence
//! builder -> model service, and the handler shapes the result into the JSON
//! response contract. The model is an injected [`model::ModelService`].

pub mod clock;
pub mod config;
pub mod error;
pub mod features;
pub mod interpolation;
pub mod model;
pub mod pipeline;
pub mod rate_limit;
pub mod sequence;
pub mod server;
pub mod types;
pub mod validation;
