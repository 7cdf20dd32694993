//! River Query: assembles the ranked, presentation-ready cluster view.

pub mod river_query;

pub use river_query::river;
