//! Lowering stage of the braid service-composition compiler: turns the
//! typed expression trees hanging off a logical dataflow graph into
//! per-lambda three-address instruction lists, alongside the service
//! descriptor model that frames the graph.

pub mod expr;
pub mod graph;
pub mod ir;
pub mod lower;
pub mod service;
pub mod visualization;
