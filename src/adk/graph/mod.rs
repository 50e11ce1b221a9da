// SPDX-License-Identifier: MIT

//! State graph: named nodes, direct and conditional edges, checkpointed execution
//!
//! Build a [`StateGraph`], wire it with `add_edge` / `add_conditional_edges`
//! (the entry is the target of the edge from [`START`]), then `compile` it into a
//! [`CompiledGraph`] that runs one node at a time until it reaches [`END`].

mod builder;
mod executor;
mod types;

pub use builder::StateGraph;
pub use executor::CompiledGraph;
pub use types::{Edge, GraphEvent, GraphState, Node, RouteFn, RunConfig, END, START};
