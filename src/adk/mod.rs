// SPDX-License-Identifier: MIT

//! Agent development kit: tools, chat models, state graphs and checkpointing.

pub mod checkpoint;
pub mod error;
pub mod graph;
pub mod model;
pub mod tool;
