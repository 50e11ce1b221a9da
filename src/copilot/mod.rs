// SPDX-License-Identifier: MIT

//! The research copilot built on [`crate::adk`]

pub mod agent;
pub mod config;
pub mod nodes;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;
pub mod tools;
