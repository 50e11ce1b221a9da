// SPDX-License-Identifier: MIT

//! research-copilot: a conversational research assistant that routes user
//! queries through arXiv, web and RAG tool nodes of a small state graph.

pub mod adk;
pub mod copilot;
