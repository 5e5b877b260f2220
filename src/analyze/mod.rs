// src/analyze/mod.rs
//! Optional model-backed structuring of scraped bulletin text.

pub mod ai_adapter;
