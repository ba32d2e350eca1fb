//! Community feed API library.
//!
//! Aggregates posts scraped from community bulletin-board sites (plus news
//! feeds) into a single ranked feed served as a JSON API, alongside a
//! per-IP visit counter.

pub mod config;
pub mod constants;
pub mod db;
pub mod media;
pub mod ranking;
pub mod web;
