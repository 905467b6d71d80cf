//! Blogcast relay - CORS relay for the blog/podcast frontend
//!
//! Forwards browser calls under `/api` to the backend origin and reconciles
//! CORS headers on the way back.

pub mod api;
pub mod cache;
pub mod config;
