// book rental store

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod library;
pub mod rental;
pub mod sql;
pub mod types;
pub mod web;
