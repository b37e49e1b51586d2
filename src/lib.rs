//! ISBank - bank-linking backend
//!
//! Signs users in through a hosted identity service, links their bank
//! accounts through an aggregation provider and registers each linked account
//! as a funding source with a payment rail.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod gateways;
pub mod models;
pub mod services;
