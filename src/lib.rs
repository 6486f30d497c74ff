//! # Kommo Bridge Library
//!
//! Webhook handlers connecting a Kommo CRM account to a betting backend:
//! player provisioning with credential delivery, and proof-of-payment
//! detection on incoming chat messages. One process serves many tenants.

pub mod backend;
pub mod config;
pub mod contacts;
pub mod credentials;
pub mod crm;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod lookup;
pub mod models;
pub mod payload;
pub mod proof;
pub mod server;
pub mod telemetry;
pub mod tenants;
