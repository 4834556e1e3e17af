//! WhatsApp integration - outbound messaging for seller outreach
//!
//! This crate provides the WhatsApp side of concierge:
//! - **Cloud API client** (`client`) - implements `MessagingGateway` by posting
//!   to `/{phone_number_id}/messages`
//! - **Outreach templates** (`templates`) - the message a listing agent receives,
//!   rendered in the conversation's language
//!
//! Inbound webhooks are handled elsewhere; this crate only sends.
//!
//! # Configuration
//!
//! Set `whatsapp.enabled = true` plus `CONCIERGE_WHATSAPP_ACCESS_TOKEN` and
//! `CONCIERGE_WHATSAPP_PHONE_NUMBER_ID`. With messaging disabled the server wires
//! `DisabledGateway` and outreach reports `send_failed`.

pub mod client;
pub mod templates;

pub use client::WhatsAppClient;
pub use templates::{OutreachTemplateContext, OutreachTemplates};
