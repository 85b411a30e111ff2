//! User notifications: completion and retention-warning emails.

pub mod email;
pub mod notify;

pub use email::{EmailConfig, EmailDelivery, EmailError};
pub use notify::{
    completion_body, completion_subject, format_seconds, usage_msg, warning_body,
    warning_subject, CompletionNotice,
};
