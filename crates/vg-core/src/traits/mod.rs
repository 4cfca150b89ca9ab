//! Core trait definitions

mod provider;

pub use provider::{
    ExamModeProvider, ExamModeReport, NotificationAudit, NotificationProvider, SecurityProvider,
};
