//! Runtime configuration for the HTTP server.

use std::net::SocketAddr;

use clap::Parser;

use crate::domain::booking::DEFAULT_ACTIVE_APPOINTMENT_CAP;
use crate::domain::slot::DEFAULT_SLOT_CAPACITY;
use crate::domain::{BookingLimits, RoleRules};

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "backend", about = "School appointment booking backend")]
pub struct Cli {
    /// Socket address to bind.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Capacity given to slot documents created lazily on first booking.
    #[arg(long, default_value_t = DEFAULT_SLOT_CAPACITY)]
    pub slot_capacity: u32,

    /// Active appointments allowed per account.
    #[arg(long, default_value_t = DEFAULT_ACTIVE_APPOINTMENT_CAP)]
    pub max_active_appointments: usize,

    /// Document upload provider endpoint. Without one, permit uploads use
    /// the in-process fixture uploader.
    #[arg(long)]
    pub uploader_endpoint: Option<reqwest::Url>,

    /// Email domain suffix granted the student role (repeatable).
    #[arg(long = "student-domain")]
    pub student_domains: Vec<String>,

    /// Email address granted the cashier role (repeatable).
    #[arg(long = "cashier-email")]
    pub cashier_emails: Vec<String>,

    /// Email address granted the admin role (repeatable).
    #[arg(long = "admin-email")]
    pub admin_emails: Vec<String>,
}

impl Cli {
    /// Booking limits derived from the flags.
    pub fn booking_limits(&self) -> BookingLimits {
        BookingLimits {
            slot_capacity: self.slot_capacity,
            max_active_appointments: self.max_active_appointments,
        }
    }

    /// Role rules derived from the flags; community defaults apply when no
    /// rule flags were given at all.
    pub fn role_rules(&self) -> RoleRules {
        if self.student_domains.is_empty()
            && self.cashier_emails.is_empty()
            && self.admin_emails.is_empty()
        {
            return RoleRules::default();
        }
        RoleRules {
            student_domains: self.student_domains.clone(),
            cashier_emails: self.cashier_emails.clone(),
            admin_emails: self.admin_emails.clone(),
        }
    }
}
