//! Departments an inquiry can be routed to.
//!
//! The set is closed: guidance and fallback text live on the enum itself so
//! every lookup is exhaustive at compile time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Destination category for an inquiry.
///
/// Discriminants match the classification model's label indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Department {
    Sales = 0,
    Billing = 1,
    #[serde(rename = "HR")]
    Hr = 2,
    Support = 3,
}

impl Department {
    /// All departments in label-index order.
    pub const ALL: [Department; 4] = [
        Department::Sales,
        Department::Billing,
        Department::Hr,
        Department::Support,
    ];

    /// Department used when classification cannot pick one.
    pub const DEFAULT: Department = Department::Support;

    /// Label index used by the classification model.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Display name, as used in prompts, replies and the HTTP surface.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sales => "Sales",
            Self::Billing => "Billing",
            Self::Hr => "HR",
            Self::Support => "Support",
        }
    }

    /// Parse a model label: `LABEL_2`, `2`, or a department name (any case).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        let numeric = label
            .strip_prefix("LABEL_")
            .or_else(|| label.strip_prefix("label_"))
            .unwrap_or(label);
        if let Ok(index) = numeric.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(label))
    }

    /// What a reply for this department should focus on.
    pub fn guidance(self) -> &'static str {
        match self {
            Self::Sales => {
                "Focus on product details, availability, quotes, and next steps to collect order info."
            }
            Self::Billing => {
                "Focus on invoices, payments, references, and steps to resolve billing questions."
            }
            Self::Hr => {
                "Focus on roles, applications, next steps, and how to proceed professionally."
            }
            Self::Support => {
                "Focus on troubleshooting steps, clarity, and escalation if needed."
            }
        }
    }

    /// Model-free reply used when a generated reply is rejected.
    ///
    /// Must always pass the quality gate; see the tests in `pipeline::quality`.
    pub fn fallback_reply(self) -> String {
        format!(
            "Thank you for reaching out. Based on your request, our {} team will assist \
             you shortly. To move faster, please share any specific details \
             (e.g., quantities, references, timeline).",
            self.name()
        )
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
