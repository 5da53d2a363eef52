//! Non-fatal findings collected while analyzing or solving a network.
//!
//! Blacked-out islands, reassigned reference buses and isolated buses do not
//! abort anything; they are recorded here so callers can report them.
//!
//! ```
//! use pflow_core::diagnostics::{Diagnostics, Severity};
//! use pflow_core::BusId;
//!
//! let mut diag = Diagnostics::new();
//! diag.add_info("reference", "bus 3 promoted to reference");
//! diag.add_island_warning("blackout", "island has no generation", 1, vec![BusId::new(3)]);
//!
//! assert_eq!(diag.count(Severity::Warning), 1);
//! assert_eq!(diag.by_category("blackout").count(), 1);
//! ```

use crate::BusId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, e.g. a reference bus reassignment
    Info,
    /// Part of the network cannot be solved but the rest can
    Warning,
    Error,
}

/// A single diagnostic issue
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping ("blackout", "reference", "isolated", ...)
    pub category: String,
    pub message: String,
    /// Island the issue refers to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub island: Option<usize>,
    /// Buses affected by the issue
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buses: Vec<BusId>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            island: None,
            buses: Vec::new(),
        }
    }

    pub fn with_island(mut self, island: usize, buses: Vec<BusId>) -> Self {
        self.island = Some(island);
        self.buses = buses;
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(island) = self.island {
            write!(f, " (island {island}")?;
            if !self.buses.is_empty() {
                let members: Vec<String> = self.buses.iter().map(|b| b.to_string()).collect();
                write!(f, ": buses {}", members.join(","))?;
            }
            write!(f, ")")?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn add_info(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Info, category, message));
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_island_warning(
        &mut self,
        category: &str,
        message: &str,
        island: usize,
        buses: Vec<BusId>,
    ) {
        self.issues.push(
            DiagnosticIssue::new(Severity::Warning, category, message).with_island(island, buses),
        );
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> + 'a {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }
}
