//! Side-effect policies embedded in dispatch
//!
//! - CommandApprover: confirmation gate in front of shell commands
//! - resolve_domain: keyword heuristics that adjust a sub-worker's domain

use std::sync::LazyLock;

use async_trait::async_trait;
use gp_core::Domain;
use regex::Regex;

/// Confirms shell commands before they reach the worker
#[async_trait]
pub trait CommandApprover: Send + Sync {
    /// Return false to block the command
    async fn approve(&self, command: &str) -> bool;
}

/// Approver that allows everything
pub struct AutoApprove;

#[async_trait]
impl CommandApprover for AutoApprove {
    async fn approve(&self, _command: &str) -> bool {
        true
    }
}

const RESEARCH_TERMS: &[&str] = &[
    "research",
    "investigate",
    "look up",
    "lookup",
    "find information",
    "find out",
    "gather information",
    "search the web",
    "search online",
    "web search",
    "browse the web",
    "literature review",
];

const FILE_OUTPUT_PHRASES: &[&str] = &[
    "output folder",
    "output directory",
    "save to",
    "save it to",
    "save them to",
    "save the results",
    "write to",
    "write it to",
    "downloads folder",
    "desktop folder",
];

static FILE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(pdf|docx?|xlsx?|pptx?|csv|txt|md|json|html?|png|jpe?g|zip)\b").expect("valid regex")
});

static FILE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)(~/|/[A-Za-z0-9_.-]+/|[A-Za-z]:\\)").expect("valid regex"));

/// Outcome of domain inference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainResolution {
    pub domain: Domain,
    /// Explanation when the domain differs from the requested one
    pub note: Option<String>,
}

/// Whether the goal reads as research
pub fn mentions_research(goal: &str) -> bool {
    let lower = goal.to_lowercase();
    RESEARCH_TERMS.iter().any(|term| lower.contains(term))
}

/// Whether the goal names files, paths or an output location
pub fn mentions_file_output(goal: &str) -> bool {
    let lower = goal.to_lowercase();
    FILE_OUTPUT_PHRASES.iter().any(|p| lower.contains(p)) || FILE_EXTENSION.is_match(goal) || FILE_PATH.is_match(goal)
}

/// Adjust the requested domain from the goal text
///
/// Research forces host tools, widened to mixed when the goal also names
/// files. File indicators alone pull worker tools into a host-only request.
/// Both checks are keyword heuristics: a goal matching neither keeps the
/// requested domain.
pub fn resolve_domain(goal: &str, requested: Domain) -> DomainResolution {
    let research = mentions_research(goal);
    let files = mentions_file_output(goal);

    let (domain, reason) = match (research, files) {
        (true, true) => (Domain::Mixed, "the goal is research that produces files"),
        (true, false) => (Domain::HostOnly, "the goal reads as research"),
        (false, true) if requested == Domain::HostOnly => {
            (Domain::Mixed, "the goal names files, which need worker tools")
        }
        _ => (requested, ""),
    };

    let note = (domain != requested).then(|| format!("Domain adjusted from {} to {}: {}.", requested, domain, reason));
    DomainResolution { domain, note }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_forces_host() {
        let resolved = resolve_domain("Research the best laptops of 2025", Domain::GuestOnly);
        assert_eq!(resolved.domain, Domain::HostOnly);
        assert!(resolved.note.unwrap().contains("guest_only to host_only"));
    }

    #[test]
    fn test_research_with_output_folder_is_mixed() {
        let resolved = resolve_domain("Research solar panels and put notes in the output folder", Domain::GuestOnly);
        assert_eq!(resolved.domain, Domain::Mixed);

        let resolved = resolve_domain("Research tariffs and write a summary.pdf", Domain::HostOnly);
        assert_eq!(resolved.domain, Domain::Mixed);
    }

    #[test]
    fn test_files_widen_host_only() {
        let resolved = resolve_domain("Convert ~/reports/q3.xlsx into a chart", Domain::HostOnly);
        assert_eq!(resolved.domain, Domain::Mixed);
        assert!(resolved.note.is_some());
    }

    #[test]
    fn test_files_keep_guest_only() {
        let resolved = resolve_domain("Open /home/user/notes.txt in the editor", Domain::GuestOnly);
        assert_eq!(resolved.domain, Domain::GuestOnly);
        assert!(resolved.note.is_none());
    }

    #[test]
    fn test_unmatched_goal_keeps_request() {
        // Approximate by nature: this needs a shell but matches neither check
        let resolved = resolve_domain("Restart the nginx service", Domain::HostOnly);
        assert_eq!(resolved.domain, Domain::HostOnly);
        assert!(resolved.note.is_none());
    }

    #[tokio::test]
    async fn test_auto_approve() {
        assert!(AutoApprove.approve("rm -rf /tmp/x").await);
    }
}
