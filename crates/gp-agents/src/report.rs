//! Final report evaluation
//!
//! A sub-worker's free-text report counts as SUCCESS only when it carries a
//! STATUS line and a TODO LIST whose every item is checked. The parser is
//! line based and tolerant of markdown decoration:
//!
//! ```text
//! **STATUS: SUCCESS**
//!
//! ## TODO LIST
//! - [x] open the pricing page
//! - [x] save prices.csv
//! ```

use std::fmt;
use std::sync::LazyLock;

use gp_core::{TodoItem, TodoList};
use regex::Regex;

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bstatus\s*[:\-=]?\s*(successful|succeeded|success|completed|complete|done|failed|failure|fail)\b")
        .expect("valid regex")
});

static TODO_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^#*\s*(todo|to-do|to do)\s*list\b").expect("valid regex"));

static CHECKBOX_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*+]|\d+[.)])?\s*\[([ xX✓✔]?)\]\s*(.*)$").expect("valid regex")
});

static PLAIN_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*+]|\d+[.)])\s+(.+)$").expect("valid regex"));

/// Status token found in a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStatus {
    Success,
    Failed,
}

/// Why a report does not count as success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ReportedFailed,
    MissingTodoList,
    IncompleteTodoList { unchecked: usize, total: usize },
    /// No STATUS, but a fully checked list
    MissingStatus,
    /// No STATUS, and the list is absent or has unchecked items
    MissingStatusAndList,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReportedFailed => f.write_str("Sub-agent reported FAILED"),
            Self::MissingTodoList => f.write_str("Reported SUCCESS without a TODO LIST"),
            Self::IncompleteTodoList { unchecked, total } => write!(
                f,
                "Reported SUCCESS but the TODO LIST is incomplete ({} of {} items unchecked)",
                unchecked, total
            ),
            Self::MissingStatus => f.write_str("Report has no STATUS line"),
            Self::MissingStatusAndList => {
                f.write_str("Report is missing status and list: no STATUS line and no fully checked TODO LIST")
            }
        }
    }
}

/// Outcome the report supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failed(FailureReason),
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Parsed structure of a report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub status: Option<ReportedStatus>,
    /// None when there is no TODO LIST header or it has no items
    pub todo: Option<TodoList>,
}

impl Report {
    pub fn parse(text: &str) -> Self {
        let lines: Vec<String> = text.lines().map(strip_markup).collect();

        // List items may mention a status of their own ("check status: done")
        let status = lines
            .iter()
            .filter(|line| !CHECKBOX_ITEM.is_match(line) && !PLAIN_ITEM.is_match(line))
            .find_map(|line| parse_status(line));
        let todo = lines
            .iter()
            .position(|line| TODO_HEADER.is_match(line))
            .and_then(|header| parse_items(&lines[header + 1..]));

        Self { status, todo }
    }

    fn todo_complete(&self) -> bool {
        self.todo.as_ref().is_some_and(TodoList::is_complete)
    }

    /// Whether the report already follows the required format: a STATUS
    /// line and a TODO LIST, fully checked when the status is SUCCESS
    pub fn is_compliant(&self) -> bool {
        match self.status {
            Some(ReportedStatus::Success) => self.todo_complete(),
            Some(ReportedStatus::Failed) => self.todo.is_some(),
            None => false,
        }
    }

    pub fn verdict(&self) -> Verdict {
        match (self.status, &self.todo) {
            (Some(ReportedStatus::Failed), _) => Verdict::Failed(FailureReason::ReportedFailed),
            (Some(ReportedStatus::Success), None) => Verdict::Failed(FailureReason::MissingTodoList),
            (Some(ReportedStatus::Success), Some(todo)) if !todo.is_complete() => {
                Verdict::Failed(FailureReason::IncompleteTodoList {
                    unchecked: todo.unchecked_count(),
                    total: todo.len(),
                })
            }
            (Some(ReportedStatus::Success), Some(_)) => Verdict::Success,
            (None, _) if self.todo_complete() => Verdict::Failed(FailureReason::MissingStatus),
            (None, _) => Verdict::Failed(FailureReason::MissingStatusAndList),
        }
    }
}

/// Trim and drop bold and code markers. A single leading "*" is a list
/// marker and stays.
fn strip_markup(line: &str) -> String {
    line.replace("**", "").replace('`', "").trim().to_string()
}

fn parse_status(line: &str) -> Option<ReportedStatus> {
    let token = STATUS_LINE.captures(line)?.get(1)?.as_str().to_lowercase();
    Some(match token.as_str() {
        "failed" | "failure" | "fail" => ReportedStatus::Failed,
        _ => ReportedStatus::Success,
    })
}

fn parse_items(lines: &[String]) -> Option<TodoList> {
    let mut items = Vec::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = CHECKBOX_ITEM.captures(line) {
            let mark = caps.get(1).map_or("", |m| m.as_str());
            let text = caps.get(2).map_or("", |m| m.as_str()).trim();
            items.push(if mark.trim().is_empty() {
                TodoItem::new(text)
            } else {
                TodoItem::done(text)
            });
        } else if is_section_header(line) {
            break;
        } else if let Some(caps) = PLAIN_ITEM.captures(line) {
            items.push(TodoItem::new(caps[1].trim()));
        } else {
            break;
        }
    }

    (!items.is_empty()).then_some(TodoList { items })
}

fn is_section_header(line: &str) -> bool {
    line.starts_with('#') || line.ends_with(':') || STATUS_LINE.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_report_succeeds() {
        let report = Report::parse("STATUS: SUCCESS\nTODO LIST:\n- [x] a\n- [x] b");
        assert_eq!(report.status, Some(ReportedStatus::Success));
        assert_eq!(report.todo.as_ref().map(TodoList::len), Some(2));
        assert!(report.is_compliant());
        assert_eq!(report.verdict(), Verdict::Success);
    }

    #[test]
    fn test_unchecked_item_is_incomplete() {
        let verdict = Report::parse("STATUS: SUCCESS\nTODO LIST:\n- [x] a\n- [ ] b").verdict();
        assert_eq!(
            verdict,
            Verdict::Failed(FailureReason::IncompleteTodoList { unchecked: 1, total: 2 })
        );
        if let Verdict::Failed(reason) = verdict {
            assert!(reason.to_string().contains("incomplete"));
        }
    }

    #[test]
    fn test_free_text_is_missing_status_and_list() {
        let report = Report::parse("I looked around and I think it went fine.");
        assert_eq!(report, Report::default());
        let Verdict::Failed(reason) = report.verdict() else {
            panic!("free text must not succeed");
        };
        assert_eq!(reason, FailureReason::MissingStatusAndList);
        assert!(reason.to_string().contains("missing status and list"));
    }

    #[test]
    fn test_status_variants() {
        for (text, expected) in [
            ("Status - complete", ReportedStatus::Success),
            ("**STATUS:** Succeeded", ReportedStatus::Success),
            ("## Final status: done", ReportedStatus::Success),
            ("status=FAILURE", ReportedStatus::Failed),
            ("STATUS: failed (site was down)", ReportedStatus::Failed),
        ] {
            assert_eq!(Report::parse(text).status, Some(expected), "{}", text);
        }
        assert_eq!(Report::parse("status unknown").status, None);
    }

    #[test]
    fn test_reported_failure_wins() {
        let report = Report::parse("STATUS: FAILED\nTODO LIST:\n- [x] a\n- [ ] b");
        assert!(report.is_compliant());
        assert_eq!(report.verdict(), Verdict::Failed(FailureReason::ReportedFailed));
    }

    #[test]
    fn test_success_without_list() {
        let report = Report::parse("STATUS: SUCCESS\nEverything is done.");
        assert!(!report.is_compliant());
        assert_eq!(report.verdict(), Verdict::Failed(FailureReason::MissingTodoList));
    }

    #[test]
    fn test_checked_list_without_status() {
        let verdict = Report::parse("TODO LIST\n- [x] a").verdict();
        assert_eq!(verdict, Verdict::Failed(FailureReason::MissingStatus));
    }

    #[test]
    fn test_list_item_styles() {
        let text = "## TODO LIST\n\n1. [X] open site\n* [✓] read table\n- bare step\n2. numbered step\n[ ] loose box\n";
        let todo = Report::parse(text).todo.unwrap();
        let done: Vec<bool> = todo.items.iter().map(|i| i.completed).collect();
        assert_eq!(done, vec![true, true, false, false, false]);
        assert_eq!(todo.items[2].text, "bare step");
    }

    #[test]
    fn test_section_header_ends_list() {
        let text = "STATUS: SUCCESS\nTODO LIST:\n- [x] a\n- [x] b\n\nNotes:\n- [ ] not part of the list\n";
        let report = Report::parse(text);
        assert_eq!(report.todo.as_ref().map(TodoList::len), Some(2));
        assert_eq!(report.verdict(), Verdict::Success);

        let text = "TODO LIST:\n- [x] a\n### 1. Results\n- [ ] later";
        assert_eq!(Report::parse(text).todo.map(|t| t.len()), Some(1));
    }

    #[test]
    fn test_status_after_list() {
        let text = "TODO LIST:\n- [x] a\nSTATUS: SUCCESS";
        let report = Report::parse(text);
        assert_eq!(report.todo.as_ref().map(TodoList::len), Some(1));
        assert_eq!(report.verdict(), Verdict::Success);
    }

    #[test]
    fn test_status_inside_list_items_is_ignored() {
        let report = Report::parse(
            "Plan:\n1. status = complete\nTODO LIST:\n- [x] check status: done\n- [ ] confirm status - failed\n\nSTATUS: FAILED",
        );
        assert_eq!(report.status, Some(ReportedStatus::Failed));
        assert_eq!(report.todo.as_ref().map(TodoList::len), Some(2));

        let unreported = Report::parse("TODO LIST:\n- [x] check status: done");
        assert_eq!(unreported.status, None);
        assert_eq!(unreported.verdict(), Verdict::Failed(FailureReason::MissingStatus));
    }

    #[test]
    fn test_empty_list_counts_as_missing() {
        let report = Report::parse("STATUS: SUCCESS\nTODO LIST:\nAll good");
        assert_eq!(report.todo, None);
    }
}
