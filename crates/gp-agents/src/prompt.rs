//! Prompts for the sub-worker decision loop

use chrono::NaiveDate;
use gp_core::{Domain, TodoList};
use gp_tools::Command;

/// Format every final report must follow
pub const REPORT_FORMAT: &str = "\
STATUS: SUCCESS or STATUS: FAILED

TODO LIST:
- [x] each completed item
- [ ] each item that was not completed

SUMMARY:
What was done, what was found, and where any output was saved.";

fn domain_guidance(domain: Domain) -> &'static str {
    match domain {
        Domain::HostOnly => {
            "You work on the host only: web search, image generation and your todo list. \
             You cannot see or touch the worker's screen, shell or files."
        }
        Domain::GuestOnly => {
            "You work inside the worker only: screen, pointer, keyboard, shell and files. \
             You have no web search."
        }
        Domain::Mixed => "You may use host tools and the worker's screen, shell and files.",
    }
}

/// System turn for one decision loop
pub fn system_prompt(goal: &str, domain: Domain, tools: &[Command], todo: &TodoList, today: NaiveDate) -> String {
    let tool_names: Vec<&str> = tools.iter().map(|c| c.name()).collect();

    let mut prompt = format!(
        "You are an automation agent pursuing a single goal.\n\n\
         GOAL: {goal}\n\
         DOMAIN: {domain}\n\
         {guidance}\n\
         TOOLS: {tools}\n\
         TODAY: {today}\n",
        goal = goal,
        domain = domain,
        guidance = domain_guidance(domain),
        tools = tool_names.join(", "),
        today = today.format("%Y-%m-%d"),
    );

    if !todo.is_empty() {
        prompt.push_str(&format!(
            "\nYour todo list is already set up:\n{}\n\
             Mark each item with finish_todo as soon as it is done. Do not skip items.\n",
            todo.render()
        ));
    }
    if tools.contains(&Command::SendMessage) {
        prompt.push_str(
            "\nUse send_message with to=\"main\" to report progress or ask for help, \
             and read_messages to check for instructions.\n",
        );
    }

    prompt.push_str(&format!(
        "\nWork step by step with the tools. When you are finished, reply without \
         calling any tool, using exactly this format:\n\n{}\n",
        REPORT_FORMAT
    ));
    prompt
}

/// Follow-up turn asking for a report in the required format
pub fn report_request(todo: &TodoList) -> String {
    let mut request = String::from(
        "Stop calling tools. Write your final report now, in exactly this format:\n\n",
    );
    request.push_str(REPORT_FORMAT);
    if !todo.is_empty() {
        request.push_str(&format!(
            "\n\nYour todo list currently reads:\n{}\n\
             Report SUCCESS only if every item is checked.",
            todo.render()
        ));
    }
    request
}
