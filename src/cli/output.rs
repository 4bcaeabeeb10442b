//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

use crate::domain::models::{StepRecord, Task, TaskStatus};

const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Spinner for indeterminate waits; hidden when stderr is not a terminal.
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let pb = if console::Term::stderr().is_term() {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
        pb.set_style(spinner_style.tick_chars(SPINNER_CHARS));
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Truncate to `max_chars` characters, appending "..." if anything was cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn styled_status(status: TaskStatus) -> StyledObject<&'static str> {
    let text = style(status.as_str());
    match status {
        TaskStatus::Queued => text.blue(),
        TaskStatus::Running => text.yellow(),
        TaskStatus::Succeeded => text.green().bold(),
        TaskStatus::Failed => text.red().bold(),
    }
}

/// Finished task, as printed by `run`.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct TaskOutput(pub Task);

impl TaskOutput {
    fn steps_table(steps: &[StepRecord]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#").add_attribute(Attribute::Bold),
                Cell::new("Kind").add_attribute(Attribute::Bold),
                Cell::new("Name").add_attribute(Attribute::Bold),
                Cell::new("OK").add_attribute(Attribute::Bold),
                Cell::new("Latency").add_attribute(Attribute::Bold),
                Cell::new("Detail").add_attribute(Attribute::Bold),
            ]);

        for step in steps {
            let detail = match (&step.output, &step.error) {
                (_, Some(error)) => error.clone(),
                (Some(output), None) => serde_json::Value::Object(output.clone()).to_string(),
                (None, None) => String::new(),
            };
            let ok = if step.ok {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("no").fg(Color::Red)
            };
            table.add_row(vec![
                Cell::new(step.step_no),
                Cell::new(step.kind.as_str()),
                Cell::new(&step.name),
                ok,
                Cell::new(format!("{}ms", step.latency_ms)),
                Cell::new(truncate(&detail, 80)),
            ]);
        }
        table
    }
}

impl CommandOutput for TaskOutput {
    fn to_human(&self) -> String {
        let task = &self.0;
        let mut lines = vec![
            format!("{} {}", style("Task").bold(), task.task_id),
            format!("{} {}", style("Goal").bold(), task.goal),
            format!("{} {}", style("Status").bold(), styled_status(task.status)),
        ];
        if let Some(result) = &task.result {
            lines.push(format!("{} {}", style("Result").bold(), style(result).green()));
        }
        if let Some(error) = &task.error {
            lines.push(format!("{} {}", style("Error").bold(), style(error).red()));
        }
        if !task.steps.is_empty() {
            lines.push(Self::steps_table(&task.steps).to_string());
        }
        lines.join("\n")
    }
}

/// Effective configuration, as printed by `config`.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigOutput(pub crate::domain::models::Config);

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.0).unwrap_or_default()
    }
}
