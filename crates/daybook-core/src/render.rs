use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use unicode_width::UnicodeWidthStr;

use crate::category::{Category, UNREGISTERED_FILL};
use crate::config::Config;
use crate::datetime::{format_clock, format_scope};
use crate::navigator::Navigator;
use crate::stats::{CategoryData, ProductivityData};
use crate::task::{Task, TaskId};

const BAR_WIDTH: usize = 24;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn write_heading<W: Write>(&self, out: &mut W, navigator: &Navigator) -> anyhow::Result<()> {
        let (title, subtitle) = navigator.heading();
        writeln!(out, "{}", self.paint(&title, "1"))?;
        writeln!(out, "{subtitle}")?;
        writeln!(out)?;
        Ok(())
    }

    pub fn write_overdue_banner<W: Write>(&self, out: &mut W, overdue: &[Task]) -> anyhow::Result<()> {
        if overdue.is_empty() {
            return Ok(());
        }
        let noun = if overdue.len() == 1 { "task" } else { "tasks" };
        let line = format!(
            "You have {} incomplete {noun} from previous days. Run `daybook move` to bring them here.",
            overdue.len()
        );
        writeln!(out, "{}", self.paint(&line, "33"))?;
        writeln!(out)?;
        Ok(())
    }

    /// Scope tasks followed by overdue ones; overdue rows show their own date.
    #[tracing::instrument(skip_all, fields(tasks = tasks.len(), overdue = overdue.len()))]
    pub fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[Task],
        overdue: &[Task],
        categories: &[Category],
        running: Option<TaskId>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() && overdue.is_empty() {
            writeln!(out, "No tasks for this day.")?;
            return Ok(());
        }

        let headers = ["ID", "", "Task", "Category", "Time", "Date"]
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::with_capacity(tasks.len() + overdue.len());
        for task in tasks {
            rows.push(self.task_row(task, false, categories, running, now));
        }
        for task in overdue {
            rows.push(self.task_row(task, true, categories, running, now));
        }

        write_table(out, headers, rows)?;
        Ok(())
    }

    fn task_row(
        &self,
        task: &Task,
        overdue: bool,
        categories: &[Category],
        running: Option<TaskId>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let id = self.paint(&task.id.to_string(), "33");
        let status = if task.completed { "[x]" } else { "[ ]" }.to_string();

        let text = if task.completed {
            self.paint(&task.text, "2;9")
        } else {
            task.text.clone()
        };

        let category = match categories.iter().find(|c| c.name == task.category) {
            Some(registered) => self.paint_hex(
                &format!("{} {}", registered.emoji, registered.name),
                &registered.visuals.fill,
            ),
            None => self.paint_hex(&task.category, UNREGISTERED_FILL),
        };

        let clock = format_clock(task.display_seconds(now));
        let time = if running == Some(task.id) {
            self.paint(&format!("{clock} ▶"), "32;1")
        } else {
            clock
        };

        let date = format_scope(task.date);
        let date = if overdue {
            self.paint(&date, "31")
        } else {
            date
        };

        vec![id, status, text, category, time, date]
    }

    pub fn write_stats<W: Write>(
        &self,
        out: &mut W,
        scope: NaiveDate,
        productivity: &ProductivityData,
        category_time: &[CategoryData],
        categories: &[Category],
    ) -> anyhow::Result<()> {
        writeln!(out, "Productivity for {}", format_scope(scope))?;
        writeln!(
            out,
            "  {} of {} tasks completed ({}%), {} pending",
            productivity.completed, productivity.total, productivity.percentage, productivity.pending
        )?;
        writeln!(out, "  {}", self.bar(productivity.percentage))?;
        writeln!(out)?;

        if category_time.is_empty() {
            writeln!(out, "No time tracked yet.")?;
            return Ok(());
        }

        writeln!(out, "Time per category (minutes)")?;
        let headers = vec!["Category".to_string(), "Minutes".to_string()];
        let rows = category_time
            .iter()
            .map(|entry| {
                let fill = categories
                    .iter()
                    .find(|c| c.name == entry.name)
                    .map(|c| c.visuals.fill.as_str())
                    .unwrap_or(UNREGISTERED_FILL);
                vec![self.paint_hex(&entry.name, fill), format!("{:.2}", entry.minutes)]
            })
            .collect();
        write_table(out, headers, rows)?;
        Ok(())
    }

    pub fn write_categories<W: Write>(&self, out: &mut W, categories: &[Category]) -> anyhow::Result<()> {
        let headers = ["", "Name", "Color"].into_iter().map(str::to_string).collect();
        let rows = categories
            .iter()
            .map(|c| {
                vec![
                    c.emoji.clone(),
                    self.paint_hex(&c.name, &c.visuals.fill),
                    c.visuals.fill.clone(),
                ]
            })
            .collect();
        write_table(out, headers, rows)?;
        Ok(())
    }

    fn bar(&self, percentage: u8) -> String {
        let filled = usize::from(percentage.min(100)) * BAR_WIDTH / 100;
        let done = "█".repeat(filled);
        let rest = "░".repeat(BAR_WIDTH - filled);
        format!("{}{rest}", self.paint(&done, "32"))
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn paint_hex(&self, text: &str, hex: &str) -> String {
        match parse_hex(hex) {
            Some((r, g, b)) => self.paint(text, &format!("38;2;{r};{g};{b}")),
            None => text.to_string(),
        }
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |at: usize| u8::from_str_radix(digits.get(at..at + 2)?, 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let mut line = String::new();
    for (header, width) in headers.iter().zip(&widths) {
        line.push_str(&format!("{header:width$} "));
    }
    writeln!(writer, "{}", line.trim_end())?;

    line.clear();
    for width in &widths {
        line.push_str(&format!("{:-<width$} ", ""));
    }
    writeln!(writer, "{}", line.trim_end())?;

    for row in rows {
        line.clear();
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding));
            line.push(' ');
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
