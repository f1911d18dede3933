//! Extracts structured fields from generated Markdown minutes.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s*(.+?)\s*#*\s*$").expect("heading pattern"));
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s\-\*•+]*(?:\d+[.)]\s*)?").expect("list marker pattern"));
static LABELLED_BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*•]?\s*\*\*(.+?):?\*\*:?\s*(.*)$").expect("labelled bullet pattern")
});
static TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|?[\s:\-|]+\|?$").expect("separator pattern"));

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextMeeting {
    pub date_time: String,
    pub location: String,
    pub attendees: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMinutes {
    pub date_time: String,
    pub location: String,
    pub meeting_title: String,
    pub attendees: Vec<String>,
    pub materials_used: Vec<String>,
    pub overview: String,
    pub action_items: Vec<Value>,
    pub decisions: Vec<Value>,
    pub next_meeting: NextMeeting,
}

pub fn parse_minutes(markdown: &str) -> ParsedMinutes {
    let next = section(markdown, "Next Meeting").unwrap_or_default();
    ParsedMinutes {
        date_time: section(markdown, "Date and Time").unwrap_or_default(),
        location: section(markdown, "Location").unwrap_or_default(),
        meeting_title: section(markdown, "Meeting Title").unwrap_or_default(),
        attendees: list(markdown, "Attendees"),
        materials_used: list(markdown, "Materials Used"),
        overview: section(markdown, "Overview").unwrap_or_default(),
        action_items: table_or_list(markdown, "Action Items"),
        decisions: table_or_list(markdown, "Decisions"),
        next_meeting: NextMeeting {
            date_time: labelled(&next, "Date and Time").unwrap_or_default(),
            location: labelled(&next, "Location").unwrap_or_default(),
            attendees: labelled(&next, "Attendees")
                .map(|v| split_names(&v))
                .unwrap_or_default(),
        },
    }
}

/// Body of the first heading titled `name`, up to the next heading of the same
/// or a higher level.
fn section(markdown: &str, name: &str) -> Option<String> {
    let mut body: Vec<&str> = Vec::new();
    let mut level: Option<usize> = None;

    for line in markdown.lines() {
        let heading = HEADING.captures(line.trim_end());
        match (level, heading) {
            (None, Some(caps)) if caps[2].eq_ignore_ascii_case(name) => {
                level = Some(caps[1].len());
            }
            (Some(open), Some(caps)) if caps[1].len() <= open => break,
            (Some(_), _) => body.push(line),
            (None, _) => {}
        }
    }

    level?;
    let text = body.join("\n").trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn strip_marker(line: &str) -> String {
    LIST_MARKER.replace(line, "").trim().to_string()
}

fn list(markdown: &str, name: &str) -> Vec<String> {
    let Some(body) = section(markdown, name) else {
        return Vec::new();
    };
    body.lines()
        .filter(|l| !l.trim_start().starts_with('('))
        .map(strip_marker)
        .filter(|l| !l.is_empty())
        .collect()
}

fn header_key(header: &str) -> String {
    header
        .trim()
        .trim_matches('*')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn cells(row: &str) -> Vec<String> {
    let row = row.trim();
    let row = row.strip_prefix('|').unwrap_or(row);
    let row = row.strip_suffix('|').unwrap_or(row);
    row.split('|').map(|c| c.trim().to_string()).collect()
}

fn table_or_list(markdown: &str, name: &str) -> Vec<Value> {
    let Some(body) = section(markdown, name) else {
        return Vec::new();
    };

    let rows: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('|'))
        .collect();

    if rows.len() > 1 {
        let headers: Vec<String> = cells(rows[0]).iter().map(|h| header_key(h)).collect();
        return rows[1..]
            .iter()
            .filter(|r| !TABLE_SEPARATOR.is_match(r))
            .map(|r| {
                let values = cells(r);
                let mut obj = Map::new();
                for (i, header) in headers.iter().enumerate() {
                    if header.is_empty() {
                        continue;
                    }
                    let value = values.get(i).cloned().unwrap_or_default();
                    obj.insert(header.clone(), Value::String(value));
                }
                Value::Object(obj)
            })
            .collect();
    }

    list(markdown, name)
        .into_iter()
        .map(|item| json!({ "description": item }))
        .collect()
}

/// Value of a `- **Label:** value` bullet inside a section body.
fn labelled(body: &str, label: &str) -> Option<String> {
    body.lines().find_map(|line| {
        let caps = LABELLED_BULLET.captures(line)?;
        caps[1]
            .trim()
            .eq_ignore_ascii_case(label)
            .then(|| caps[2].trim().to_string())
    })
}

fn split_names(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
