// SPDX-License-Identifier: Apache-2.0
//! The per-agent persona: `{name, description?, personality?, goals[], rules[],
//! preferences{}}`, persisted one file per agent under `.souls/<agent_id>.soul`
//! in a human-editable text-with-front-matter format.
//!
//! Parsing is intentionally lossy: a front-matter key whose value is blank on
//! its own line introduces either a bullet list (`- item`) or a nested map
//! (`key: value`) on the following indented lines, decided by the shape of
//! the first such line. There is no structured-text parser underneath this —
//! a rewrite would need to pick between freezing this informal grammar or
//! replacing it with a real format; this keeps the informal grammar, since
//! the file is meant to be hand-edited by an operator, not machine-generated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SoulError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Soul {
    pub name: String,
    pub description: Option<String>,
    pub personality: Option<String>,
    pub goals: Vec<String>,
    pub rules: Vec<String>,
    pub preferences: HashMap<String, String>,
}

impl Soul {
    /// The soul used when an agent has no persona file of its own yet.
    pub fn default_for(agent_id: &str) -> Self {
        Self {
            name: agent_id.to_string(),
            description: None,
            personality: None,
            goals: Vec::new(),
            rules: Vec::new(),
            preferences: HashMap::new(),
        }
    }

    /// Parse a soul file's text. `default_name` is used when the front
    /// matter carries no `name` key (or there is no front matter at all).
    pub fn parse(text: &str, default_name: &str) -> Self {
        let (front_matter, description) = split_front_matter(text);
        let fields = parse_front_matter(front_matter);

        let name = match fields.get("name") {
            Some(FmValue::Scalar(s)) => s.clone(),
            _ => default_name.to_string(),
        };
        let personality = match fields.get("personality") {
            Some(FmValue::Scalar(s)) => Some(s.clone()),
            _ => None,
        };
        let goals = match fields.get("goals") {
            Some(FmValue::List(items)) => items.clone(),
            _ => Vec::new(),
        };
        let rules = match fields.get("rules") {
            Some(FmValue::List(items)) => items.clone(),
            _ => Vec::new(),
        };
        let preferences = match fields.get("preferences") {
            Some(FmValue::Map(map)) => map.clone(),
            _ => HashMap::new(),
        };

        Self {
            name,
            description: description.filter(|d| !d.is_empty()),
            personality,
            goals,
            rules,
            preferences,
        }
    }

    /// Canonical rendering: fixed key order, only non-empty sections emitted.
    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        out.push_str(&format!("name: {}\n", self.name));
        if let Some(p) = &self.personality {
            out.push_str(&format!("personality: {p}\n"));
        }
        if !self.goals.is_empty() {
            out.push_str("goals:\n");
            for g in &self.goals {
                out.push_str(&format!("  - {g}\n"));
            }
        }
        if !self.rules.is_empty() {
            out.push_str("rules:\n");
            for r in &self.rules {
                out.push_str(&format!("  - {r}\n"));
            }
        }
        if !self.preferences.is_empty() {
            out.push_str("preferences:\n");
            let mut keys: Vec<&String> = self.preferences.keys().collect();
            keys.sort();
            for k in keys {
                out.push_str(&format!("  {k}: {}\n", self.preferences[k]));
            }
        }
        out.push_str("---\n");
        if let Some(d) = &self.description {
            out.push_str(d);
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FmValue {
    Scalar(String),
    List(Vec<String>),
    Map(HashMap<String, String>),
}

/// Splits on the first two lines that are exactly `---`. Returns the front
/// matter body (between the delimiters) and the trailing description. If the
/// text carries no front matter, the whole text is the description.
fn split_front_matter(text: &str) -> (&str, Option<String>) {
    let lines: Vec<&str> = text.lines().collect();
    let Some(start) = lines.iter().position(|l| l.trim() == "---") else {
        return ("", Some(text.trim().to_string()));
    };
    let Some(end_rel) = lines[start + 1..].iter().position(|l| l.trim() == "---") else {
        return ("", Some(text.trim().to_string()));
    };
    let end = start + 1 + end_rel;

    let fm_start = line_byte_offset(text, start + 1);
    let fm_end = line_byte_offset(text, end);
    let front_matter = &text[fm_start..fm_end];

    let desc_start = line_byte_offset(text, end + 1);
    let description = text[desc_start..].trim().to_string();
    (front_matter, Some(description))
}

fn line_byte_offset(text: &str, line_index: usize) -> usize {
    let mut offset = 0;
    for (i, line) in text.split_inclusive('\n').enumerate() {
        if i == line_index {
            return offset;
        }
        offset += line.len();
    }
    text.len()
}

fn parse_front_matter(text: &str) -> HashMap<String, FmValue> {
    let mut result = HashMap::new();
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;
        if line.trim().is_empty() {
            continue;
        }
        let Some(colon) = line.find(':') else { continue };
        let key = line[..colon].trim().to_string();
        let rest = line[colon + 1..].trim();

        if !rest.is_empty() {
            result.insert(key, FmValue::Scalar(rest.to_string()));
            continue;
        }

        let mut list_items = Vec::new();
        let mut map_items = HashMap::new();
        let mut saw_list = false;
        let mut saw_map = false;
        while i < lines.len() {
            let next = lines[i];
            if next.trim().is_empty() {
                break;
            }
            let indent = next.len() - next.trim_start().len();
            if indent == 0 {
                break;
            }
            let trimmed = next.trim();
            if let Some(item) = trimmed.strip_prefix("- ") {
                saw_list = true;
                list_items.push(item.trim().to_string());
            } else if let Some(sub_colon) = trimmed.find(':') {
                saw_map = true;
                let sub_key = trimmed[..sub_colon].trim().to_string();
                let sub_val = trimmed[sub_colon + 1..].trim().to_string();
                map_items.insert(sub_key, sub_val);
            }
            i += 1;
        }

        if saw_list {
            result.insert(key, FmValue::List(list_items));
        } else if saw_map {
            result.insert(key, FmValue::Map(map_items));
        }
    }
    result
}

/// Compile a soul into the system prompt prepended to every backend call.
pub fn system_prompt(soul: &Soul) -> String {
    let mut out = format!("You are {}.", soul.name);
    if let Some(p) = &soul.personality {
        out.push(' ');
        out.push_str(p);
        out.push('.');
    }
    if let Some(d) = &soul.description {
        out.push_str("\n\n");
        out.push_str(d);
    }
    if !soul.goals.is_empty() {
        out.push_str("\n\nGoals:\n");
        for g in &soul.goals {
            out.push_str(&format!("- {g}\n"));
        }
    }
    if !soul.rules.is_empty() {
        out.push_str("\nRules:\n");
        for r in &soul.rules {
            out.push_str(&format!("- {r}\n"));
        }
    }
    if !soul.preferences.is_empty() {
        out.push_str("\nPreferences:\n");
        let mut keys: Vec<&String> = soul.preferences.keys().collect();
        keys.sort();
        for k in keys {
            out.push_str(&format!("- {k}: {}\n", soul.preferences[k]));
        }
    }
    out
}

/// Owns `.souls/<agent_id>.soul`.
pub struct SoulStore {
    dir: PathBuf,
}

impl SoulStore {
    pub fn open(workspace_dir: &Path) -> Result<Self, SoulError> {
        let dir = workspace_dir.join(".souls");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{agent_id}.soul"))
    }

    /// Returns `Soul::default_for(agent_id)` when no file exists yet.
    pub fn get(&self, agent_id: &str) -> Result<Soul, SoulError> {
        let path = self.path(agent_id);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Soul::parse(&text, agent_id)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Soul::default_for(agent_id)),
            Err(err) => Err(err.into()),
        }
    }

    pub fn update(&self, agent_id: &str, soul: &Soul) -> Result<(), SoulError> {
        let path = self.path(agent_id);
        let tmp = path.with_extension("soul.tmp");
        std::fs::write(&tmp, soul.render())?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}
