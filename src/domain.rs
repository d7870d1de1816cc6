use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use regex::Regex;

use crate::error::ListerError;

const PUSH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HarborVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl HarborVersion {
    pub fn supports_api_v2(&self) -> bool {
        self.major >= 2
    }
}

impl fmt::Display for HarborVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[vV]?(\d+)\.(\d+)(?:\.(\d+))?").expect("static version regex")
    })
}

impl FromStr for HarborVersion {
    type Err = ListerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let caps = version_regex()
            .captures(trimmed)
            .ok_or_else(|| ListerError::InvalidVersion(value.to_string()))?;
        let number = |idx: usize| -> Result<u32, ListerError> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| ListerError::InvalidVersion(value.to_string())),
                None => Ok(0),
            }
        };
        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub push_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub digest: String,
    pub tags: Vec<TagInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub artifacts: Vec<Artifact>,
}

impl Repository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifacts: Vec::new(),
        }
    }

    /// Untagged artifacts never reach the spreadsheet, so they are dropped here.
    pub fn add_artifact(&mut self, artifact: Artifact) {
        if !artifact.tags.is_empty() {
            self.artifacts.push(artifact);
        }
    }

    pub fn tag_count(&self) -> usize {
        self.artifacts.iter().map(|artifact| artifact.tags.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub repositories: BTreeMap<String, Repository>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repositories: BTreeMap::new(),
        }
    }

    pub fn add_repository(&mut self, repository: Repository) {
        if !repository.artifacts.is_empty() {
            self.repositories.insert(repository.name.clone(), repository);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn artifact_count(&self) -> usize {
        self.repositories
            .values()
            .map(|repo| repo.artifacts.len())
            .sum()
    }

    pub fn tag_count(&self) -> usize {
        self.repositories.values().map(Repository::tag_count).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Inventory {
    pub harbor_version: String,
    pub projects: Vec<Project>,
}

impl Inventory {
    pub fn sort(&mut self) {
        self.projects.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// Harbor reports repository names as `project/repo[/sub]`.
pub fn strip_project_prefix<'a>(project: &str, full_name: &'a str) -> &'a str {
    full_name
        .strip_prefix(project)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(full_name)
}

pub fn format_push_time(time: Option<&DateTime<Utc>>, offset: FixedOffset) -> String {
    match time {
        Some(time) if time.year() > 1 => time
            .with_timezone(&offset)
            .format(PUSH_TIME_FORMAT)
            .to_string(),
        _ => String::new(),
    }
}
