//! Project entries stored as markdown files with a YAML frontmatter block.
//!
//! Every call reads from disk; there is no cache in front of the directory.
//! Invalid or escaping slugs are reported as "not found", never as a
//! distinct error, so callers cannot probe the directory layout.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MARKDOWN_EXT: &str = ".md";
const DRAFT_PREFIX: char = '_';

/// Project metadata as served in list views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub slug: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub category: String,
    pub tech_stack: Vec<String>,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    pub featured: bool,
    pub date: String,
}

/// A project together with its markdown body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    #[serde(flatten)]
    pub record: ProjectRecord,
    pub content: String,
}

// Frontmatter keys; anything missing falls back to its default
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Frontmatter {
    slug: Option<String>,
    title: String,
    subtitle: String,
    description: String,
    category: String,
    tech_stack: Vec<String>,
    image: String,
    demo_url: Option<String>,
    github_url: Option<String>,
    // `featured:` with no value is YAML null
    featured: Option<bool>,
    date: String,
}

#[derive(Debug, Clone)]
pub struct ContentLoader {
    dir: PathBuf,
}

impl ContentLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Slugs of every non-draft markdown file, sorted. A missing directory
    /// simply has no projects.
    pub async fn project_slugs(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "content directory missing");
                return Vec::new();
            }
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot list content directory");
                return Vec::new();
            }
        };

        let mut slugs = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "error while listing content directory");
                    break;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(DRAFT_PREFIX) {
                continue;
            }
            if let Some(slug) = name.strip_suffix(MARKDOWN_EXT) {
                slugs.push(slug.to_string());
            }
        }
        slugs.sort();
        slugs
    }

    /// Load one project. Returns `None` for malformed slugs, paths that
    /// resolve outside the content directory, unreadable files and
    /// unparseable frontmatter.
    pub async fn project_by_slug(&self, slug: &str) -> Option<Project> {
        if !is_valid_slug(slug) {
            debug!(slug, "rejected slug");
            return None;
        }

        let path = self.resolve(slug).await?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(slug, error = %e, "cannot read project file");
                return None;
            }
        };

        match parse_project(slug, &raw) {
            Ok(project) => Some(project),
            Err(e) => {
                warn!(slug, error = %e, "invalid frontmatter");
                None
            }
        }
    }

    /// Every loadable project without its body, newest first.
    pub async fn all_projects(&self) -> Vec<ProjectRecord> {
        let mut records = Vec::new();
        for slug in self.project_slugs().await {
            if let Some(project) = self.project_by_slug(&slug).await {
                records.push(project.record);
            }
        }
        sort_by_date_desc(&mut records);
        records
    }

    pub async fn featured_projects(&self) -> Vec<ProjectRecord> {
        self.all_projects()
            .await
            .into_iter()
            .filter(|p| p.featured)
            .collect()
    }

    // Canonical path of the slug's file, provided it stays inside the content dir
    async fn resolve(&self, slug: &str) -> Option<PathBuf> {
        let base = tokio::fs::canonicalize(&self.dir).await.ok()?;
        let candidate = tokio::fs::canonicalize(base.join(format!("{slug}{MARKDOWN_EXT}")))
            .await
            .ok()?;
        if !candidate.starts_with(&base) {
            warn!(slug, "slug resolved outside the content directory");
            return None;
        }
        Some(candidate)
    }
}

/// Lowercase ASCII letters, digits and hyphens only.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// True when the fields a project page cannot do without are all present.
/// Loading does not enforce this; it exists for authoring checks.
pub fn validate_project_data(record: &ProjectRecord) -> bool {
    [
        &record.slug,
        &record.title,
        &record.description,
        &record.category,
        &record.date,
    ]
    .iter()
    .all(|field| !field.trim().is_empty())
}

fn parse_project(slug: &str, raw: &str) -> Result<Project, serde_norway::Error> {
    let (yaml, body) = split_frontmatter(raw);
    let meta = match yaml {
        Some(yaml) if !yaml.trim().is_empty() => serde_norway::from_str::<Frontmatter>(yaml)?,
        _ => Frontmatter::default(),
    };

    let record = ProjectRecord {
        slug: meta
            .slug
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slug.to_string()),
        title: meta.title,
        subtitle: meta.subtitle,
        description: meta.description,
        category: meta.category,
        tech_stack: meta.tech_stack,
        image: meta.image,
        demo_url: meta.demo_url.filter(|u| !u.is_empty()),
        github_url: meta.github_url.filter(|u| !u.is_empty()),
        featured: meta.featured.unwrap_or(false),
        date: meta.date,
    };

    Ok(Project {
        record,
        content: body.to_string(),
    })
}

/// Split `---\n<yaml>\n---\n<body>`. Without an opening delimiter the
/// whole file is body.
fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let Some(rest) = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    else {
        return (None, raw);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let body = &rest[offset + line.len()..];
            return (Some(&rest[..offset]), body.trim_start_matches(['\r', '\n']));
        }
        offset += line.len();
    }
    // unterminated block
    (None, raw)
}

// Calendar day from the leading `YYYY-MM-DD`; any time part after it is ignored
fn date_key(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_and_remainder(date.trim(), "%Y-%m-%d")
        .ok()
        .map(|(day, _)| day)
}

// Stable: equal dates keep their incoming (slug) order, unparseable dates go last
fn sort_by_date_desc(records: &mut [ProjectRecord]) {
    records.sort_by(|a, b| date_key(&b.date).cmp(&date_key(&a.date)));
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---\n\
slug: trail-finder\n\
title: Trail Finder\n\
subtitle: Offline hiking maps\n\
description: Route planning without signal\n\
category: Mobile\n\
techStack: [Rust, SQLite, Kotlin]\n\
image: /images/trail.png\n\
demoUrl: https://trail.example.com\n\
featured: true\n\
date: 2024-03-01\n\
---\n\
\n\
# Trail Finder\n\
\n\
Body text.\n";

    #[test]
    fn test_slug_pattern() {
        assert!(is_valid_slug("trail-finder-2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("../../etc/passwd"));
        assert!(!is_valid_slug("foo/../bar"));
        assert!(!is_valid_slug("Trail"));
        assert!(!is_valid_slug("trail_finder"));
        assert!(!is_valid_slug("trail.md"));
    }

    #[test]
    fn test_parse_full_frontmatter() {
        let project = parse_project("trail-finder", SAMPLE).unwrap();
        let record = &project.record;
        assert_eq!(record.title, "Trail Finder");
        assert_eq!(record.tech_stack, vec!["Rust", "SQLite", "Kotlin"]);
        assert_eq!(record.demo_url.as_deref(), Some("https://trail.example.com"));
        assert_eq!(record.github_url, None);
        assert!(record.featured);
        assert_eq!(record.date, "2024-03-01");
        assert!(project.content.starts_with("# Trail Finder"));
        assert!(validate_project_data(record));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let project = parse_project("bare", "---\ntitle: Bare\n---\nHello\n").unwrap();
        let record = &project.record;
        assert_eq!(record.slug, "bare");
        assert_eq!(record.subtitle, "");
        assert!(record.tech_stack.is_empty());
        assert!(!record.featured);
        assert_eq!(project.content, "Hello\n");
        assert!(!validate_project_data(record));
    }

    #[test]
    fn test_no_frontmatter_is_all_body() {
        let (yaml, body) = split_frontmatter("# Just markdown\n");
        assert_eq!(yaml, None);
        assert_eq!(body, "# Just markdown\n");

        let (yaml, _) = split_frontmatter("---\ntitle: never closed\n");
        assert_eq!(yaml, None);
    }

    #[test]
    fn test_crlf_frontmatter() {
        let (yaml, body) = split_frontmatter("---\r\ntitle: X\r\n---\r\nBody");
        assert_eq!(yaml, Some("title: X\r\n"));
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_sort_is_descending_and_stable() {
        let make = |slug: &str, date: &str| ProjectRecord {
            slug: slug.to_string(),
            date: date.to_string(),
            ..Default::default()
        };
        let mut records = vec![
            make("a", "2023-01-01"),
            make("b", "2024-06-01"),
            make("c", "not a date"),
            make("d", "2023-01-01"),
            make("e", "2024-06-01T10:00:00Z"),
            make("f", "2023-06-01 10:00"),
        ];
        sort_by_date_desc(&mut records);
        let order: Vec<&str> = records.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(order, vec!["b", "e", "f", "a", "d", "c"]);
    }

    #[test]
    fn test_date_key_ignores_time_of_day() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(date_key("2024-01-01"), day);
        assert_eq!(date_key("2024-01-01 10:00"), day);
        assert_eq!(date_key("2024-01-01T23:59:59+02:00"), day);
        assert_eq!(date_key("January 2024"), None);
    }

    #[test]
    fn test_empty_featured_key_defaults_to_false() {
        let project = parse_project("b", "---\ntitle: B\nfeatured:\n---\nBody\n").unwrap();
        assert_eq!(project.record.title, "B");
        assert!(!project.record.featured);
    }
}
