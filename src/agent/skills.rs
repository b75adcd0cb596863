//! Skills loader: frontmatter-tagged markdown files with runtime
//! requirement checks.
//!
//! A skill is a `*.md` file in `<workspace>/skills/` opening with a YAML
//! frontmatter block bounded by `---` lines. Recognised keys: `name`,
//! `description`, `always` (bool), `requires` (list of executable names).
//! A skill whose `requires` list names an executable missing from PATH is
//! dropped at load time.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

/// Parsed frontmatter of a skill file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkillMeta {
    pub name: String,
    pub description: String,
    pub always: bool,
    pub requires: Vec<String>,
}

/// A loaded skill: metadata plus the markdown body.
#[derive(Debug, Clone)]
pub struct Skill {
    pub meta: SkillMeta,
    pub content: String,
    pub path: PathBuf,
}

/// Scans a skills directory and loads valid skill files.
pub struct SkillsLoader {
    skills_dir: PathBuf,
}

impl SkillsLoader {
    /// Loader for `<workspace>/skills/`.
    pub fn new(workspace: &Path) -> Self {
        Self {
            skills_dir: workspace.join("skills"),
        }
    }

    /// Loader with an explicit skills directory.
    pub fn with_dir(skills_dir: PathBuf) -> Self {
        Self { skills_dir }
    }

    /// Load every valid skill whose requirements are satisfied. Files
    /// without frontmatter and skills missing required binaries are
    /// dropped.
    pub fn load_all(&self) -> Vec<Skill> {
        let entries = match std::fs::read_dir(&self.skills_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut skills = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().map(|e| e != "md").unwrap_or(true) {
                continue;
            }
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Some((meta, content)) = parse_frontmatter(&raw) else {
                continue;
            };
            if !requirements_met(&meta.requires) {
                debug!(skill = %meta.name, requires = ?meta.requires,
                       "Skill dropped: missing required binaries");
                continue;
            }
            skills.push(Skill {
                meta,
                content,
                path,
            });
        }
        skills.sort_by(|a, b| a.meta.name.cmp(&b.meta.name));
        skills
    }

    /// Concatenated bodies of `always = true` skills, for direct injection
    /// into the system prompt.
    pub fn get_always_skills(&self) -> String {
        let parts: Vec<String> = self
            .load_all()
            .into_iter()
            .filter(|s| s.meta.always)
            .map(|s| s.content)
            .collect();
        parts.join("\n\n---\n\n")
    }

    /// XML summary of the non-always skills, for the model to choose from.
    pub fn build_skills_summary(&self) -> String {
        let mut out = String::from("<available_skills>\n");
        for skill in self.load_all() {
            if !skill.meta.always {
                out.push_str(&format!(
                    "<skill name=\"{}\">{}</skill>\n",
                    escape_xml(&skill.meta.name),
                    escape_xml(&skill.meta.description)
                ));
            }
        }
        out.push_str("</available_skills>");
        out
    }
}

/// Split frontmatter from body. Returns `None` when the file does not open
/// with a `---` block.
fn parse_frontmatter(raw: &str) -> Option<(SkillMeta, String)> {
    let re = Regex::new(r"(?s)^---\r?\n(.*?)\r?\n---\r?\n?").ok()?;
    let captures = re.captures(raw)?;
    let frontmatter = captures.get(1)?.as_str();
    let body = raw[captures.get(0)?.end()..].trim_start_matches('\n').to_string();

    let meta = serde_yaml::from_str::<SkillMeta>(frontmatter).unwrap_or_default();
    Some((meta, body))
}

/// All listed executables must be present on PATH.
fn requirements_met(requires: &[String]) -> bool {
    requires.iter().all(|bin| binary_in_path(bin))
}

fn binary_in_path(bin: &str) -> bool {
    if bin.trim().is_empty() {
        return false;
    }
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(bin).is_file())
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_skill(dir: &Path, filename: &str, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(filename), content).unwrap();
    }

    #[test]
    fn test_parse_frontmatter() {
        let raw = "---\nname: weather\ndescription: Weather lookups\nalways: false\n---\n# Body\ncontent here";
        let (meta, body) = parse_frontmatter(raw).unwrap();
        assert_eq!(meta.name, "weather");
        assert_eq!(meta.description, "Weather lookups");
        assert!(!meta.always);
        assert_eq!(body, "# Body\ncontent here");
    }

    #[test]
    fn test_parse_frontmatter_requires_list() {
        let raw = "---\nname: gitops\nrequires:\n  - git\n  - sh\n---\nbody";
        let (meta, _) = parse_frontmatter(raw).unwrap();
        assert_eq!(meta.requires, vec!["git", "sh"]);
    }

    #[test]
    fn test_parse_frontmatter_missing() {
        assert!(parse_frontmatter("no frontmatter here").is_none());
        assert!(parse_frontmatter("---\nunclosed").is_none());
    }

    #[test]
    fn test_load_all_skips_invalid() {
        let dir = tempdir().unwrap();
        let skills = dir.path().join("skills");
        write_skill(&skills, "good.md", "---\nname: good\ndescription: ok\n---\nbody");
        write_skill(&skills, "bad.md", "no frontmatter");
        write_skill(&skills, "notes.txt", "---\nname: ignored\n---\nbody");

        let loader = SkillsLoader::with_dir(skills);
        let loaded = loader.load_all();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].meta.name, "good");
    }

    #[test]
    fn test_requires_gating_drops_skill() {
        let dir = tempdir().unwrap();
        let skills = dir.path().join("skills");
        write_skill(
            &skills,
            "present.md",
            "---\nname: present\nrequires:\n  - sh\n---\nuses sh",
        );
        write_skill(
            &skills,
            "absent.md",
            "---\nname: absent\nrequires:\n  - definitely-not-a-real-binary-xyz\n---\nnever loads",
        );

        let loader = SkillsLoader::with_dir(skills);
        let loaded = loader.load_all();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].meta.name, "present");
    }

    #[test]
    fn test_always_skills_concatenated() {
        let dir = tempdir().unwrap();
        let skills = dir.path().join("skills");
        write_skill(&skills, "a.md", "---\nname: a\nalways: true\n---\nalpha body");
        write_skill(&skills, "b.md", "---\nname: b\nalways: true\n---\nbeta body");
        write_skill(&skills, "c.md", "---\nname: c\nalways: false\n---\ngamma body");

        let loader = SkillsLoader::with_dir(skills);
        let always = loader.get_always_skills();
        assert!(always.contains("alpha body"));
        assert!(always.contains("beta body"));
        assert!(always.contains("\n\n---\n\n"));
        assert!(!always.contains("gamma body"));
    }

    #[test]
    fn test_skills_summary_xml() {
        let dir = tempdir().unwrap();
        let skills = dir.path().join("skills");
        write_skill(
            &skills,
            "pick.md",
            "---\nname: pick<me>\ndescription: choose & use\n---\nbody",
        );
        write_skill(&skills, "always.md", "---\nname: always\nalways: true\n---\nbody");

        let loader = SkillsLoader::with_dir(skills);
        let summary = loader.build_skills_summary();
        assert!(summary.starts_with("<available_skills>"));
        assert!(summary.ends_with("</available_skills>"));
        assert!(summary.contains("pick&lt;me&gt;"));
        assert!(summary.contains("choose &amp; use"));
        // Always-on skills are injected directly, not offered in the summary.
        assert!(!summary.contains("name=\"always\""));
    }

    #[test]
    fn test_missing_skills_dir() {
        let dir = tempdir().unwrap();
        let loader = SkillsLoader::new(dir.path());
        assert!(loader.load_all().is_empty());
        assert_eq!(loader.get_always_skills(), "");
    }
}
